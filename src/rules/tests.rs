use crate::{
    Context, FacetMode, FeatureBoost, Filter, FilterOperator, FilterOptimization, GenreSimplification,
    InterleaveFallback, LibraryBoost, LibraryBoostEntry, Options, RecencyDecay, RecencyInterleaving, Rule, RuleAction,
    RuleKind, SubgenreInterleaving, Track, apply_rules, apply_rules_with, match_rules,
};
use crate::error::EngineInputError;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::BTreeMap;

const DATE: &str = "apm_release_date";

fn track(id: i64, score: f64) -> Track {
    Track::new().with("id", id).with("_relevance_score", score)
}

fn ids(tracks: &[Track]) -> Vec<String> {
    tracks.iter().map(Track::id).collect()
}

fn score(tracks: &[Track], id: &str) -> f64 {
    tracks.iter().find(|t| t.id() == id).and_then(Track::relevance_score).unwrap()
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

fn library_boost(id: &str, library: &str, factor: f64) -> Rule {
    rule! {
        id: id,
        pattern: r"\brock\b",
        description: "Boost the rock library",
        action: RuleAction::LibraryBoost(LibraryBoost {
            boost_libraries: vec![LibraryBoostEntry { library_name: library.into(), boost_factor: factor }],
        }),
    }
}

fn stems_boost() -> Rule {
    rule! {
        id: "stems",
        pattern: "stems",
        action: RuleAction::FeatureBoost(FeatureBoost {
            boost_field: "has_stems".into(),
            boost_value: "true".into(),
            boost_factor: 1.3,
        }),
    }
}

fn recency_interleave(pattern: &str, repeat_count: u32) -> Rule {
    rule! {
        id: "rv",
        pattern: "mix",
        action: RuleAction::RecencyInterleaving(RecencyInterleaving {
            recent_threshold_months: 12,
            vintage_max_months: 120,
            pattern: pattern.into(),
            repeat_count,
            date_field: DATE.into(),
        }),
    }
}

fn blues_interleave(pattern: &str, fallback: InterleaveFallback) -> Rule {
    rule! {
        id: "blues",
        pattern: "blues",
        action: RuleAction::SubgenreInterleaving(SubgenreInterleaving {
            attribute: "subgenre".into(),
            values: BTreeMap::from([
                ("A".to_string(), "Delta Blues".to_string()),
                ("B".to_string(), "Chicago Blues".to_string()),
            ]),
            pattern: pattern.into(),
            fallback,
        }),
    }
}

// --- Scorers -------------------------------------------------------------------

#[test]
fn library_boost_multiplies_matching_tracks() {
    let tracks = vec![
        track(1, 1.0).with("library_name", "Rock Library"),
        track(2, 1.2).with("library_name", "Other"),
        track(3, 0.8).with("library_name", "Rock Library"),
    ];
    let rules = match_rules("rock", &[library_boost("rock", "Rock Library", 1.5)], &Options::default()).unwrap();
    let out = apply_rules(tracks, &rules, "rock").unwrap();

    assert!(close(score(&out.results, "1"), 1.5));
    assert!(close(score(&out.results, "3"), 1.2));
    assert_eq!(score(&out.results, "2"), 1.2);
    assert_eq!(out.score_adjustments.len(), 2);
    assert!(out.score_adjustments.iter().all(|a| a.score_multiplier == Some(1.5) && a.rule_id == "rock"));
    assert_eq!(out.applied_rules.len(), 1);
    assert_eq!(out.applied_rules[0].affected_tracks, 2);
    assert_eq!(out.applied_rules[0].kind, RuleKind::LibraryBoost);
}

#[test]
fn library_names_must_match_exactly() {
    let tracks = vec![track(1, 1.0).with("library_name", "rock library")];
    let out = apply_rules(tracks, &[library_boost("rock", "Rock Library", 1.5)], "rock").unwrap();
    assert_eq!(score(&out.results, "1"), 1.0);
    assert!(out.applied_rules.is_empty(), "no effect, no record");
}

#[test]
fn feature_boost_compares_stringified_values() {
    let tracks = vec![track(1, 1.0).with("has_stems", "true"), track(2, 1.2).with("has_stems", "false")];
    let out = apply_rules(tracks, &[stems_boost()], "stems").unwrap();

    assert!(close(score(&out.results, "1"), 1.3));
    assert_eq!(score(&out.results, "2"), 1.2);
    assert_eq!(out.score_adjustments.len(), 1);
    assert_eq!(out.score_adjustments[0].track_id, "1");
}

#[test]
fn feature_boost_is_case_sensitive_but_accepts_json_booleans() {
    let tracks = vec![track(1, 1.0).with("has_stems", true), track(2, 1.0).with("has_stems", "TRUE")];
    let out = apply_rules(tracks, &[stems_boost()], "stems").unwrap();
    assert!(close(score(&out.results, "1"), 1.3));
    assert_eq!(score(&out.results, "2"), 1.0);
}

#[test]
fn scorers_compose_multiplicatively_in_order() {
    let tracks = vec![track(1, 1.0).with("library_name", "Rock Library").with("has_stems", "true")];
    let rules = vec![library_boost("rock", "Rock Library", 1.5), stems_boost()];
    let out = apply_rules(tracks, &rules, "rock stems").unwrap();

    assert!(close(score(&out.results, "1"), 1.5 * 1.3));
    let adj = &out.score_adjustments;
    assert_eq!(adj.len(), 2);
    assert_eq!(adj[0].rule_id, "rock");
    assert!(close(adj[1].original_score, adj[0].new_score));
}

#[test]
fn recency_decay_records_every_aged_track() {
    let rule = rule! {
        id: "fresh",
        pattern: "new",
        action: RuleAction::RecencyDecay(RecencyDecay {
            horizon_months: 24,
            horizon_threshold: 0.5,
            min_factor: 0.2,
            date_field: DATE.into(),
        }),
    };
    let tracks = vec![
        track(1, 1.0).with(DATE, "06/15/2024"),
        track(2, 1.0).with(DATE, "2022-06-15"),
        track(3, 1.0).with(DATE, "someday"),
    ];
    let out = apply_rules(tracks, &[rule], "new music").unwrap();

    assert_eq!(score(&out.results, "1"), 1.0);
    let brand_new = &out.score_adjustments[0];
    assert_eq!(brand_new.recency_factor, Some(1.0), "recorded even at factor 1.0");
    assert_eq!(brand_new.age_months, Some(0.0));

    let two_years = score(&out.results, "2");
    assert!((two_years - 0.5).abs() < 0.01, "got {two_years}");

    assert_eq!(score(&out.results, "3"), 1.0);
    assert_eq!(out.score_adjustments.len(), 2, "undated tracks are skipped");
    assert_eq!(out.applied_rules[0].affected_tracks, 2);
}

#[test]
fn unvalidated_decay_floor_does_not_panic() {
    let rule = rule! {
        id: "fresh",
        pattern: "new",
        action: RuleAction::RecencyDecay(RecencyDecay {
            horizon_months: 12,
            horizon_threshold: 0.5,
            min_factor: 1.5,
            date_field: DATE.into(),
        }),
    };
    let tracks = vec![track(1, 0.8).with(DATE, "2014-06-15")];
    let out = apply_rules(tracks, &[rule], "new").unwrap();

    assert_eq!(score(&out.results, "1"), 0.8);
    assert_eq!(out.score_adjustments[0].recency_factor, Some(1.0));
}

#[test]
fn scoring_requires_scores() {
    let tracks = vec![track(1, 1.0), Track::new().with("id", 2).with("has_stems", "true")];
    let err = apply_rules(tracks, &[stems_boost()], "stems").unwrap_err();
    assert_eq!(err, EngineInputError::MissingScore { index: 1, track_id: "2".into() });
}

#[test]
fn pre_query_rules_do_not_require_scores() {
    let rule = rule! {
        id: "facets",
        pattern: "rock",
        action: RuleAction::GenreSimplification(GenreSimplification {
            auto_apply_facets: vec!["Rock".into()],
            mode: FacetMode::Restrict,
        }),
    };
    let tracks = vec![Track::new().with("id", 1)];
    let out = apply_rules(tracks.clone(), &[rule], "rock").unwrap();
    assert_eq!(out.results, tracks);
}

// --- Pre-query ----------------------------------------------------------------

#[test]
fn genre_simplification_emits_facets_only() {
    let rule = rule! {
        id: "rock-facets",
        pattern: "rock",
        action: RuleAction::GenreSimplification(GenreSimplification {
            auto_apply_facets: vec!["Classic Rock".into(), "Alternative Rock".into()],
            mode: FacetMode::Expand,
        }),
    };
    let out = apply_rules(vec![track(1, 1.0)], &[rule], "rock").unwrap();

    assert_eq!(out.expanded_facets, vec!["Classic Rock", "Alternative Rock"]);
    assert!(out.score_adjustments.is_empty());
    assert_eq!(out.applied_rules[0].affected_tracks, 0);
}

#[test]
fn facets_concatenate_without_dedup() {
    let facet_rule = |id: &str, facets: &[&str]| {
        rule! {
            id: id,
            pattern: "rock",
            action: RuleAction::GenreSimplification(GenreSimplification {
                auto_apply_facets: facets.iter().map(|f| f.to_string()).collect(),
                mode: FacetMode::Expand,
            }),
        }
    };
    let rules = vec![facet_rule("a", &["Rock", "Punk"]), facet_rule("b", &["Rock"]), facet_rule("empty", &[])];
    let plan = crate::prepare_query(&rules);

    assert_eq!(plan.expanded_facets, vec!["Rock", "Punk", "Rock"]);
    assert_eq!(plan.facet_groups.len(), 2);
    assert_eq!(plan.applied_rules.len(), 2, "a rule with no facets has no effect");
}

#[test]
fn filter_optimization_emits_filter() {
    let rule = rule! {
        id: "instrumental",
        pattern: "instrumental",
        action: RuleAction::FilterOptimization(FilterOptimization {
            auto_apply_filter: Filter {
                field: "vocal_type".into(),
                value: "instrumental".into(),
                operator: FilterOperator::Equals,
            },
        }),
    };
    let out = apply_rules(vec![], &[rule], "instrumental").unwrap();

    assert_eq!(
        serde_json::to_value(&out.auto_filters).unwrap(),
        json!([{"field": "vocal_type", "value": "instrumental", "operator": "equals"}])
    );
}

// --- Reorderers ---------------------------------------------------------------

fn dated(id: &str, date: &str) -> Track {
    Track::new().with("id", id).with(DATE, date)
}

#[test]
fn recency_interleaving_alternates_buckets() {
    let tracks = vec![
        dated("r1", "2024-05-15"),
        dated("r2", "2024-05-15"),
        dated("v1", "2022-06-15"),
        dated("v2", "2022-06-15"),
    ];
    let out = apply_rules(tracks, &[recency_interleave("RVRV", 1)], "mix").unwrap();

    assert_eq!(ids(&out.results), vec!["r1", "v1", "r2", "v2"]);
    assert_eq!(out.applied_rules[0].affected_tracks, 2);
    assert!(out.score_adjustments.is_empty());
}

#[test]
fn recency_interleaving_borrows_then_appends() {
    let tracks = vec![
        dated("ancient", "1970-01-01"),
        dated("r1", "2024-05-15"),
        dated("v1", "2022-06-15"),
        dated("v2", "2021-06-15"),
        dated("undated", "n/a"),
        dated("v3", "2020-06-15"),
    ];
    // R R R with one recent track: the 2nd and 3rd R borrow from vintage.
    let out = apply_rules(tracks, &[recency_interleave("R R R", 1)], "mix").unwrap();
    assert_eq!(ids(&out.results), vec!["r1", "v1", "v2", "v3", "ancient", "undated"]);
}

#[test]
fn recency_interleaving_repeats_pattern() {
    let tracks = vec![
        dated("r1", "2024-05-15"),
        dated("r2", "2024-04-15"),
        dated("r3", "2024-03-15"),
        dated("v1", "2022-06-15"),
        dated("v2", "2021-06-15"),
        dated("v3", "2020-06-15"),
    ];
    let once = apply_rules(tracks.clone(), &[recency_interleave("rv", 1)], "mix").unwrap();
    assert_eq!(ids(&once.results), vec!["r1", "v1", "r2", "r3", "v2", "v3"]);

    let thrice = apply_rules(tracks, &[recency_interleave("rv", 3)], "mix").unwrap();
    assert_eq!(ids(&thrice.results), vec!["r1", "v1", "r2", "v2", "r3", "v3"]);
}

#[test]
fn unchanged_order_is_not_reported() {
    let tracks = vec![dated("r1", "2024-05-15"), dated("v1", "2022-06-15")];
    let out = apply_rules(tracks, &[recency_interleave("RV", 1)], "mix").unwrap();
    assert_eq!(ids(&out.results), vec!["r1", "v1"]);
    assert!(out.applied_rules.is_empty());
}

fn blues(id: &str, subgenre: &str, score: f64) -> Track {
    Track::new().with("id", id).with("subgenre", subgenre).with("_relevance_score", score)
}

#[test]
fn subgenre_interleaving_follows_letters() {
    let tracks = vec![
        blues("d1", "Delta Blues", 0.9),
        blues("d2", "delta blues", 0.8),
        blues("c1", "Chicago Blues", 0.7),
        blues("c2", "Chicago Blues", 0.6),
        blues("x1", "Texas Blues", 0.95),
    ];
    let out = apply_rules(tracks, &[blues_interleave("A B A B", InterleaveFallback::Relevance)], "blues").unwrap();
    assert_eq!(ids(&out.results), vec!["d1", "c1", "d2", "c2", "x1"]);
}

#[test]
fn subgenre_relevance_fallback_takes_best_remaining() {
    let tracks = vec![
        blues("d1", "Delta Blues", 0.5),
        blues("c1", "Chicago Blues", 0.4),
        blues("c2", "Chicago Blues", 0.3),
        blues("x1", "Texas Blues", 0.9),
        blues("x2", "Texas Blues", 0.2),
    ];
    let out = apply_rules(tracks, &[blues_interleave("AAB", InterleaveFallback::Relevance)], "blues").unwrap();
    // Second A: Delta is exhausted, best remaining is x1.
    assert_eq!(ids(&out.results), vec!["d1", "x1", "c1", "c2", "x2"]);
}

#[test]
fn subgenre_skip_fallback_omits_the_slot() {
    let tracks = vec![
        blues("d1", "Delta Blues", 0.5),
        blues("c1", "Chicago Blues", 0.4),
        blues("c2", "Chicago Blues", 0.3),
        blues("x1", "Texas Blues", 0.9),
    ];
    let out = apply_rules(tracks, &[blues_interleave("AABB", InterleaveFallback::Skip)], "blues").unwrap();
    assert_eq!(ids(&out.results), vec!["d1", "c1", "c2", "x1"]);
}

#[test]
fn subgenre_tail_is_sorted_by_score_keeping_ties_stable() {
    let tracks = vec![
        blues("d1", "Delta Blues", 0.1),
        blues("x1", "Texas Blues", 0.5),
        blues("x2", "Texas Blues", 0.7),
        blues("x3", "Texas Blues", 0.5),
    ];
    let out = apply_rules(tracks, &[blues_interleave("A", InterleaveFallback::Skip)], "blues").unwrap();
    assert_eq!(ids(&out.results), vec!["d1", "x2", "x1", "x3"]);
}

// --- Whole pipeline -----------------------------------------------------------

#[test]
fn reorderers_run_after_scorers() {
    let boost_texas = rule! {
        id: "texas",
        pattern: "blues",
        priority: 10,
        action: RuleAction::FeatureBoost(FeatureBoost {
            boost_field: "subgenre".into(),
            boost_value: "Texas Blues".into(),
            boost_factor: 10.0,
        }),
    };
    let tracks = vec![
        blues("d1", "Delta Blues", 0.5),
        blues("x1", "Texas Blues", 0.1),
        blues("x2", "Texas Blues", 0.2),
    ];
    // The reorder rule is listed first but still runs in the reorder phase.
    let rules = vec![blues_interleave("A", InterleaveFallback::Skip), boost_texas];
    let out = apply_rules(tracks, &rules, "blues").unwrap();

    assert_eq!(ids(&out.results), vec!["d1", "x2", "x1"]);
    let kinds: Vec<RuleKind> = out.applied_rules.iter().map(|r| r.kind).collect();
    assert_eq!(kinds, vec![RuleKind::FeatureBoost, RuleKind::SubgenreInterleaving]);
}

#[test]
fn empty_inputs_are_a_no_op() {
    let out = apply_rules(vec![], &[], "anything").unwrap();
    assert!(out.results.is_empty() && out.applied_rules.is_empty());

    let tracks = vec![track(1, 1.0)];
    let out = apply_rules(tracks.clone(), &[], "anything").unwrap();
    assert_eq!(out.results, tracks);
}

#[test]
fn apply_rules_is_idempotent_on_fresh_copies() {
    let tracks = vec![
        track(1, 1.0).with("library_name", "Rock Library").with(DATE, "2023-01-01"),
        track(2, 0.7).with("has_stems", "true").with(DATE, "2010-05-01"),
        track(3, 0.9).with(DATE, "2024-06-01"),
    ];
    let rules = vec![library_boost("rock", "Rock Library", 1.5), stems_boost(), recency_interleave("RV", 2)];
    let ctx = Context::default();

    let first = apply_rules_with(tracks.clone(), &rules, "rock stems mix", &ctx).unwrap();
    let second = apply_rules_with(tracks, &rules, "rock stems mix", &ctx).unwrap();

    assert_eq!(serde_json::to_value(&first).unwrap(), serde_json::to_value(&second).unwrap());
}

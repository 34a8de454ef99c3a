use cadence_rerank::{
    FacetGroup, FacetMode, Filter, PatternCheck, PreQueryPlan, RerankOutcome, RuleStats, SCORE_FIELD, Track,
};

mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const BOLD: &str = "\x1b[1m";

    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const RED: &str = "\x1b[31m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";

    pub struct Palette {
        enabled: bool,
    }

    impl Palette {
        pub fn new(enabled: bool) -> Self {
            Self { enabled }
        }

        pub fn paint(&self, s: impl AsRef<str>, color: &str) -> String {
            if self.enabled { format!("{}{}{}", color, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn bold(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", BOLD, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn dim(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", DIM, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }
    }
}

fn section(palette: &ansi::Palette, title: &str) {
    println!("\n{}", palette.paint(format!("━━━ {title} ━━━"), ansi::GRAY));
}

pub fn print_plan(query: &str, plan: &PreQueryPlan, color: bool) {
    let palette = ansi::Palette::new(color);
    println!("\n{}", palette.bold(palette.paint(format!("⚙  Query: \"{query}\""), ansi::CYAN)));

    section(&palette, "Pre-search plan");
    print_plan_body(&plan.facet_groups, &plan.auto_filters, &palette);

    if plan.applied_rules.is_empty() {
        println!("\n{}", palette.dim("  No pre-search rules matched"));
    }
    println!();
}

fn print_plan_body(groups: &[FacetGroup], filters: &[Filter], palette: &ansi::Palette) {
    if groups.is_empty() && filters.is_empty() {
        println!("{}", palette.dim("  No facets or filters"));
        return;
    }
    for group in groups {
        let mode = match group.mode {
            FacetMode::Expand => "expand (OR)",
            FacetMode::Restrict => "restrict (AND)",
        };
        println!(
            "  {} {} {} {}",
            palette.paint("facets", ansi::BLUE),
            palette.bold(group.facets.join(", ")),
            palette.dim(format!("│ {mode} │ rule:")),
            palette.paint(&group.rule_id, ansi::CYAN)
        );
    }
    for filter in filters {
        println!(
            "  {} {} {:?} {}",
            palette.paint("filter", ansi::BLUE),
            palette.bold(&filter.field),
            filter.operator,
            palette.paint(&filter.value, ansi::GREEN)
        );
    }
}

pub fn print_outcome(query: &str, outcome: &RerankOutcome, color: bool) {
    let palette = ansi::Palette::new(color);
    println!("\n{}", palette.bold(palette.paint(format!("⚙  Reranking: \"{query}\""), ansi::CYAN)));

    section(&palette, "Applied rules");
    if outcome.applied_rules.is_empty() {
        println!("{}", palette.dim("  No rule had an effect"));
        println!("\n{}", palette.paint("Possible reasons:", ansi::YELLOW));
        println!("  • No enabled rule pattern matched the query");
        println!("  • Matched rules found no qualifying tracks (library, field value, date)");
        println!("\n{}", palette.dim("  Tip: Set RUST_LOG=cadence=trace to see every rule match"));
    } else {
        for applied in &outcome.applied_rules {
            println!(
                "  {} {} {} {}",
                palette.paint(&applied.rule_id, ansi::CYAN),
                palette.dim(format!("[{}]", applied.kind)),
                palette.paint(format!("{} affected", applied.affected_tracks), ansi::YELLOW),
                palette.dim(&applied.description),
            );
        }
    }

    section(&palette, "Pre-search plan");
    print_plan_body(&outcome.facet_groups, &outcome.auto_filters, &palette);

    if !outcome.score_adjustments.is_empty() {
        section(&palette, "Score adjustments");
        for adj in &outcome.score_adjustments {
            let detail = match (adj.score_multiplier, adj.recency_factor, adj.age_months) {
                (Some(m), _, _) => format!("×{m}"),
                (None, Some(f), Some(age)) => format!("×{f:.3} (age {age:.1} mo)"),
                _ => String::new(),
            };
            println!(
                "  {} {:.4} → {} {} {}",
                palette.paint(format!("track {}", adj.track_id), ansi::BLUE),
                adj.original_score,
                palette.paint(format!("{:.4}", adj.new_score), ansi::GREEN),
                palette.paint(detail, ansi::YELLOW),
                palette.dim(format!("│ {}", adj.reason)),
            );
        }
    }

    section(&palette, "Results");
    if outcome.results.is_empty() {
        println!("{}", palette.dim("  No tracks"));
    }
    for (idx, track) in outcome.results.iter().enumerate() {
        println!(
            "  {} {} {}",
            palette.paint(format!("[{idx}]"), ansi::GRAY),
            palette.bold(palette.paint(track_label(track), ansi::GREEN)),
            palette.dim(format!("│ {SCORE_FIELD}: {}", fmt_score(track))),
        );
    }

    let m = &outcome.metrics;
    section(&palette, "Timing");
    println!(
        "  Total: {}  │  Match: {} ({} evaluated, {} matched)  │  Score: {}  │  Reorder: {}",
        palette.paint(format!("{:?}", m.total), ansi::GREEN),
        palette.paint(format!("{:?}", m.matching), ansi::CYAN),
        m.rules_evaluated,
        m.rules_matched,
        palette.dim(format!("{:?}", m.scoring)),
        palette.dim(format!("{:?}", m.reorder)),
    );
    println!();
}

pub fn print_pattern_check(pattern: &str, check: &PatternCheck, color: bool) {
    let palette = ansi::Palette::new(color);
    let verdict = match (check.valid, check.safe) {
        (true, true) => palette.paint("✓ safe", ansi::GREEN),
        (true, false) => palette.paint("⚠ unsafe", ansi::YELLOW),
        (false, _) => palette.paint("✗ invalid", ansi::RED),
    };
    println!("{} {}", palette.bold(pattern), verdict);
    if let Some(reason) = &check.reason {
        println!("  {}", palette.dim(reason));
    }
}

pub fn print_stats(stats: &RuleStats, color: bool) {
    let palette = ansi::Palette::new(color);
    section(&palette, "Rules");
    println!(
        "  Total: {}  │  Enabled: {}  │  Disabled: {}",
        palette.bold(stats.total.to_string()),
        palette.paint(stats.enabled.to_string(), ansi::GREEN),
        palette.dim(stats.disabled.to_string()),
    );
    for (kind, counts) in &stats.by_type {
        println!(
            "  {:<24} {} {}",
            palette.paint(kind.as_str(), ansi::CYAN),
            counts.enabled,
            palette.dim(format!("/ {}", counts.total)),
        );
    }
    println!();
}

fn track_label(track: &Track) -> String {
    let id = track.id();
    match track.field_text("title") {
        Some(title) => format!("{id} {title}"),
        None => id,
    }
}

fn fmt_score(track: &Track) -> String {
    track.relevance_score().map(|s| format!("{s:.4}")).unwrap_or_else(|| "-".to_string())
}

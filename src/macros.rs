#[macro_export]
macro_rules! regex {
    ($pat:literal) => {{
        static RE: once_cell::sync::Lazy<regex::Regex> =
            once_cell::sync::Lazy::new(|| regex::Regex::new($pat).unwrap());
        &*RE
    }};
}

/// Build a [`Rule`](crate::Rule) with the document defaults filled in.
///
/// ```
/// use cadence_rerank::{FeatureBoost, RuleAction, rule};
///
/// let stems = rule! {
///     id: "stems",
///     pattern: r"\bstems?\b",
///     priority: 70,
///     action: RuleAction::FeatureBoost(FeatureBoost {
///         boost_field: "has_stems".into(),
///         boost_value: "true".into(),
///         boost_factor: 1.3,
///     }),
/// };
/// assert!(stems.enabled);
/// ```
#[macro_export]
macro_rules! rule {
    (@or $default:expr, $value:expr) => { $value };
    (@or $default:expr) => { $default };
    (
        id: $id:expr,
        pattern: $pattern:expr
        $(, description: $description:expr)?
        $(, priority: $priority:expr)?
        $(, enabled: $enabled:expr)?
        , action: $action:expr
        $(,)?
    ) => {{
        $crate::Rule {
            id: ::std::string::String::from($id),
            pattern: ::std::string::String::from($pattern),
            description: ::std::string::String::from($crate::rule!(@or "" $(, $description)?)),
            priority: $crate::rule!(@or $crate::DEFAULT_PRIORITY $(, $priority)?),
            enabled: $crate::rule!(@or true $(, $enabled)?),
            action: $action,
            lifecycle: $crate::RuleLifecycle::default(),
        }
    }};
}

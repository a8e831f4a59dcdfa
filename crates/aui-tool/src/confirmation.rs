use serde_json::Value;
use std::sync::Arc;

/// Predicate deciding whether an input needs human approval
pub type ConfirmPredicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Human-in-the-loop policy attached to a tool.
///
/// The policy only reports whether approval is needed; hosts decide how to
/// ask for it and must not run the tool until it is granted.
#[derive(Clone, Default)]
pub enum Confirmation {
    #[default]
    Never,
    Always,
    When(ConfirmPredicate),
}

impl Confirmation {
    /// Whether any input may need approval
    pub fn is_required(&self) -> bool {
        !matches!(self, Confirmation::Never)
    }

    pub fn should_confirm(&self, input: &Value) -> bool {
        match self {
            Confirmation::Never => false,
            Confirmation::Always => true,
            Confirmation::When(predicate) => predicate(input),
        }
    }
}

impl std::fmt::Debug for Confirmation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Confirmation::Never => f.write_str("Never"),
            Confirmation::Always => f.write_str("Always"),
            Confirmation::When(_) => f.write_str("When(<predicate>)"),
        }
    }
}

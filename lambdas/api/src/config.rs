use std::env;

/// Runtime configuration, resolved once at startup. Handlers never fall back
/// to per-request environment lookups or hard-coded substitutes.
#[derive(Clone, Debug)]
pub struct Config {
    /// Table holding the per-day workflow status counters maintained by the
    /// summary projector.
    pub summary_table: String,
    /// Department recorded when check-in does not name one.
    pub default_department: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            summary_table: env::var("DYNAMODB_SUMMARY_TABLE")
                .unwrap_or("opd-workflow-summary".to_string()),
            default_department: env::var("DEFAULT_DEPARTMENT").unwrap_or("general".to_string()),
        }
    }
}

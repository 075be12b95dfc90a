//! Session configuration.

/// Schema name used when table metadata does not name one.
pub const DEFAULT_SCHEMA: &str = "dbo";

/// Tracked session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Record every tracked operation into the change log
    pub track_changes: bool,
    /// Schema used in table keys when metadata carries none
    pub default_schema: String,
}

impl SessionConfig {
    /// Configuration with change tracking enabled.
    pub fn tracked() -> Self {
        Self {
            track_changes: true,
            ..Default::default()
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            track_changes: false,
            default_schema: DEFAULT_SCHEMA.to_string(),
        }
    }
}

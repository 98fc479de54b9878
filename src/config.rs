//! Context configuration.

use serde::{Deserialize, Serialize};

// ============================================================================
// Collision policy
// ============================================================================

/// What decode does when a document's identity is already live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// Return the live instance. Repeated decode is idempotent and cyclic
    /// relation graphs terminate.
    #[default]
    ReuseLive,
    /// Build a new entity under a freshly generated identity.
    Fork,
}

// ============================================================================
// Config
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub collision: CollisionPolicy,
    /// Pretty-print documents written by `dump`/`dumps`.
    pub pretty: bool,
    /// Create missing parent directories on `dump`.
    pub create_dirs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            collision: CollisionPolicy::ReuseLive,
            pretty: true,
            create_dirs: true,
        }
    }
}

impl Config {
    pub fn collision(mut self, policy: CollisionPolicy) -> Self {
        self.collision = policy;
        self
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn create_dirs(mut self, create: bool) -> Self {
        self.create_dirs = create;
        self
    }
}

// ============================================================================
// Decode options
// ============================================================================

/// Per-call decode settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodeOptions {
    /// Resolve and attach relation fields.
    pub relations: bool,
    pub collision: CollisionPolicy,
}

impl DecodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn relations(mut self, relations: bool) -> Self {
        self.relations = relations;
        self
    }

    pub fn collision(mut self, policy: CollisionPolicy) -> Self {
        self.collision = policy;
        self
    }
}

impl From<&Config> for DecodeOptions {
    fn from(config: &Config) -> Self {
        Self { relations: false, collision: config.collision }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.collision, CollisionPolicy::ReuseLive);
        assert!(config.pretty && config.create_dirs);

        let options = DecodeOptions::new();
        assert!(!options.relations);
        assert_eq!(options.collision, CollisionPolicy::ReuseLive);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config = serde_json::from_str(r#"{"collision": "fork"}"#).unwrap();
        assert_eq!(config.collision, CollisionPolicy::Fork);
        assert!(config.pretty);
        assert_eq!(DecodeOptions::from(&config).collision, CollisionPolicy::Fork);
    }
}

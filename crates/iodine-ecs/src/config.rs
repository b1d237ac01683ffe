//! Construction-time settings for an [`Ecs`](crate::ecs::Ecs).

use serde::{Deserialize, Serialize};

use crate::EcsError;

/// Settings read once when an [`Ecs`](crate::ecs::Ecs) is built.
///
/// Missing fields in JSON fall back to [`Default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EcsConfig {
    /// Entity slots to reserve up front.
    pub initial_entities: usize,
    /// Events to reserve per queue buffer.
    pub event_capacity: usize,
    /// Record per-system timings on every step.
    pub collect_diagnostics: bool,
}

impl Default for EcsConfig {
    fn default() -> Self {
        Self {
            initial_entities: 1024,
            event_capacity: 64,
            collect_diagnostics: true,
        }
    }
}

impl EcsConfig {
    /// Parse a JSON document.
    pub fn from_json(json: &str) -> Result<Self, EcsError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Render as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, EcsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = EcsConfig::from_json(r#"{ "initial_entities": 16 }"#).unwrap();
        assert_eq!(config.initial_entities, 16);
        assert_eq!(config.event_capacity, EcsConfig::default().event_capacity);
        assert!(config.collect_diagnostics);
    }

    #[test]
    fn json_roundtrip() {
        let config = EcsConfig {
            initial_entities: 8,
            event_capacity: 2,
            collect_diagnostics: false,
        };
        let json = config.to_json().unwrap();
        assert_eq!(EcsConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn malformed_json_is_invalid_argument() {
        let err = EcsConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, EcsError::Config(_)));
        assert_eq!(err.kind(), crate::ErrorKind::InvalidArgument);
    }
}

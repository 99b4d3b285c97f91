use serde::{Deserialize, Serialize};

/// A model capability, as advertised by the model registry.
///
/// The set drives which configuration sections a node template exposes and
/// which input types an inference request may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Text,
    Vision,
    ToolUse,
    Embedding,
}

impl Capability {
    /// Parse a capability string, ignoring unknown values.
    ///
    /// Model rows may carry capabilities this build does not know about;
    /// they must not break template generation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Capability::Text),
            "vision" => Some(Capability::Vision),
            "tool_use" => Some(Capability::ToolUse),
            "embedding" => Some(Capability::Embedding),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Text => "text",
            Capability::Vision => "vision",
            Capability::ToolUse => "tool_use",
            Capability::Embedding => "embedding",
        }
    }
}

/// Parse a list of capability strings, dropping unknown entries.
pub fn parse_all(raw: &[String]) -> Vec<Capability> {
    raw.iter().filter_map(|s| Capability::parse(s)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_capabilities() {
        assert_eq!(Capability::parse("text"), Some(Capability::Text));
        assert_eq!(Capability::parse("tool_use"), Some(Capability::ToolUse));
        assert_eq!(Capability::parse("vision"), Some(Capability::Vision));
    }

    #[test]
    fn unknown_capability_is_dropped() {
        let raw = vec!["text".to_string(), "telepathy".to_string()];
        assert_eq!(parse_all(&raw), vec![Capability::Text]);
    }

    #[test]
    fn serde_round_trip_is_snake_case() {
        let json = serde_json::to_string(&Capability::ToolUse).unwrap();
        assert_eq!(json, "\"tool_use\"");
        let back: Capability = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Capability::ToolUse);
    }
}

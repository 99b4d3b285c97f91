//! Rich-content conversation messages as stored by the memory service
//! and carried in job payloads and memory-update events.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stored conversation message. `content` is an ordered list of parts;
/// the first `text` part is the canonical textual rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RichMessage {
    pub role: MessageRole,
    pub content: Vec<RichPart>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RichPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "file_ref")]
    FileRef { file_id: Uuid },
    #[serde(rename = "image_ref")]
    ImageRef { url: String },
}

impl RichMessage {
    pub fn text(role: MessageRole, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![RichPart::Text { text: text.into() }],
        }
    }

    /// The first `text` part, or empty when the message has none.
    pub fn first_text(&self) -> &str {
        self.content
            .iter()
            .find_map(|p| match p {
                RichPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_text_skips_non_text_parts() {
        let msg = RichMessage {
            role: MessageRole::User,
            content: vec![
                RichPart::FileRef {
                    file_id: Uuid::nil(),
                },
                RichPart::Text {
                    text: "hello".into(),
                },
                RichPart::Text {
                    text: "ignored".into(),
                },
            ],
        };
        assert_eq!(msg.first_text(), "hello");
    }

    #[test]
    fn first_text_empty_when_no_text_part() {
        let msg = RichMessage {
            role: MessageRole::Assistant,
            content: vec![RichPart::ImageRef {
                url: "https://example.test/x.png".into(),
            }],
        };
        assert_eq!(msg.first_text(), "");
    }

    #[test]
    fn part_serde_tags() {
        let part = RichPart::FileRef {
            file_id: Uuid::nil(),
        };
        let v = serde_json::to_value(&part).unwrap();
        assert_eq!(v["type"], "file_ref");
    }
}

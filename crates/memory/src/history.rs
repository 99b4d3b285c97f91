//! History shaping: buffer-window slicing, token estimation, and the
//! write-time summary fold.
//!
//! The summary for `conversation_summary` buckets is maintained when
//! messages are appended, so reads never trigger model traffic.

use px_proto::memory::{MessageRole, RichMessage};

pub const BUFFER_WINDOW_DEFAULT_K: usize = 10;
/// Each folded line keeps at most this many characters of a message.
const SUMMARY_LINE_CAP: usize = 240;

/// Last `k` exchanges (2·k messages), order preserved.
pub fn buffer_window(messages: &[RichMessage], k: usize) -> Vec<RichMessage> {
    let keep = k.saturating_mul(2);
    let start = messages.len().saturating_sub(keep);
    messages[start..].to_vec()
}

/// Rough token estimate used for bucket bookkeeping (≈4 chars/token).
pub fn estimate_tokens(messages: &[RichMessage]) -> usize {
    messages
        .iter()
        .map(|m| m.first_text().len().div_ceil(4))
        .sum()
}

/// Fold newly appended messages into the running summary: one clipped
/// line per message, prefixed by role.
pub fn fold_summary(previous: &str, appended: &[RichMessage]) -> String {
    let mut summary = previous.to_string();
    for msg in appended {
        let role = match msg.role {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        };
        let mut text = msg.first_text().replace('\n', " ");
        if text.len() > SUMMARY_LINE_CAP {
            text.truncate(SUMMARY_LINE_CAP);
            text.push('…');
        }
        if !summary.is_empty() {
            summary.push('\n');
        }
        summary.push_str(&format!("{role}: {text}"));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: MessageRole, text: &str) -> RichMessage {
        RichMessage::text(role, text)
    }

    #[test]
    fn window_keeps_last_k_pairs() {
        let messages: Vec<_> = (0..10)
            .map(|i| msg(MessageRole::User, &format!("m{i}")))
            .collect();
        let windowed = buffer_window(&messages, 2);
        assert_eq!(windowed.len(), 4);
        assert_eq!(windowed[0].first_text(), "m6");
        assert_eq!(windowed[3].first_text(), "m9");
    }

    #[test]
    fn window_larger_than_history_returns_all() {
        let messages = vec![msg(MessageRole::User, "only")];
        assert_eq!(buffer_window(&messages, 10).len(), 1);
    }

    #[test]
    fn summary_folds_roles_and_clips() {
        let long = "x".repeat(500);
        let folded = fold_summary(
            "",
            &[
                msg(MessageRole::User, "hello there"),
                msg(MessageRole::Assistant, &long),
            ],
        );
        let lines: Vec<_> = folded.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("user: hello"));
        assert!(lines[1].starts_with("assistant: "));
        assert!(lines[1].len() < 500);
    }

    #[test]
    fn summary_appends_to_previous() {
        let folded = fold_summary("user: earlier", &[msg(MessageRole::Assistant, "later")]);
        assert_eq!(folded, "user: earlier\nassistant: later");
    }

    #[test]
    fn token_estimate_scales_with_text() {
        let messages = vec![msg(MessageRole::User, "abcdefgh")];
        assert_eq!(estimate_tokens(&messages), 2);
    }
}

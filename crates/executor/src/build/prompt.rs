//! Prompt builder: compose the final conversation — system prompt, prior
//! history, and a user turn carrying the context block (knowledge-base
//! documents plus fetched file content) and any image inputs.

use px_domain::chat::{ChatContent, ChatMessage, ChatPart, Role};
use px_proto::job::RagDocument;
use px_proto::rpc::FileContent;

use super::BuildContext;

const SYSTEM_PROMPT: &str = "You are a helpful and intelligent AI assistant.";

pub fn build(ctx: &mut BuildContext) {
    let rag_docs = ctx
        .job
        .payload
        .resources
        .rag_context
        .as_ref()
        .map(|r| r.documents.as_slice())
        .unwrap_or(&[]);

    let user_text = compose_user_text(ctx.job.prompt_text(), rag_docs, &ctx.fetched);

    // Image inputs ride along as content parts for vision models.
    let image_urls: Vec<String> = ctx
        .fetched
        .iter()
        .filter_map(|c| match c {
            FileContent::ImageUrl { url } => Some(url.clone()),
            _ => None,
        })
        .chain(ctx.job.inputs().iter().filter_map(|i| match i {
            px_proto::job::InputItem::ImageUrl { url } => Some(url.clone()),
            _ => None,
        }))
        .collect();

    let user_message = if image_urls.is_empty() {
        ChatMessage::user(user_text)
    } else {
        let mut parts = vec![ChatPart::Text { text: user_text }];
        parts.extend(image_urls.into_iter().map(|url| ChatPart::Image { url }));
        ChatMessage {
            role: Role::User,
            content: ChatContent::Parts(parts),
        }
    };

    let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT)];
    messages.extend(ctx.history.iter().cloned());
    messages.push(user_message);
    ctx.messages = messages;

    tracing::info!(job_id = %ctx.job.id(), "prompt assembled");
}

/// Fold knowledge-base documents and fetched file text into a context
/// block ahead of the user's prompt.
fn compose_user_text(prompt: &str, rag_docs: &[RagDocument], fetched: &[FileContent]) -> String {
    let mut context_str = String::new();

    if !rag_docs.is_empty() {
        context_str.push_str("--- Context from Knowledge Base ---\n");
        for doc in rag_docs {
            context_str.push_str(&format!("Content: {}\n\n", doc.content));
        }
    }

    let file_texts: Vec<&str> = fetched
        .iter()
        .filter_map(|c| match c {
            FileContent::Text { content } => Some(content.as_str()),
            FileContent::Unsupported { content } => Some(content.as_str()),
            FileContent::ImageUrl { .. } => None,
        })
        .collect();
    if !file_texts.is_empty() {
        context_str.push_str("--- Context from Provided Files ---\n");
        for text in file_texts {
            context_str.push_str(&format!("Content: {text}\n\n"));
        }
    }

    if context_str.is_empty() {
        prompt.to_string()
    } else {
        format!("{context_str}Based on the context above, please respond to the following:\n\n{prompt}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_prompt_passes_through() {
        assert_eq!(compose_user_text("hello", &[], &[]), "hello");
    }

    #[test]
    fn context_block_precedes_prompt() {
        let docs = vec![RagDocument {
            content: "the sky is blue".into(),
        }];
        let fetched = vec![FileContent::Text {
            content: "grass is green".into(),
        }];
        let text = compose_user_text("what colors?", &docs, &fetched);
        assert!(text.starts_with("--- Context from Knowledge Base ---"));
        assert!(text.contains("the sky is blue"));
        assert!(text.contains("--- Context from Provided Files ---"));
        assert!(text.contains("grass is green"));
        assert!(text.ends_with("what colors?"));
    }

    #[test]
    fn image_content_is_not_folded_into_text() {
        let fetched = vec![FileContent::ImageUrl {
            url: "http://x.test/a.png".into(),
        }];
        assert_eq!(compose_user_text("look", &[], &fetched), "look");
    }
}

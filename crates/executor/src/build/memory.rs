//! Memory builder: convert the fetched history into role-tagged chat
//! messages. Takes the first text part of each entry; never mutates the
//! history itself.

use px_domain::chat::ChatMessage;
use px_proto::memory::MessageRole;

use super::BuildContext;

pub fn build(ctx: &mut BuildContext) {
    let Some(memory) = &ctx.job.payload.resources.memory_context else {
        return;
    };
    if memory.history.is_empty() {
        return;
    }

    ctx.history = memory
        .history
        .iter()
        .map(|msg| {
            let text = msg.first_text().to_string();
            match msg.role {
                MessageRole::User => ChatMessage::user(text),
                MessageRole::Assistant => ChatMessage::assistant(text),
            }
        })
        .collect();

    tracing::info!(
        job_id = %ctx.job.id(),
        messages = ctx.history.len(),
        "chat history formatted"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Job;
    use px_domain::chat::Role;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn history_maps_roles_and_first_text() {
        let payload = json!({
            "job_id": Uuid::new_v4().to_string(),
            "user_id": Uuid::new_v4().to_string(),
            "timestamp": "2025-06-01T12:00:00Z",
            "query": {"prompt": "hi"},
            "default_parameters": {},
            "resources": {
                "model_config": {"model_id": Uuid::new_v4().to_string(), "provider": "openai"},
                "memory_context": {
                    "bucket_id": Uuid::new_v4().to_string(),
                    "history": [
                        {"role": "user", "content": [
                            {"type": "file_ref", "file_id": Uuid::new_v4().to_string()},
                            {"type": "text", "text": "first question"}
                        ]},
                        {"role": "assistant", "content": [{"type": "text", "text": "first answer"}]}
                    ]
                }
            },
        });
        let job = Job::parse(&serde_json::to_vec(&payload).unwrap()).unwrap();
        let mut ctx = BuildContext::new(job);
        build(&mut ctx);

        assert_eq!(ctx.history.len(), 2);
        assert_eq!(ctx.history[0].role, Role::User);
        assert_eq!(ctx.history[0].content.text(), Some("first question"));
        assert_eq!(ctx.history[1].role, Role::Assistant);
    }
}

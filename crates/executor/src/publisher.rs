//! Result and feedback publication for the executor.

use px_bus::{ExchangeKind, Publisher};
use px_domain::Result;
use px_proto::events;
use px_proto::job::InputItem;
use px_proto::memory::{MessageRole, RichMessage, RichPart};
use px_proto::rpc::FileContent;
use uuid::Uuid;

use crate::build::BuildContext;

/// Publishes streaming chunks, final results, errors, and the memory
/// feedback event.
#[derive(Clone)]
pub struct ResultPublisher {
    publisher: Publisher,
}

impl ResultPublisher {
    pub fn new(publisher: Publisher) -> Self {
        Self { publisher }
    }

    pub async fn publish_stream_chunk(&self, job_id: Uuid, content: &str) -> Result<()> {
        self.publisher
            .publish(
                events::RESULTS_EXCHANGE,
                &events::streaming_key(job_id),
                &events::StreamChunk::new(job_id, content),
                ExchangeKind::Topic,
            )
            .await
    }

    pub async fn publish_final_result(&self, job_id: Uuid, content: &str) -> Result<()> {
        self.publisher
            .publish(
                events::RESULTS_EXCHANGE,
                events::INFERENCE_RESULT_FINAL,
                &events::FinalResult::success(job_id, content),
                ExchangeKind::Topic,
            )
            .await
    }

    pub async fn publish_error_result(&self, job_id: Uuid, error: &str) -> Result<()> {
        self.publisher
            .publish(
                events::RESULTS_EXCHANGE,
                events::INFERENCE_RESULT_ERROR,
                &events::ErrorResult::new(job_id, error),
                ExchangeKind::Topic,
            )
            .await
    }

    /// Memory feedback: the job's user/assistant exchange, keyed by the
    /// job id so the memory service deduplicates replays.
    pub async fn publish_memory_update(&self, ctx: &BuildContext, final_result: &str) -> Result<()> {
        let Some(bucket_id) = ctx.job.memory_bucket_id() else {
            tracing::debug!(job_id = %ctx.job.id(), "no memory bucket; skipping feedback");
            return Ok(());
        };

        let user_message = build_user_message(ctx);
        let assistant_message = RichMessage::text(MessageRole::Assistant, final_result);

        self.publisher
            .publish(
                events::MEMORY_EXCHANGE,
                events::MEMORY_CONTEXT_UPDATE,
                &events::MemoryContextUpdate {
                    idempotency_key: ctx.job.id(),
                    memory_bucket_id: bucket_id,
                    messages_to_add: vec![user_message, assistant_message],
                },
                ExchangeKind::Topic,
            )
            .await?;
        tracing::info!(job_id = %ctx.job.id(), %bucket_id, "memory update published");
        Ok(())
    }
}

/// The stored user message. File inputs are kept as references unless
/// the request asked for their materialized text to be persisted.
fn build_user_message(ctx: &BuildContext) -> RichMessage {
    let mut content = vec![RichPart::Text {
        text: ctx.job.prompt_text().to_string(),
    }];

    if ctx.job.persist_inputs_in_memory() {
        // Fold the fetched text into the saved message.
        for fetched in &ctx.fetched {
            if let FileContent::Text { content: text } = fetched {
                content.push(RichPart::Text { text: text.clone() });
            }
        }
        for input in ctx.job.inputs() {
            if let InputItem::ImageUrl { url } = input {
                content.push(RichPart::ImageRef { url: url.clone() });
            }
        }
    } else {
        for input in ctx.job.inputs() {
            match input {
                InputItem::FileId { id } => content.push(RichPart::FileRef { file_id: *id }),
                InputItem::ImageUrl { url } => {
                    content.push(RichPart::ImageRef { url: url.clone() })
                }
            }
        }
    }

    RichMessage {
        role: MessageRole::User,
        content,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Job;
    use serde_json::json;

    fn ctx_with_inputs(persist: bool) -> BuildContext {
        let file_id = Uuid::new_v4();
        let payload = json!({
            "job_id": Uuid::new_v4().to_string(),
            "user_id": Uuid::new_v4().to_string(),
            "timestamp": "2025-06-01T12:00:00Z",
            "query": {
                "prompt": "summarize",
                "inputs": [
                    {"type": "file_id", "id": file_id.to_string()},
                    {"type": "image_url", "url": "https://x.test/a.png"}
                ],
                "output_config": {"mode": "blocking", "persist_inputs_in_memory": persist}
            },
            "default_parameters": {},
            "resources": {"model_config": {
                "model_id": Uuid::new_v4().to_string(),
                "provider": "openai",
            }},
        });
        let job = Job::parse(&serde_json::to_vec(&payload).unwrap()).unwrap();
        let mut ctx = BuildContext::new(job);
        ctx.fetched = vec![FileContent::Text {
            content: "file body".into(),
        }];
        ctx
    }

    #[test]
    fn refs_preserved_when_not_persisting() {
        let msg = build_user_message(&ctx_with_inputs(false));
        assert!(matches!(msg.content[0], RichPart::Text { .. }));
        assert!(matches!(msg.content[1], RichPart::FileRef { .. }));
        assert!(matches!(msg.content[2], RichPart::ImageRef { .. }));
    }

    #[test]
    fn text_folded_when_persisting() {
        let msg = build_user_message(&ctx_with_inputs(true));
        // No file_ref parts; the materialized text is saved instead.
        assert!(!msg
            .content
            .iter()
            .any(|p| matches!(p, RichPart::FileRef { .. })));
        assert!(msg.content.iter().any(
            |p| matches!(p, RichPart::Text { text } if text == "file body")
        ));
    }
}

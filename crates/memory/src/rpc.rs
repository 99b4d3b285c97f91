//! Memory RPC servicer: serves processed history to the orchestrator.
//!
//! Buffer-window buckets return the last `k` exchanges; summary buckets
//! return the stored running summary (maintained at write time) followed
//! by the windowed tail.

use async_trait::async_trait;
use px_domain::{Error, Result};
use px_proto::memory::{MessageRole, RichMessage};
use px_proto::rpc::{MemoryRequest, MemoryResponse};

use crate::history;
use crate::store::MemoryStore;

pub struct MemoryServicer {
    memory: MemoryStore,
}

impl MemoryServicer {
    pub fn new(memory: MemoryStore) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl px_rpc::Servicer for MemoryServicer {
    type Request = MemoryRequest;
    type Response = MemoryResponse;

    async fn handle(&self, request: MemoryRequest) -> Result<MemoryResponse> {
        match request {
            MemoryRequest::GetHistory {
                bucket_id,
                principal,
            } => {
                let bucket = self
                    .memory
                    .find_bucket(bucket_id)
                    .await?
                    .ok_or_else(|| Error::not_found("memory bucket not found"))?;
                if bucket.owner_id != principal.id && !principal.is_staff {
                    return Err(Error::not_found("memory bucket not found"));
                }

                let messages = self.memory.messages(bucket_id).await?;
                let history = match bucket.memory_type.as_str() {
                    "conversation_summary" => {
                        let mut out = Vec::new();
                        if !bucket.summary.is_empty() {
                            out.push(RichMessage::text(
                                MessageRole::Assistant,
                                format!("Conversation so far:\n{}", bucket.summary),
                            ));
                        }
                        out.extend(history::buffer_window(&messages, bucket.window_k()));
                        out
                    }
                    _ => history::buffer_window(&messages, bucket.window_k()),
                };

                Ok(MemoryResponse::History { bucket_id, history })
            }
        }
    }
}

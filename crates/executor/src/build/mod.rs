//! Chain construction: the ordered build pipeline that turns a job into
//! a runnable context. Order matters — the prompt builder consumes what
//! the data and memory builders produce.

pub mod data;
pub mod memory;
pub mod model;
pub mod prompt;
pub mod tools;

use std::collections::HashSet;
use std::sync::Arc;

use px_domain::chat::{ChatMessage, ToolSpec};
use px_domain::config::Settings;
use px_domain::Result;
use px_proto::rpc::FileContent;
use px_providers::LlmProvider;

use crate::job::Job;

/// Holds the state of the chain construction; each builder populates a
/// slice of it.
pub struct BuildContext {
    pub job: Job,
    pub provider: Option<Arc<dyn LlmProvider>>,
    /// Sampling knobs resolved from defaults ⊕ overrides (user wins).
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub model_override: Option<String>,
    /// Role-tagged prior conversation.
    pub history: Vec<ChatMessage>,
    /// Tool specs handed to the model.
    pub tools: Vec<ToolSpec>,
    /// Tools whose arg schema requires a `session_id`.
    pub session_required: HashSet<String>,
    /// Retrieved on-the-fly inputs, in request order.
    pub fetched: Vec<FileContent>,
    /// The fully composed conversation (system + history + user turn).
    pub messages: Vec<ChatMessage>,
}

impl BuildContext {
    pub fn new(job: Job) -> Self {
        Self {
            job,
            provider: None,
            temperature: None,
            max_tokens: None,
            model_override: None,
            history: Vec::new(),
            tools: Vec::new(),
            session_required: HashSet::new(),
            fetched: Vec::new(),
            messages: Vec::new(),
        }
    }
}

/// Run the builders in order and return the finished context.
pub async fn build_context(job: Job, settings: &Settings) -> Result<BuildContext> {
    let mut ctx = BuildContext::new(job);
    data::build(&mut ctx, settings).await?;
    model::build(&mut ctx)?;
    memory::build(&mut ctx);
    tools::build(&mut ctx);
    prompt::build(&mut ctx);
    Ok(ctx)
}

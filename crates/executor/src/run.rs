//! Job execution: the tool-calling agent loop and the plain completion
//! path, with streaming publication and cooperative cancellation checks
//! at every suspension point.

use std::collections::HashSet;

use futures_util::StreamExt;
use px_domain::chat::{ChatContent, ChatMessage, ChatPart, Role, ToolCall};
use px_domain::stream::StreamEvent;
use px_domain::{Error, Result};
use px_proto::rpc::{ToolInvocation, ToolRequest, ToolResponse};
use px_providers::ChatRequest;
use uuid::Uuid;

use crate::build::BuildContext;
use crate::cancel::CancelToken;
use crate::publisher::ResultPublisher;

/// Hard cap on tool-call iterations before the job is failed.
const MAX_TOOL_LOOPS: usize = 25;

#[derive(Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Cancelled,
}

pub async fn run(
    ctx: &BuildContext,
    publisher: &ResultPublisher,
    cancel: &CancelToken,
    tools_rpc_addr: &str,
) -> Result<RunOutcome> {
    if ctx.tools.is_empty() {
        run_plain(ctx, publisher, cancel).await
    } else {
        run_agent_loop(ctx, publisher, cancel, tools_rpc_addr).await
    }
}

fn base_request(ctx: &BuildContext) -> ChatRequest {
    ChatRequest {
        messages: ctx.messages.clone(),
        tools: ctx.tools.clone(),
        temperature: ctx.temperature,
        max_tokens: ctx.max_tokens,
        model: ctx.model_override.clone(),
    }
}

// ── Plain chain (no tools) ─────────────────────────────────────────

async fn run_plain(
    ctx: &BuildContext,
    publisher: &ResultPublisher,
    cancel: &CancelToken,
) -> Result<RunOutcome> {
    let provider = ctx
        .provider
        .as_ref()
        .ok_or_else(|| Error::internal("no provider built"))?;
    let req = base_request(ctx);
    let job_id = ctx.job.id();

    if cancel.is_cancelled() {
        return Ok(RunOutcome::Cancelled);
    }

    if ctx.job.is_streaming() {
        let mut stream = provider.chat_stream(&req).await?;
        let mut full = String::new();
        while let Some(event) = stream.next().await {
            if cancel.is_cancelled() {
                return Ok(RunOutcome::Cancelled);
            }
            match event? {
                StreamEvent::Token { text } => {
                    publisher.publish_stream_chunk(job_id, &text).await?;
                    full.push_str(&text);
                }
                StreamEvent::Error { message } => {
                    return Err(Error::unavailable(message));
                }
                StreamEvent::Done { .. } => break,
            }
        }
        publisher.publish_final_result(job_id, &full).await?;
        finish(ctx, publisher, &full).await?;
        Ok(RunOutcome::Completed)
    } else {
        let response = provider.chat(&req).await?;
        publisher.publish_final_result(job_id, &response.content).await?;
        finish(ctx, publisher, &response.content).await?;
        Ok(RunOutcome::Completed)
    }
}

// ── Agent loop (tools present) ─────────────────────────────────────

async fn run_agent_loop(
    ctx: &BuildContext,
    publisher: &ResultPublisher,
    cancel: &CancelToken,
    tools_rpc_addr: &str,
) -> Result<RunOutcome> {
    let provider = ctx
        .provider
        .as_ref()
        .ok_or_else(|| Error::internal("no provider built"))?;
    let job_id = ctx.job.id();
    let mut messages = ctx.messages.clone();

    for round in 0..MAX_TOOL_LOOPS {
        if cancel.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }

        let mut req = base_request(ctx);
        req.messages = messages.clone();
        let response = provider.chat(&req).await?;

        if response.tool_calls.is_empty() {
            // Terminal message.
            if ctx.job.is_streaming() {
                publisher
                    .publish_stream_chunk(job_id, &response.content)
                    .await?;
            }
            publisher
                .publish_final_result(job_id, &response.content)
                .await?;
            finish(ctx, publisher, &response.content).await?;
            return Ok(RunOutcome::Completed);
        }

        tracing::info!(
            %job_id,
            round,
            calls = response.tool_calls.len(),
            "executing tool calls"
        );

        messages.push(assistant_turn(&response.content, &response.tool_calls));

        if cancel.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }

        let invocations =
            prepare_invocations(&response.tool_calls, &ctx.session_required, job_id);
        let outcome: ToolResponse = px_rpc::call(
            tools_rpc_addr,
            &ToolRequest::ExecuteMany { calls: invocations },
        )
        .await?;
        let results = match outcome {
            ToolResponse::Executed(results) => results,
            _ => return Err(Error::internal("unexpected tool rpc response")),
        };

        for result in results {
            messages.push(ChatMessage::tool_result(result.call_id, result.output));
        }
    }

    Err(Error::internal(format!(
        "tool loop did not terminate within {MAX_TOOL_LOOPS} rounds"
    )))
}

/// The assistant turn carrying its text and the tool_use blocks the
/// provider adapters echo back to the model.
fn assistant_turn(content: &str, tool_calls: &[ToolCall]) -> ChatMessage {
    let mut parts = Vec::new();
    if !content.is_empty() {
        parts.push(ChatPart::Text {
            text: content.to_string(),
        });
    }
    for call in tool_calls {
        parts.push(ChatPart::ToolUse {
            id: call.call_id.clone(),
            name: call.tool_name.clone(),
            input: call.arguments.clone(),
        });
    }
    ChatMessage {
        role: Role::Assistant,
        content: ChatContent::Parts(parts),
    }
}

/// Convert tool calls into invocations, injecting the job id as
/// `session_id` where the schema requires one and the model omitted it.
fn prepare_invocations(
    calls: &[ToolCall],
    session_required: &HashSet<String>,
    job_id: Uuid,
) -> Vec<ToolInvocation> {
    calls
        .iter()
        .map(|call| {
            let mut arguments = call.arguments.clone();
            if session_required.contains(&call.tool_name) {
                if let Some(obj) = arguments.as_object_mut() {
                    obj.entry("session_id")
                        .or_insert_with(|| serde_json::json!(job_id.to_string()));
                }
            }
            ToolInvocation {
                call_id: call.call_id.clone(),
                name: call.tool_name.clone(),
                arguments,
            }
        })
        .collect()
}

/// Post-success feedback hook.
async fn finish(ctx: &BuildContext, publisher: &ResultPublisher, final_result: &str) -> Result<()> {
    publisher.publish_memory_update(ctx, final_result).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall {
            call_id: "call_1".into(),
            tool_name: name.into(),
            arguments: args,
        }
    }

    #[test]
    fn session_id_injected_when_required_and_missing() {
        let job_id = Uuid::new_v4();
        let required: HashSet<String> = ["terminal".to_string()].into();
        let out = prepare_invocations(
            &[call("terminal", serde_json::json!({"command": "ls"}))],
            &required,
            job_id,
        );
        assert_eq!(out[0].arguments["session_id"], job_id.to_string());
    }

    #[test]
    fn model_supplied_session_id_wins() {
        let required: HashSet<String> = ["terminal".to_string()].into();
        let out = prepare_invocations(
            &[call(
                "terminal",
                serde_json::json!({"command": "ls", "session_id": "custom"}),
            )],
            &required,
            Uuid::new_v4(),
        );
        assert_eq!(out[0].arguments["session_id"], "custom");
    }

    #[test]
    fn tools_without_session_are_untouched() {
        let out = prepare_invocations(
            &[call("web_fetch", serde_json::json!({"url": "https://x"}))],
            &HashSet::new(),
            Uuid::new_v4(),
        );
        assert!(out[0].arguments.get("session_id").is_none());
    }

    #[test]
    fn assistant_turn_carries_tool_use_blocks() {
        let msg = assistant_turn(
            "thinking",
            &[call("web_fetch", serde_json::json!({"url": "https://x"}))],
        );
        match msg.content {
            ChatContent::Parts(parts) => {
                assert!(matches!(parts[0], ChatPart::Text { .. }));
                assert!(matches!(parts[1], ChatPart::ToolUse { .. }));
            }
            _ => panic!("expected parts"),
        }
    }
}

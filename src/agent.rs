use crate::config::AgentSettings;
use crate::index::SourceNode;
use crate::query_engine::{QueryEngineTool, ToolOutput};
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Request body for creating a remote assistant
#[derive(Debug, Clone, Serialize)]
pub struct AssistantRequest {
    pub model: String,
    pub name: String,
    pub instructions: String,
    pub tools: Vec<serde_json::Value>,
}

/// Lifecycle states of an assistant run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Run {
    pub id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub required_action: Option<RequiredAction>,
    #[serde(default)]
    pub last_error: Option<RunError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequiredAction {
    pub submit_tool_outputs: SubmitToolOutputs,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitToolOutputs {
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments
    pub arguments: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolOutputSubmission {
    pub tool_call_id: String,
    pub output: String,
}

/// The hosted assistant service
#[async_trait]
pub trait AssistantApi: Send + Sync {
    /// Returns the new assistant's id
    async fn create_assistant(&self, request: &AssistantRequest) -> Result<String>;

    /// Returns the new thread's id
    async fn create_thread(&self) -> Result<String>;

    async fn add_user_message(&self, thread_id: &str, content: &str) -> Result<()>;

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run>;

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run>;

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutputSubmission],
    ) -> Result<Run>;

    /// Text of the newest assistant message on the thread, if any
    async fn latest_assistant_message(&self, thread_id: &str) -> Result<Option<String>>;
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("assistant run {run_id} ended with status {status:?}: {message}")]
    RunEnded {
        run_id: String,
        status: RunStatus,
        message: String,
    },
    #[error("assistant run {0} completed without a reply")]
    MissingReply(String),
}

/// The assistant's answer to one chat turn
#[derive(Debug, Clone)]
pub struct AgentResponse {
    pub response: String,
    /// Every tool invocation made while answering, in call order
    pub sources: Vec<ToolOutput>,
    /// Source nodes of all tool invocations, in call order
    pub source_nodes: Vec<SourceNode>,
}

#[derive(Deserialize)]
struct ToolArguments {
    input: String,
}

/// A remote assistant with local query-engine tools and its own thread
pub struct AssistantAgent {
    api: Arc<dyn AssistantApi>,
    assistant_id: String,
    thread_id: String,
    tools: Vec<QueryEngineTool>,
    poll_interval: Duration,
}

impl AssistantAgent {
    /// Create the remote assistant and a fresh conversation thread
    pub async fn from_new(
        api: Arc<dyn AssistantApi>,
        settings: &AgentSettings,
        tools: Vec<QueryEngineTool>,
    ) -> Result<Self> {
        let request = AssistantRequest {
            model: settings.model.clone(),
            name: settings.name.clone(),
            instructions: settings.instructions.clone(),
            tools: tools.iter().map(QueryEngineTool::definition).collect(),
        };

        let assistant_id = api
            .create_assistant(&request)
            .await
            .context("Failed to create assistant")?;
        let thread_id = api
            .create_thread()
            .await
            .context("Failed to create assistant thread")?;

        info!(
            "Created assistant {} ({}) on thread {} with {} tools",
            settings.name,
            assistant_id,
            thread_id,
            tools.len()
        );

        Ok(AssistantAgent {
            api,
            assistant_id,
            thread_id,
            tools,
            poll_interval: settings.poll_interval,
        })
    }

    pub fn assistant_id(&self) -> &str {
        &self.assistant_id
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn tools(&self) -> &[QueryEngineTool] {
        &self.tools
    }

    /// Send one message and wait for the complete answer
    pub async fn chat(&self, message: &str) -> Result<AgentResponse> {
        self.api
            .add_user_message(&self.thread_id, message)
            .await
            .context("Failed to add message to thread")?;

        let mut run = self
            .api
            .create_run(&self.thread_id, &self.assistant_id)
            .await
            .context("Failed to start assistant run")?;
        let mut sources = Vec::new();

        loop {
            debug!("Run {} status: {:?}", run.id, run.status);
            match run.status {
                RunStatus::Completed => break,
                RunStatus::RequiresAction => {
                    let calls = run
                        .required_action
                        .as_ref()
                        .map(|action| action.submit_tool_outputs.tool_calls.as_slice())
                        .unwrap_or_default();
                    let outputs = self.run_tool_calls(calls, &mut sources).await?;
                    run = self
                        .api
                        .submit_tool_outputs(&self.thread_id, &run.id, &outputs)
                        .await
                        .context("Failed to submit tool outputs")?;
                }
                RunStatus::Queued
                | RunStatus::InProgress
                | RunStatus::Cancelling
                | RunStatus::Unknown => {
                    tokio::time::sleep(self.poll_interval).await;
                    run = self
                        .api
                        .retrieve_run(&self.thread_id, &run.id)
                        .await
                        .context("Failed to retrieve assistant run")?;
                }
                RunStatus::Cancelled
                | RunStatus::Failed
                | RunStatus::Incomplete
                | RunStatus::Expired => {
                    let message = run.last_error.map(|e| e.message).unwrap_or_default();
                    return Err(AgentError::RunEnded {
                        run_id: run.id,
                        status: run.status,
                        message,
                    }
                    .into());
                }
            }
        }

        let response = self
            .api
            .latest_assistant_message(&self.thread_id)
            .await
            .context("Failed to fetch assistant reply")?
            .ok_or_else(|| AgentError::MissingReply(run.id.clone()))?;

        let source_nodes = sources
            .iter()
            .filter_map(|s: &ToolOutput| s.raw_output.as_ref())
            .flat_map(|raw| raw.source_nodes.iter().cloned())
            .collect();

        Ok(AgentResponse {
            response,
            sources,
            source_nodes,
        })
    }

    async fn run_tool_calls(
        &self,
        calls: &[ToolCall],
        sources: &mut Vec<ToolOutput>,
    ) -> Result<Vec<ToolOutputSubmission>> {
        let mut outputs = Vec::with_capacity(calls.len());

        for call in calls {
            let Some(tool) = self.tools.iter().find(|t| t.name() == call.function.name) else {
                warn!("Assistant requested unknown tool {}", call.function.name);
                outputs.push(ToolOutputSubmission {
                    tool_call_id: call.id.clone(),
                    output: format!("Error: tool {} not found", call.function.name),
                });
                continue;
            };

            let input = serde_json::from_str::<ToolArguments>(&call.function.arguments)
                .map(|args| args.input)
                .unwrap_or_else(|_| call.function.arguments.clone());

            let output = tool
                .call(&input)
                .await
                .with_context(|| format!("Tool {} failed", call.function.name))?;

            outputs.push(ToolOutputSubmission {
                tool_call_id: call.id.clone(),
                output: output.content.clone(),
            });
            sources.push(output);
        }

        Ok(outputs)
    }
}

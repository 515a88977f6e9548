//! Deterministic stand-ins for the hosted services, used by unit tests.

use crate::agent::{
    AssistantApi, AssistantRequest, FunctionCall, RequiredAction, Run, RunStatus,
    SubmitToolOutputs, ToolCall, ToolOutputSubmission,
};
use crate::document::{Document, Metadata};
use crate::embeddings::{Embedder, Embedding};
use crate::llm::Llm;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

const HASH_DIMENSIONS: usize = 256;

pub fn text_document(file_name: &str, text: &str) -> Document {
    let mut metadata = Metadata::new();
    metadata.insert("file_name".to_string(), file_name.to_string());
    Document {
        text: text.to_string(),
        file_name: file_name.to_string(),
        mime_type: "text/plain".to_string(),
        metadata,
    }
}

/// Bag-of-words embedding over hashed, lowercased words
#[derive(Default)]
pub struct HashEmbedder {
    pub calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut values = vec![0.0; HASH_DIMENSIONS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            values[(hasher.finish() % HASH_DIMENSIONS as u64) as usize] += 1.0;
        }
        Ok(Embedding::new(values))
    }

    fn model_name(&self) -> &str {
        "hash-test"
    }
}

/// Answers with the retrieved context and remembers every prompt
#[derive(Default)]
pub struct ContextEchoLlm {
    pub prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl Llm for ContextEchoLlm {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let context = prompt
            .split("---------------------\n")
            .nth(1)
            .unwrap_or_default()
            .trim();
        Ok(format!("According to the documents: {}", context))
    }
}

/// How the scripted assistant behaves on each run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Script {
    /// Call the named tool once with the user's question, then answer
    CallTool(&'static str),
    /// Answer without calling any tool
    AnswerDirectly,
    /// The run fails on the first status check
    Fail,
    /// The run completes but no assistant message is stored
    NoReply,
}

#[derive(Default)]
struct ScriptState {
    assistants: Vec<AssistantRequest>,
    threads: usize,
    questions: Vec<String>,
    retrievals: usize,
    submitted: Vec<ToolOutputSubmission>,
    tool_outputs_submitted: bool,
}

/// In-memory stand-in for the hosted assistant service
pub struct ScriptedAssistant {
    script: Script,
    state: Mutex<ScriptState>,
}

impl ScriptedAssistant {
    pub fn new(script: Script) -> Self {
        ScriptedAssistant {
            script,
            state: Mutex::new(ScriptState::default()),
        }
    }

    pub fn assistants(&self) -> Vec<AssistantRequest> {
        self.state.lock().unwrap().assistants.clone()
    }

    pub fn questions(&self) -> Vec<String> {
        self.state.lock().unwrap().questions.clone()
    }

    pub fn submitted(&self) -> Vec<ToolOutputSubmission> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn retrievals(&self) -> usize {
        self.state.lock().unwrap().retrievals
    }

    fn run(id: &str, status: RunStatus) -> Run {
        Run {
            id: id.to_string(),
            status,
            required_action: None,
            last_error: None,
        }
    }
}

#[async_trait]
impl AssistantApi for ScriptedAssistant {
    async fn create_assistant(&self, request: &AssistantRequest) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.assistants.push(request.clone());
        Ok(format!("asst_{}", state.assistants.len()))
    }

    async fn create_thread(&self) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.threads += 1;
        Ok(format!("thread_{}", state.threads))
    }

    async fn add_user_message(&self, _thread_id: &str, content: &str) -> Result<()> {
        self.state.lock().unwrap().questions.push(content.to_string());
        Ok(())
    }

    async fn create_run(&self, _thread_id: &str, _assistant_id: &str) -> Result<Run> {
        let mut state = self.state.lock().unwrap();
        state.tool_outputs_submitted = false;
        Ok(Self::run(
            &format!("run_{}", state.questions.len()),
            RunStatus::Queued,
        ))
    }

    async fn retrieve_run(&self, _thread_id: &str, run_id: &str) -> Result<Run> {
        let mut state = self.state.lock().unwrap();
        state.retrievals += 1;

        let run = match self.script {
            Script::Fail => Run {
                last_error: Some(crate::agent::RunError {
                    code: "server_error".to_string(),
                    message: "scripted failure".to_string(),
                }),
                ..Self::run(run_id, RunStatus::Failed)
            },
            Script::CallTool(name) if !state.tool_outputs_submitted => {
                let question = state.questions.last().cloned().unwrap_or_default();
                Run {
                    required_action: Some(RequiredAction {
                        submit_tool_outputs: SubmitToolOutputs {
                            tool_calls: vec![ToolCall {
                                id: "call_1".to_string(),
                                function: FunctionCall {
                                    name: name.to_string(),
                                    arguments: serde_json::json!({ "input": question })
                                        .to_string(),
                                },
                            }],
                        },
                    }),
                    ..Self::run(run_id, RunStatus::RequiresAction)
                }
            }
            _ => Self::run(run_id, RunStatus::Completed),
        };
        Ok(run)
    }

    async fn submit_tool_outputs(
        &self,
        _thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutputSubmission],
    ) -> Result<Run> {
        let mut state = self.state.lock().unwrap();
        state.submitted.extend_from_slice(outputs);
        state.tool_outputs_submitted = true;
        Ok(Self::run(run_id, RunStatus::Queued))
    }

    async fn latest_assistant_message(&self, _thread_id: &str) -> Result<Option<String>> {
        let state = self.state.lock().unwrap();
        match self.script {
            Script::NoReply => Ok(None),
            Script::Fail => Err(anyhow!("no messages for a failed run")),
            _ => Ok(Some(match state.submitted.last() {
                Some(output) => format!("Answer: {}", output.output),
                None => "I could not find that in the documents.".to_string(),
            })),
        }
    }
}

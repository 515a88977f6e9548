use crate::agent::{AssistantApi, AssistantRequest, Run, ToolOutputSubmission};
use crate::config::OpenAiConfig;
use crate::embeddings::{Embedder, Embedding};
use crate::llm::Llm;
use anyhow::Result;
use async_trait::async_trait;
use log::{debug, error};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Maximum number of texts sent in one embeddings request
const EMBED_BATCH_SIZE: usize = 10;

/// Client for the OpenAI embeddings, chat completions and Assistants APIs
#[derive(Clone)]
pub struct OpenAiClient {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiClient {
    /// Create a new OpenAI client
    pub fn new(config: OpenAiConfig) -> Self {
        Self::with_http_client(config, reqwest::Client::new())
    }

    /// Create a client on top of a preconfigured HTTP client
    pub fn with_http_client(config: OpenAiConfig, client: reqwest::Client) -> Self {
        OpenAiClient { config, client }
    }

    /// Get the client configuration
    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .bearer_auth(&self.config.api_key)
            .header("OpenAI-Beta", "assistants=v2")
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        debug!("POST {}", path);
        let response = self
            .request(reqwest::Method::POST, path)
            .json(body)
            .send()
            .await?;
        parse_response(path, response).await
    }

    async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R> {
        debug!("GET {}", path);
        let response = self.request(reqwest::Method::GET, path).send().await?;
        parse_response(path, response).await
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        #[derive(Serialize)]
        struct EmbeddingRequest<'a> {
            model: &'a str,
            input: &'a [String],
        }

        let request = EmbeddingRequest {
            model: &self.config.embedding_model,
            input: texts,
        };
        let mut response: EmbeddingResponse = self.post("embeddings", &request).await?;

        if response.data.len() != texts.len() {
            return Err(anyhow::anyhow!(
                "Expected {} embeddings, got {}",
                texts.len(),
                response.data.len()
            ));
        }

        response.data.sort_by_key(|d| d.index);
        Ok(response
            .data
            .into_iter()
            .map(|d| Embedding::new(d.embedding))
            .collect())
    }
}

async fn parse_response<R: DeserializeOwned>(path: &str, response: reqwest::Response) -> Result<R> {
    if !response.status().is_success() {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        error!("OpenAI request to {} failed: {}", path, status);
        return Err(anyhow::anyhow!(
            "API request failed: {} {}",
            status,
            error_text
        ));
    }

    Ok(response.json().await?)
}

#[async_trait]
impl Embedder for OpenAiClient {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        self.embed_texts(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("No embedding returned"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBED_BATCH_SIZE) {
            embeddings.extend(self.embed_texts(batch).await?);
        }
        Ok(embeddings)
    }

    fn model_name(&self) -> &str {
        &self.config.embedding_model
    }
}

#[async_trait]
impl Llm for OpenAiClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = ChatCompletionRequest {
            model: &self.config.completion_model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.1,
        };

        let response: ChatCompletionResponse = self.post("chat/completions", &request).await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("No response generated"))
    }
}

#[async_trait]
impl AssistantApi for OpenAiClient {
    async fn create_assistant(&self, request: &AssistantRequest) -> Result<String> {
        let created: IdOnly = self.post("assistants", request).await?;
        Ok(created.id)
    }

    async fn create_thread(&self) -> Result<String> {
        let created: IdOnly = self.post("threads", &serde_json::json!({})).await?;
        Ok(created.id)
    }

    async fn add_user_message(&self, thread_id: &str, content: &str) -> Result<()> {
        let body = serde_json::json!({ "role": "user", "content": content });
        let _: IdOnly = self
            .post(&format!("threads/{}/messages", thread_id), &body)
            .await?;
        Ok(())
    }

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run> {
        let body = serde_json::json!({ "assistant_id": assistant_id });
        self.post(&format!("threads/{}/runs", thread_id), &body).await
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        self.get(&format!("threads/{}/runs/{}", thread_id, run_id))
            .await
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutputSubmission],
    ) -> Result<Run> {
        let body = serde_json::json!({ "tool_outputs": outputs });
        self.post(
            &format!("threads/{}/runs/{}/submit_tool_outputs", thread_id, run_id),
            &body,
        )
        .await
    }

    async fn latest_assistant_message(&self, thread_id: &str) -> Result<Option<String>> {
        let messages: MessageList = self
            .get(&format!("threads/{}/messages?order=desc&limit=1", thread_id))
            .await?;
        Ok(messages.data.into_iter().next().and_then(Message::into_text))
    }
}

#[derive(Deserialize, Debug)]
struct IdOnly {
    id: String,
}

#[derive(Deserialize, Debug)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize, Debug)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize, Debug)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize, Debug)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct MessageList {
    data: Vec<Message>,
}

#[derive(Deserialize, Debug)]
struct Message {
    role: String,
    #[serde(default)]
    content: Vec<MessageContent>,
}

impl Message {
    /// Text of an assistant message; `None` for user messages or non-text content
    fn into_text(self) -> Option<String> {
        if self.role != "assistant" {
            return None;
        }

        let parts: Vec<String> = self
            .content
            .into_iter()
            .filter_map(|c| c.text.map(|t| t.value))
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n"))
        }
    }
}

#[derive(Deserialize, Debug)]
struct MessageContent {
    #[serde(default)]
    text: Option<MessageText>,
}

#[derive(Deserialize, Debug)]
struct MessageText {
    value: String,
}

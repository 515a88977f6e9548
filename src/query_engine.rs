use crate::config::SIMILARITY_TOP_K;
use crate::embeddings::Embedder;
use crate::index::{SourceNode, VectorIndex};
use crate::llm::Llm;
use anyhow::{Context, Result};
use log::{debug, info};
use serde_json::{json, Value};
use std::sync::Arc;

/// Returned when retrieval finds nothing to synthesize from
pub const EMPTY_RESPONSE: &str = "Empty Response";

pub const INDEX_TOOL_NAME: &str = "index";
pub const INDEX_TOOL_DESCRIPTION: &str = "Provides information about various documents";

/// Answer to one query together with the chunks it was built from
#[derive(Debug, Clone)]
pub struct QueryResponse {
    pub response: String,
    pub source_nodes: Vec<SourceNode>,
}

/// Retrieves the top-k chunks for a query and synthesizes an answer over them
#[derive(Clone)]
pub struct QueryEngine {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn Llm>,
    similarity_top_k: usize,
}

impl QueryEngine {
    pub fn new(index: Arc<VectorIndex>, embedder: Arc<dyn Embedder>, llm: Arc<dyn Llm>) -> Self {
        QueryEngine {
            index,
            embedder,
            llm,
            similarity_top_k: SIMILARITY_TOP_K,
        }
    }

    pub fn similarity_top_k(&self) -> usize {
        self.similarity_top_k
    }

    pub async fn retrieve(&self, query: &str) -> Result<Vec<SourceNode>> {
        let query_embedding = self
            .embedder
            .embed(query)
            .await
            .context("Failed to embed query")?;
        Ok(self.index.search(&query_embedding, self.similarity_top_k))
    }

    pub async fn query(&self, query: &str) -> Result<QueryResponse> {
        let source_nodes = self.retrieve(query).await?;
        debug!("Retrieved {} nodes for query", source_nodes.len());

        if source_nodes.is_empty() {
            return Ok(QueryResponse {
                response: EMPTY_RESPONSE.to_string(),
                source_nodes,
            });
        }

        let context = source_nodes
            .iter()
            .map(|node| node.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let response = self
            .llm
            .complete(&text_qa_prompt(&context, query))
            .await
            .context("Failed to synthesize response")?;

        Ok(QueryResponse {
            response,
            source_nodes,
        })
    }
}

fn text_qa_prompt(context: &str, query: &str) -> String {
    format!(
        "Context information is below.\n---------------------\n{}\n---------------------\nGiven the context information and not prior knowledge, answer the query.\nQuery: {}\nAnswer: ",
        context, query
    )
}

#[derive(Debug, Clone)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
}

/// Result of one tool invocation
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub tool_name: String,
    pub raw_input: String,
    /// Text handed back to the assistant
    pub content: String,
    /// Absent when the call did not reach a query engine
    pub raw_output: Option<QueryResponse>,
}

/// Exposes a query engine to the assistant as a function tool
#[derive(Clone)]
pub struct QueryEngineTool {
    pub engine: QueryEngine,
    pub metadata: ToolMetadata,
}

impl QueryEngineTool {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub async fn call(&self, input: &str) -> Result<ToolOutput> {
        info!("Tool {} called with: {}", self.metadata.name, input);
        let response = self.engine.query(input).await?;

        Ok(ToolOutput {
            tool_name: self.metadata.name.clone(),
            raw_input: input.to_string(),
            content: response.response.clone(),
            raw_output: Some(response),
        })
    }

    /// Function-tool definition sent when creating the assistant
    pub fn definition(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.metadata.name,
                "description": self.metadata.description,
                "parameters": {
                    "type": "object",
                    "properties": {
                        "input": {
                            "type": "string",
                            "description": "Natural-language query to run against the documents"
                        }
                    },
                    "required": ["input"]
                }
            }
        })
    }
}

/// Wrap `index` as the single `index` tool
pub fn create_engine(
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn Llm>,
) -> Vec<QueryEngineTool> {
    create_engine_with_description(index, embedder, llm, INDEX_TOOL_DESCRIPTION)
}

pub fn create_engine_with_description(
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn Llm>,
    description: &str,
) -> Vec<QueryEngineTool> {
    vec![QueryEngineTool {
        engine: QueryEngine::new(index, embedder, llm),
        metadata: ToolMetadata {
            name: INDEX_TOOL_NAME.to_string(),
            description: description.to_string(),
        },
    }]
}

use crate::agent::{AgentResponse, AssistantAgent};
use crate::builder::IndexBuilder;
use crate::config::{AgentSettings, StorageSettings};
use crate::query_engine::create_engine_with_description;
use crate::session::Services;
use anyhow::{Context, Result};
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

pub const ONE_SHOT_TOOL_DESCRIPTION: &str =
    "Provides information about various documents. Focus on given straightforward, accurate answers";

/// Index `paths` from scratch and ask a single question about them
pub async fn ask_documents(
    services: &Services,
    storage: &StorageSettings,
    agent_settings: &AgentSettings,
    paths: &[PathBuf],
    question: &str,
) -> Result<AgentResponse> {
    let builder = IndexBuilder::new(storage.index_dir(), services.embedder.clone());
    let index = builder
        .build_fresh(paths)
        .await
        .context("Failed to index documents")?;
    info!("Indexed {} documents into {} nodes", paths.len(), index.len());

    let tools = create_engine_with_description(
        Arc::new(index),
        services.embedder.clone(),
        services.llm.clone(),
        ONE_SHOT_TOOL_DESCRIPTION,
    );
    let agent = AssistantAgent::from_new(services.assistant.clone(), agent_settings, tools).await?;

    agent.chat(question).await
}

/// Answer followed by every source node's metadata and text
pub fn format_response(response: &AgentResponse) -> String {
    let mut out = String::new();
    out.push_str(&response.response);
    out.push('\n');
    for node in &response.source_nodes {
        out.push('\n');
        out.push_str(&crate::render::SourceSection::metadata_text(&node.metadata));
        out.push('\n');
        out.push_str(&node.text);
        out.push('\n');
    }
    out
}

pub mod agent;
pub mod builder;
pub mod chunking;
pub mod config;
pub mod document;
pub mod embeddings;
pub mod index;
pub mod llm;
pub mod oneshot;
pub mod openai;
pub mod query_engine;
pub mod render;
pub mod server;
pub mod session;
pub mod ui;
pub mod upload;

#[cfg(test)]
mod test_support;

use crate::agent::{AgentResponse, AssistantAgent, AssistantApi};
use crate::builder::{IndexBuilder, IndexOrigin};
use crate::config::{AgentSettings, StorageSettings};
use crate::embeddings::Embedder;
use crate::index::VectorIndex;
use crate::llm::Llm;
use crate::openai::OpenAiClient;
use crate::query_engine::create_engine;
use crate::upload::{save_uploaded_files, UploadedFile};
use anyhow::Result;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// The hosted services a session talks to
#[derive(Clone)]
pub struct Services {
    pub assistant: Arc<dyn AssistantApi>,
    pub embedder: Arc<dyn Embedder>,
    pub llm: Arc<dyn Llm>,
}

impl Services {
    /// All three roles served by one OpenAI client
    pub fn openai(client: OpenAiClient) -> Self {
        let client = Arc::new(client);
        Services {
            assistant: client.clone(),
            embedder: client.clone(),
            llm: client,
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("question is empty")]
    EmptyQuestion,
    #[error("no documents have been indexed yet")]
    NoIndex,
    #[error(transparent)]
    Agent(#[from] anyhow::Error),
}

/// Summary of one upload batch
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub paths: Vec<PathBuf>,
    pub origin: IndexOrigin,
    pub nodes: usize,
}

struct ActiveIndex {
    index: Arc<VectorIndex>,
    agent: AssistantAgent,
}

/// State of one UI user: at most one index and the assistant built over it
pub struct Session {
    services: Services,
    storage: StorageSettings,
    agent_settings: AgentSettings,
    builder: IndexBuilder,
    active: Option<ActiveIndex>,
}

impl Session {
    pub fn new(services: Services, storage: StorageSettings, agent_settings: AgentSettings) -> Self {
        let builder = IndexBuilder::new(storage.index_dir(), services.embedder.clone());
        Session {
            services,
            storage,
            agent_settings,
            builder,
            active: None,
        }
    }

    pub fn has_index(&self) -> bool {
        self.active.is_some()
    }

    /// Number of nodes in the active index
    pub fn active_nodes(&self) -> Option<usize> {
        self.active.as_ref().map(|a| a.index.len())
    }

    /// Save the uploads, index them and replace the active assistant.
    ///
    /// The previous index and assistant stay active if any step fails.
    pub async fn ingest(&mut self, files: &[UploadedFile]) -> Result<IngestReport> {
        let paths = save_uploaded_files(files, &self.storage.upload_dir)?;
        let built = self.builder.load_or_build(&paths).await?;
        let nodes = built.index.len();

        let active = self.activate(built.index).await?;
        self.active = Some(active);

        info!(
            "Indexed {} uploads ({:?}, {} nodes)",
            paths.len(),
            built.origin,
            nodes
        );
        Ok(IngestReport {
            paths,
            origin: built.origin,
            nodes,
        })
    }

    /// Ask the active assistant a question.
    ///
    /// Without an upload in this session, the persisted index from an earlier
    /// run is used when there is one.
    pub async fn ask(&mut self, question: &str) -> Result<AgentResponse, SessionError> {
        if question.trim().is_empty() {
            return Err(SessionError::EmptyQuestion);
        }

        if self.active.is_none() {
            let index = self.builder.load_persisted().ok_or(SessionError::NoIndex)?;
            let active = self.activate(index).await?;
            self.active = Some(active);
        }

        let active = self.active.as_ref().ok_or(SessionError::NoIndex)?;
        Ok(active.agent.chat(question).await?)
    }

    async fn activate(&self, index: VectorIndex) -> Result<ActiveIndex> {
        let index = Arc::new(index);
        let tools = create_engine(
            index.clone(),
            self.services.embedder.clone(),
            self.services.llm.clone(),
        );
        let agent =
            AssistantAgent::from_new(self.services.assistant.clone(), &self.agent_settings, tools)
                .await?;
        Ok(ActiveIndex { index, agent })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ContextEchoLlm, HashEmbedder, Script, ScriptedAssistant};
    use std::path::Path;
    use std::time::Duration;

    fn session(dir: &Path, api: Arc<ScriptedAssistant>) -> Session {
        let services = Services {
            assistant: api,
            embedder: Arc::new(HashEmbedder::default()),
            llm: Arc::new(ContextEchoLlm::default()),
        };
        let storage = StorageSettings {
            upload_dir: dir.to_path_buf(),
            storage_dir: dir.join("storage"),
        };
        let agent_settings = AgentSettings {
            poll_interval: Duration::from_millis(1),
            ..AgentSettings::document_answer("gpt-test")
        };
        Session::new(services, storage, agent_settings)
    }

    fn upload(name: &str, text: &str) -> UploadedFile {
        UploadedFile::new(name, text.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_ingest_then_ask() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(ScriptedAssistant::new(Script::CallTool("index")));
        let mut session = session(dir.path(), api.clone());

        let report = session
            .ingest(&[upload("report.txt", "Revenue was $10M")])
            .await
            .unwrap();
        assert_eq!(report.paths, vec![dir.path().join("report.txt")]);
        assert_eq!(report.origin, IndexOrigin::Rebuilt);
        assert_eq!(session.active_nodes(), Some(1));

        let response = session.ask("What was the revenue?").await.unwrap();
        assert!(response.source_nodes[0].text.contains("Revenue was $10M"));
        assert_eq!(api.assistants().len(), 1);
    }

    #[tokio::test]
    async fn test_each_upload_replaces_the_assistant() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(ScriptedAssistant::new(Script::CallTool("index")));
        let mut session = session(dir.path(), api.clone());

        session.ingest(&[upload("a.txt", "alpha")]).await.unwrap();
        session
            .ingest(&[upload("b.txt", "beta"), upload("c.txt", "gamma")])
            .await
            .unwrap();

        assert_eq!(api.assistants().len(), 2);
        assert_eq!(session.active_nodes(), Some(2));
    }

    #[tokio::test]
    async fn test_failed_ingest_keeps_previous_index() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(ScriptedAssistant::new(Script::CallTool("index")));
        let mut session = session(dir.path(), api.clone());

        session.ingest(&[upload("a.txt", "alpha")]).await.unwrap();
        assert!(session
            .ingest(&[UploadedFile::new("broken.png", vec![0u8, 1, 2])])
            .await
            .is_err());

        assert_eq!(session.active_nodes(), Some(1));
        assert_eq!(api.assistants().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_question_is_not_sent() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(ScriptedAssistant::new(Script::CallTool("index")));
        let mut session = session(dir.path(), api.clone());

        assert!(matches!(
            session.ask("   ").await,
            Err(SessionError::EmptyQuestion)
        ));
        assert!(api.questions().is_empty());
    }

    #[tokio::test]
    async fn test_ask_without_any_index() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(ScriptedAssistant::new(Script::CallTool("index")));
        let mut session = session(dir.path(), api.clone());

        assert!(matches!(
            session.ask("What was the revenue?").await,
            Err(SessionError::NoIndex)
        ));
        assert!(api.assistants().is_empty());
    }

    #[tokio::test]
    async fn test_ask_resumes_persisted_index() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(ScriptedAssistant::new(Script::CallTool("index")));

        let mut earlier = session(dir.path(), api.clone());
        earlier
            .ingest(&[upload("report.txt", "Revenue was $10M")])
            .await
            .unwrap();
        drop(earlier);

        let mut later = session(dir.path(), api.clone());
        assert!(!later.has_index());
        let response = later.ask("What was the revenue?").await.unwrap();

        assert!(later.has_index());
        assert_eq!(response.source_nodes[0].text, "Revenue was $10M");
    }

    #[tokio::test]
    async fn test_agent_failure_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(ScriptedAssistant::new(Script::Fail));
        let mut session = session(dir.path(), api);

        session.ingest(&[upload("a.txt", "alpha")]).await.unwrap();
        assert!(matches!(
            session.ask("What?").await,
            Err(SessionError::Agent(_))
        ));
    }
}

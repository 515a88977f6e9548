use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{debug, error, info};
use std::net::SocketAddr;
use std::path::PathBuf;

use doc_chat::config::{load_credentials, AgentSettings, OpenAiConfig, StorageSettings};
use doc_chat::oneshot::{ask_documents, format_response};
use doc_chat::openai::OpenAiClient;
use doc_chat::server::{router, serve, AppState};
use doc_chat::session::{Services, Session};

/// Chat with uploaded PDF documents through a hosted assistant
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// OpenAI API key; exported as OPENAI_API_KEY
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Root directory for the persisted index
    #[arg(long, global = true, default_value = "./storage")]
    storage_dir: PathBuf,

    /// Directory uploaded files are written to
    #[arg(long, global = true, default_value = ".")]
    upload_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the web interface
    Serve {
        #[arg(long, default_value = "127.0.0.1:8501")]
        bind: SocketAddr,

        /// Maximum size of one upload request
        #[arg(long, default_value_t = 200)]
        max_upload_mb: usize,
    },
    /// Index the given documents and ask one question
    Ask {
        /// Document to index (repeatable)
        #[arg(long = "file", required = true)]
        files: Vec<PathBuf>,

        question: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Credentials first: nothing below may build a client before the key is exported
    let dotenv_loaded = load_credentials(args.api_key.as_deref());
    env_logger::init();
    if dotenv_loaded {
        debug!("Loaded environment from .env");
    }
    if args.api_key.is_some() {
        info!("Using API key supplied on the command line");
    }

    // One OpenAI client serves the assistant, embedding and completion roles
    let openai_config = OpenAiConfig::from_env().context("Missing OPENAI_API_KEY")?;
    let assistant_model = openai_config.assistant_model.clone();
    let services = Services::openai(OpenAiClient::new(openai_config));
    let storage = StorageSettings {
        upload_dir: args.upload_dir,
        storage_dir: args.storage_dir,
    };

    match args.command {
        Command::Serve {
            bind,
            max_upload_mb,
        } => {
            // Each server process holds a single session
            let session = Session::new(
                services,
                storage,
                AgentSettings::document_answer(assistant_model),
            );
            let app = router(AppState::new(session), max_upload_mb * 1024 * 1024);
            serve(bind, app).await
        }
        Command::Ask { files, question } => {
            // Check the files exist before creating anything remotely
            for file in &files {
                if !file.exists() {
                    error!("File not found: {}", file.display());
                    return Err(anyhow::anyhow!("File not found: {}", file.display()));
                }
            }

            info!("Asking about {} documents", files.len());
            let response = ask_documents(
                &services,
                &storage,
                &AgentSettings::one_shot(assistant_model),
                &files,
                &question,
            )
            .await?;

            // Answer first, then every source node
            print!("{}", format_response(&response));
            Ok(())
        }
    }
}

use crate::render::RenderedResponse;
use crate::session::{Session, SessionError};
use crate::ui::{render_page, PageView, StatusLine, NO_INDEX_NOTICE, UPLOAD_SUCCESS};
use crate::upload::UploadedFile;
use anyhow::{Context, Result};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use log::{error, info};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;

struct UiState {
    session: Session,
    upload_status: Option<StatusLine>,
}

/// Shared state of the web UI. One action runs at a time.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Mutex<UiState>>,
}

impl AppState {
    pub fn new(session: Session) -> Self {
        AppState {
            inner: Arc::new(Mutex::new(UiState {
                session,
                upload_status: None,
            })),
        }
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index_page))
        .route(
            "/upload",
            post(upload_documents).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/query", post(submit_query))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, router: Router) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Serving document chat on http://{}", addr);

    axum::serve(listener, router).await.context("Server error")?;
    Ok(())
}

fn page(status: StatusCode, view: &PageView) -> Response {
    (status, Html(render_page(view))).into_response()
}

async fn index_page(State(state): State<AppState>) -> Response {
    let ui = state.inner.lock().await;
    page(
        StatusCode::OK,
        &PageView {
            status: ui.upload_status.clone(),
            ..PageView::default()
        },
    )
}

async fn read_uploads(multipart: &mut Multipart) -> Result<Vec<UploadedFile>> {
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .context("Failed to read multipart field")?
    {
        // Browsers send an empty part when no file was chosen
        let Some(name) = field.file_name().filter(|n| !n.is_empty()).map(str::to_string) else {
            continue;
        };
        let bytes = field
            .bytes()
            .await
            .with_context(|| format!("Failed to read upload {}", name))?;
        files.push(UploadedFile::new(name, bytes.to_vec()));
    }

    Ok(files)
}

async fn upload_documents(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let files = read_uploads(&mut multipart).await;

    let mut guard = state.inner.lock().await;
    let ui = &mut *guard;

    let result = match files {
        Ok(files) if files.is_empty() => None,
        Ok(files) => Some(ui.session.ingest(&files).await.map(|_| ())),
        Err(e) => Some(Err(e)),
    };

    match result {
        None => {}
        Some(Ok(())) => ui.upload_status = Some(StatusLine::Success(UPLOAD_SUCCESS.to_string())),
        Some(Err(e)) => {
            error!("Upload failed: {:#}", e);
            ui.upload_status = Some(StatusLine::Failure(format!(
                "Failed to index documents: {:#}",
                e
            )));
            return page(
                StatusCode::INTERNAL_SERVER_ERROR,
                &PageView {
                    status: ui.upload_status.clone(),
                    ..PageView::default()
                },
            );
        }
    }

    page(
        StatusCode::OK,
        &PageView {
            status: ui.upload_status.clone(),
            ..PageView::default()
        },
    )
}

#[derive(Debug, Deserialize)]
pub struct QueryForm {
    #[serde(default)]
    pub question: String,
}

async fn submit_query(State(state): State<AppState>, Form(form): Form<QueryForm>) -> Response {
    let mut guard = state.inner.lock().await;
    let ui = &mut *guard;

    let mut view = PageView {
        status: ui.upload_status.clone(),
        question: form.question.clone(),
        ..PageView::default()
    };

    match ui.session.ask(&form.question).await {
        Ok(response) => view.rendered = Some(RenderedResponse::from_response(&response)),
        Err(SessionError::EmptyQuestion) => {}
        Err(SessionError::NoIndex) => view.notice = Some(NO_INDEX_NOTICE.to_string()),
        Err(SessionError::Agent(e)) => {
            error!("Query failed: {:#}", e);
            view.error = Some(format!("{:#}", e));
            return page(StatusCode::INTERNAL_SERVER_ERROR, &view);
        }
    }

    page(StatusCode::OK, &view)
}

//! HTTP chat server.
//!
//! Serves the embedded chat page and a small JSON API:
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Chat page |
//! | `POST` | `/ask` | Answer a question (`{"question": "..."}`) |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! Questions are answered one at a time: the session (and the mutable
//! vector index inside it) sits behind a `tokio::sync::Mutex`, so two
//! refresh flows can never interleave. Errors come back as
//! `{ "error": { "message": "..." } }`, never a stack trace.
//!
//! All origins are permitted to support browser-based clients.

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

use crate::chat::ChatSession;
use crate::config::Config;
use crate::models::DocMetadata;
use crate::qa::Outcome;

/// Shared application state passed to route handlers.
#[derive(Clone)]
struct AppState {
    session: Arc<Mutex<ChatSession>>,
}

/// Start the chat server on the configured bind address.
///
/// Providers and the index are constructed up front, so a missing
/// credential or index fails here instead of on the first request.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let session = ChatSession::open(config)?;
    let state = AppState {
        session: Arc::new(Mutex::new(session)),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(chat_page))
        .route("/ask", post(ask))
        .route("/health", get(health))
        .layer(cors)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    println!("docbot listening on http://{}", config.server.bind);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn chat_page() -> Html<&'static str> {
    Html(CHAT_PAGE)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Deserialize)]
struct AskRequest {
    question: String,
}

#[derive(Serialize)]
struct AskResponse {
    answer: String,
    outcome: &'static str,
    sources: Vec<SourceView>,
}

#[derive(Serialize)]
struct SourceView {
    source: String,
    source_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    page: Option<usize>,
}

impl From<&DocMetadata> for SourceView {
    fn from(meta: &DocMetadata) -> Self {
        Self {
            source: meta.source.clone(),
            source_type: meta.source_type.clone(),
            url: meta.url.clone(),
            page: meta.page,
        }
    }
}

fn outcome_label(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Answered => "answered",
        Outcome::TopicNotFound => "topic_not_found",
        Outcome::RefreshFailed => "refresh_failed",
        Outcome::StillInsufficient => "still_insufficient",
    }
}

async fn ask(State(state): State<AppState>, Json(req): Json<AskRequest>) -> Response {
    let question = req.question.trim().to_string();
    if question.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "question must not be empty");
    }

    // One question at a time: the index must not be mutated by two
    // refresh flows simultaneously.
    let mut session = state.session.lock().await;

    match session.answer(&question).await {
        Ok(answer) => Json(AskResponse {
            answer: answer.text,
            outcome: outcome_label(answer.outcome),
            sources: answer.sources.iter().map(SourceView::from).collect(),
        })
        .into_response(),
        Err(e) => {
            eprintln!("error answering question: {:#}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to answer the question",
            )
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    let body = serde_json::json!({ "error": { "message": message } });
    (status, Json(body)).into_response()
}

/// Single-file chat UI. Rendering and session history live entirely in the
/// browser; the server only answers `POST /ask`.
const CHAT_PAGE: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>DocBot - Medical Assistant</title>
<style>
  body { font-family: Arial, sans-serif; max-width: 720px; margin: 0 auto; padding: 16px; }
  h1 { text-align: center; color: #4CAF50; }
  .hint { color: #666; text-align: center; }
  #log { margin: 16px 0; }
  .user { text-align: right; background: #a8df8e; color: #000;
          padding: 10px; border-radius: 12px; margin: 8px 0; }
  .bot { background: #f5f5f5; border-left: 4px solid #4CAF50;
         padding: 10px; border-radius: 12px; margin: 8px 0; white-space: pre-wrap; }
  .sources { font-size: 13px; color: #555; margin-top: 6px; }
  form { display: flex; gap: 8px; }
  input { flex: 1; padding: 12px; border: 2px solid #4CAF50; border-radius: 15px; }
  button { background: #4CAF50; color: #fff; border: 0; border-radius: 10px;
           padding: 10px 20px; font-size: 16px; }
  button:disabled { opacity: 0.6; }
</style>
</head>
<body>
<h1>DocBot</h1>
<p class="hint">Ask a medical question, for example: What are the early signs of diabetes?</p>
<div id="log"></div>
<form id="form">
  <input id="question" placeholder="Type your medical question..." autocomplete="off">
  <button id="send" type="submit">Get Answer</button>
</form>
<script>
const log = document.getElementById('log');
const form = document.getElementById('form');
const input = document.getElementById('question');
const send = document.getElementById('send');

function append(cls, text, sources) {
  const div = document.createElement('div');
  div.className = cls;
  div.textContent = text;
  if (sources && sources.length) {
    const src = document.createElement('div');
    src.className = 'sources';
    src.textContent = 'Sources: ' + sources.map(s =>
      s.page ? s.source + ', page ' + s.page : s.source).join('; ');
    div.appendChild(src);
  }
  log.appendChild(div);
  div.scrollIntoView();
}

form.addEventListener('submit', async (ev) => {
  ev.preventDefault();
  const question = input.value.trim();
  if (!question) return;
  append('user', question);
  input.value = '';
  send.disabled = true;
  try {
    const resp = await fetch('/ask', {
      method: 'POST',
      headers: { 'Content-Type': 'application/json' },
      body: JSON.stringify({ question }),
    });
    const data = await resp.json();
    if (data.error) {
      append('bot', data.error.message);
    } else {
      append('bot', data.answer, data.sources);
    }
  } catch (e) {
    append('bot', 'Request failed: ' + e);
  } finally {
    send.disabled = false;
    input.focus();
  }
});
</script>
</body>
</html>
"#;

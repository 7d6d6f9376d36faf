//! Demo web server exposing broker sessions to xterm.js viewers.
//!
//! Run with: cargo run -p web-server-demo
//!
//! Then open http://localhost:3000/?token=demo in your browser.
//!
//! Configuration (environment):
//! - `BROKER_ADDR`  - listen address (default `127.0.0.1:3000`)
//! - `BROKER_TOKEN` - shared bearer token (default `demo`)
//! - `BROKER_CMD`   - command run per session (default `$SHELL`, then `sh`)
//! - `BROKER_ROOT`  - root directory owners resolve under (default cwd)

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context as _;
use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::Html,
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use term_broker_core::{
    AuthError, CredentialVerifier, DirectoryResolver, Identity, SessionId,
};
use term_broker_pty::PtySpawner;
use term_broker_session::{SessionInfo, SessionRegistry};
use term_broker_transport::websocket::{self, WsState};
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Single shared-secret credential, standing in for a real token issuer.
struct SharedSecret {
    token: String,
}

#[async_trait]
impl CredentialVerifier for SharedSecret {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        if token == self.token {
            Ok(Identity {
                username: "admin".to_string(),
            })
        } else {
            Err(AuthError::InvalidToken)
        }
    }
}

/// Maps an owner key to a subdirectory of the configured root, falling back
/// to the root itself.
struct RootResolver {
    root: PathBuf,
}

#[async_trait]
impl DirectoryResolver for RootResolver {
    async fn resolve(&self, owner: &str) -> Option<PathBuf> {
        let candidate = self.root.join(owner);
        if candidate.is_dir() {
            Some(candidate)
        } else if self.root.is_dir() {
            Some(self.root.clone())
        } else {
            None
        }
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    registry: Arc<SessionRegistry>,
    verifier: Arc<dyn CredentialVerifier>,
    resolver: Arc<dyn DirectoryResolver>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let addr: SocketAddr = std::env::var("BROKER_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
        .parse()
        .context("invalid BROKER_ADDR")?;
    let token = std::env::var("BROKER_TOKEN").unwrap_or_else(|_| "demo".to_string());
    let command = std::env::var("BROKER_CMD")
        .or_else(|_| std::env::var("SHELL"))
        .unwrap_or_else(|_| "sh".to_string());
    let root = std::env::var("BROKER_ROOT").map_or_else(
        |_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        PathBuf::from,
    );

    let registry = Arc::new(SessionRegistry::new(Arc::new(PtySpawner::new(&command))));
    let verifier: Arc<dyn CredentialVerifier> = Arc::new(SharedSecret { token: token.clone() });
    let resolver: Arc<dyn DirectoryResolver> = Arc::new(RootResolver { root });

    let state = AppState {
        registry: Arc::clone(&registry),
        verifier: Arc::clone(&verifier),
        resolver,
    };
    let ws_state = WsState {
        registry: Arc::clone(&registry),
        verifier,
    };

    let app = Router::new()
        .route("/", get(index_handler))
        .route("/sessions", post(create_session).get(list_sessions))
        .route("/sessions/{id}", delete(destroy_session))
        .with_state(state)
        .merge(websocket::router(ws_state))
        .layer(CorsLayer::permissive());

    tracing::info!(%addr, %command, "broker listening (token: {token})");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Tear down every remaining session so no child process is orphaned.
    registry.shutdown_all().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown requested");
}

type ApiError = (StatusCode, String);

async fn authorize(headers: &HeaderMap, state: &AppState) -> Result<Identity, ApiError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    let Some(token) = token else {
        return Err((StatusCode::UNAUTHORIZED, "not authenticated".to_string()));
    };
    state
        .verifier
        .verify(token)
        .await
        .map_err(|err| (StatusCode::UNAUTHORIZED, err.to_string()))
}

#[derive(Deserialize)]
struct CreateSession {
    owner: String,
}

#[derive(Serialize)]
struct SessionCreated {
    session_id: SessionId,
    owner: String,
}

async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateSession>,
) -> Result<Json<SessionCreated>, ApiError> {
    authorize(&headers, &state).await?;
    let Some(directory) = state.resolver.resolve(&req.owner).await else {
        return Err((
            StatusCode::NOT_FOUND,
            format!("no directory for owner {}", req.owner),
        ));
    };
    let session_id = state
        .registry
        .create_or_reuse(&req.owner, directory)
        .await
        .map_err(|err| (StatusCode::BAD_REQUEST, err.to_string()))?;
    Ok(Json(SessionCreated {
        session_id,
        owner: req.owner,
    }))
}

async fn list_sessions(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<SessionInfo>>, ApiError> {
    authorize(&headers, &state).await?;
    Ok(Json(state.registry.list().await))
}

async fn destroy_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    authorize(&headers, &state).await?;
    state.registry.destroy(id).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Terminal Broker</title>
    <link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/xterm@5.3.0/css/xterm.css" />
    <script src="https://cdn.jsdelivr.net/npm/xterm@5.3.0/lib/xterm.js"></script>
    <script src="https://cdn.jsdelivr.net/npm/xterm-addon-fit@0.8.0/lib/xterm-addon-fit.js"></script>
    <style>
        body { margin: 0; padding: 20px; background: #1e1e1e; font-family: system-ui, sans-serif; }
        h1 { color: #fff; margin-bottom: 10px; }
        #terminal-container { width: 100%; height: calc(100vh - 100px); }
        .status { color: #888; font-size: 14px; margin-bottom: 10px; }
        .connected { color: #4a4; }
        .disconnected { color: #a44; }
    </style>
</head>
<body>
    <h1>Terminal Broker</h1>
    <div class="status" id="status">Connecting...</div>
    <div id="terminal-container"></div>

    <script>
        const params = new URLSearchParams(location.search);
        const token = params.get('token') || 'demo';
        const owner = params.get('owner') || 'demo';

        const term = new Terminal({ cursorBlink: true, fontSize: 14 });
        const fitAddon = new FitAddon.FitAddon();
        term.loadAddon(fitAddon);
        term.open(document.getElementById('terminal-container'));
        fitAddon.fit();

        const statusEl = document.getElementById('status');
        const setStatus = (text, cls) => {
            statusEl.textContent = text;
            statusEl.className = 'status ' + cls;
        };

        fetch('/sessions', {
            method: 'POST',
            headers: {
                'Authorization': 'Bearer ' + token,
                'Content-Type': 'application/json',
            },
            body: JSON.stringify({ owner }),
        })
            .then(r => {
                if (!r.ok) throw new Error('session create failed: ' + r.status);
                return r.json();
            })
            .then(({ session_id }) => {
                const proto = location.protocol === 'https:' ? 'wss' : 'ws';
                const ws = new WebSocket(`${proto}://${location.host}/ws/${session_id}?token=${token}`);
                ws.binaryType = 'arraybuffer';

                const sendResize = () => {
                    fitAddon.fit();
                    ws.send('\x01RESIZE:' + term.cols + ',' + term.rows);
                };

                ws.onopen = () => {
                    setStatus('Connected (session ' + session_id + ')', 'connected');
                    sendResize();
                };
                ws.onmessage = e => term.write(new Uint8Array(e.data));
                ws.onclose = e => setStatus('Disconnected: ' + (e.reason || e.code), 'disconnected');
                term.onData(data => ws.send(data));
                window.addEventListener('resize', sendResize);
            })
            .catch(err => setStatus(String(err), 'disconnected'));
    </script>
</body>
</html>
"#;

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;

use crate::dispatch::AppState;
use crate::error::ProxyError;
use crate::executor::child::{ChildProcess, LaunchSpec};
use crate::executor::child::{DEFAULT_INTERACT_TIMEOUT, START_TIMEOUT_GENERIC};
use crate::executor::kind;

/// The control plane serves one orchestrator invoker at a time in practice;
/// this just bounds the worst case of a misbehaving caller piling up
/// concurrent `/run`s against a single-slot executor.
const MAX_CONCURRENT_REQUESTS: usize = 64;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/init", post(init_handler))
        .route("/load", post(load_handler))
        .route("/run", post(run_handler))
        .route("/offload", post(offload_handler))
        .route("/clean", post(clean_handler))
        .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_REQUESTS))
        .with_state(state)
}

/// Pulls `action_name` out of the request body without discarding the rest
/// of it — the body is forwarded to the child verbatim (spec §4.E).
fn parse_action_name(body: &[u8]) -> Result<String, ProxyError> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|_| ProxyError::BadRequest("Error reading request body".to_string()))?;
    Ok(value
        .get("action_name")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string())
}

/// The child protocol is line-delimited; embedded newlines in the forwarded
/// body would desynchronize it, so they're stripped before writing (spec
/// §4.A).
fn strip_newlines(body: &[u8]) -> Vec<u8> {
    body.iter().copied().filter(|&b| b != b'\n').collect()
}

fn json_response(raw: &[u8]) -> Result<Response, ProxyError> {
    let normalized = String::from_utf8_lossy(raw).replace('\'', "\"");
    let value: serde_json::Value =
        serde_json::from_str(&normalized).map_err(|_| ProxyError::ReplyNotObject)?;
    if !value.is_object() {
        return Err(ProxyError::ReplyNotObject);
    }
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        normalized,
    )
        .into_response())
}

/// `/init` (spec §4.E): overlays the request body onto `ActionEnvironment`,
/// then installs the generic executor for the highest uploaded action
/// directory, if any.
async fn init_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ProxyError> {
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    let overlay: HashMap<String, String> = value
        .as_object()
        .map(|map| {
            map.iter()
                .map(|(k, v)| {
                    let s = match v {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), s)
                })
                .collect()
        })
        .unwrap_or_default();
    state.registry.set_env(overlay).await;

    match state.loader.highest_dir() {
        None => {
            state.registry.clear_generic().await;
            state.initialized.store(true, Ordering::SeqCst);
        }
        Some(dir) => {
            if let Some(expected) = &state.config.execution_env {
                state.loader.check_execution_env(dir, expected)?;
            }

            let executable = state.loader.executable_path(dir);
            let env = state.registry.env_snapshot().await;
            let spec = LaunchSpec {
                command: executable.to_string_lossy().into_owned(),
                args: Vec::new(),
                env,
                process_group: true,
                start_timeout: START_TIMEOUT_GENERIC,
                interact_timeout: DEFAULT_INTERACT_TIMEOUT,
            };
            let mut child = ChildProcess::launch(spec, state.registry.log_sinks());
            match child.start(state.config.wait_for_ack).await {
                Ok(()) => {
                    state.registry.set_generic(child).await;
                    state.initialized.store(true, Ordering::SeqCst);
                }
                Err(err) => {
                    state.loader.remove_action(dir)?;
                    return Err(err);
                }
            }
        }
    }

    Ok(StatusCode::OK)
}

/// `/load` (spec §4.B, §4.E).
async fn load_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ProxyError> {
    let action_name = parse_action_name(&body)?;

    if state.registry.has_any_cold_running().await {
        // A cold run in flight for any kind blocks /load system-wide (I2);
        // the endpoint is a no-op rather than an error.
        return Ok(StatusCode::OK);
    }

    let kind = kind::resolve(&action_name).ok_or_else(|| ProxyError::UnknownKind(action_name))?;
    state.registry.load(kind).await?;
    Ok(StatusCode::OK)
}

/// `/run` (spec §4.E): warm, then cold, then the generic fallback.
async fn run_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, ProxyError> {
    let action_name = parse_action_name(&body)?;
    let forwarded = strip_newlines(&body);

    let raw = match kind::resolve(&action_name) {
        Some(kind) => match state.registry.run_warm(kind, &forwarded).await {
            Some(result) => result?,
            None => state.registry.run_cold(kind).await?,
        },
        None => state.registry.run_generic(&forwarded).await?,
    };

    json_response(&raw)
}

/// `/offload` (spec §4.E).
async fn offload_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ProxyError> {
    let action_name = parse_action_name(&body)?;
    let kind = kind::resolve(&action_name).ok_or_else(|| ProxyError::UnknownKind(action_name))?;
    state.registry.offload(kind).await?;
    Ok(StatusCode::OK)
}

/// `/clean` (spec §4.E): removes uploaded actions and resets the generic
/// executor and `ActionEnvironment`. Per-kind warm/cold slots are untouched.
async fn clean_handler(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ProxyError> {
    state.loader.remove_all_actions()?;
    state.loader.reset_current_dir();
    state.registry.clear_env().await;
    state.registry.clear_generic().await;
    state.initialized.store(false, Ordering::SeqCst);
    Ok(StatusCode::OK)
}

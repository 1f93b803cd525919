//! Serverless execution: per-app JavaScript handlers for `/api` routes.
//!
//! Request lifecycle: PARSED → DISPATCHED → HANDLER_RUNNING → RESPONDED |
//! TIMED_OUT | FAILED. Handler logs are buffered during execution and
//! flushed once the request is terminal.

pub mod egress;
pub mod host_api;

use axum::{
	body::Body,
	http::{header, HeaderMap, Method, StatusCode, Uri},
	response::{IntoResponse, Response},
};
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use crate::prelude::*;
use crate::vfs::serve::not_found_response;
use fazt_types::auth_adapter::AuthCtx;
use fazt_types::meta_adapter::{AppRecord, ANON_USER};

use self::host_api::{ScriptError, ScriptOutcome};

/// The per-app handler entry point inside the site's VFS
pub const HANDLER_PATH: &str = "api/main.js";

/// Wall-clock budget for one handler invocation
const HANDLER_BUDGET: Duration = Duration::from_secs(10);

const SCRIPT_CACHE_ENTRIES: usize = 128;

/// Handler sources keyed by content hash. Only scripts that compiled
/// successfully are inserted, so a broken deploy never pins a bad entry.
#[derive(Debug)]
pub struct ScriptCache {
	inner: Mutex<LruCache<Box<str>, Arc<str>>>,
}

impl Default for ScriptCache {
	fn default() -> Self {
		ScriptCache {
			inner: Mutex::new(LruCache::new(
				NonZeroUsize::new(SCRIPT_CACHE_ENTRIES).unwrap_or(NonZeroUsize::MIN),
			)),
		}
	}
}

impl ScriptCache {
	pub fn get(&self, content_hash: &str) -> Option<Arc<str>> {
		self.inner.lock().get(content_hash).cloned()
	}

	pub fn put(&self, content_hash: &str, source: Arc<str>) {
		self.inner.lock().put(content_hash.into(), source);
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HandlerState {
	Parsed,
	Dispatched,
	HandlerRunning,
	Responded,
	TimedOut,
	Failed,
}

pub struct DispatchRequest<'a> {
	pub site_id: &'a str,
	pub app: Option<&'a AppRecord>,
	pub method: &'a Method,
	pub uri: &'a Uri,
	pub headers: &'a HeaderMap,
	pub body: Vec<u8>,
	pub auth: Option<AuthCtx>,
	pub request_id: &'a str,
}

/// Execute the site's handler for an `/api` request. No handler → 404.
pub async fn dispatch(app_state: &App, req: DispatchRequest<'_>) -> Response {
	let mut state = HandlerState::Parsed;
	debug!("[site:{}] handler state: {:?}", req.site_id, state);

	let script = match app_state.meta_adapter.read_file(req.site_id, HANDLER_PATH).await {
		Ok(file) => file,
		Err(_) => return not_found_response(app_state).await,
	};

	// The app id scoping every side effect comes from dispatch, never from
	// the handler.
	let app_id: Box<str> = match req.app {
		Some(app) => app.app_id.clone(),
		None => req.site_id.into(),
	};

	let source = match app_state.script_cache.get(&script.meta.content_hash) {
		Some(source) => source,
		None => match String::from_utf8(Vec::from(script.content)) {
			Ok(source) => Arc::<str>::from(source),
			Err(_) => {
				warn!("[{}] handler is not valid UTF-8", app_id);
				return internal_error();
			}
		},
	};

	let request_json = build_request_json(&req);
	let user_id: Box<str> = match &req.auth {
		Some(auth) => auth.user_id.clone(),
		None => ANON_USER.into(),
	};

	state = HandlerState::Dispatched;
	debug!("[{}] handler state: {:?}", app_id, state);

	// Per-app concurrency ceiling
	let semaphore = app_state.app_slots.for_app(&app_id);
	let Ok(_permit) = semaphore.acquire().await else {
		return internal_error();
	};

	state = HandlerState::HandlerRunning;
	debug!("[{}] handler state: {:?}", app_id, state);

	let handle = tokio::runtime::Handle::current();
	let worker_app = app_state.clone();
	let worker_source = source.clone();
	let worker_app_id = app_id.clone();
	let worker_user = req.auth.clone();

	let outcome = tokio::time::timeout(
		HANDLER_BUDGET,
		app_state.worker.run(move || {
			host_api::run_script(
				&worker_source,
				&request_json,
				host_api::HostEnv {
					handle,
					app: worker_app,
					app_id: worker_app_id,
					user_id,
					user: worker_user,
				},
			)
		}),
	)
	.await;

	let outcome = match outcome {
		Err(_) => {
			state = HandlerState::TimedOut;
			warn!("[{}] handler state: {:?}", app_id, state);
			return Error::Timeout.into_response();
		}
		Ok(Err(err)) => {
			state = HandlerState::Failed;
			warn!("[{}] handler state: {:?}: {}", app_id, state, err);
			return internal_error();
		}
		Ok(Ok(outcome)) => outcome,
	};

	flush_logs(&app_id, &outcome);

	match outcome.result {
		Ok(value) => {
			// A successful run means the script compiled; cache its source
			app_state
				.script_cache
				.put(&script.meta.content_hash, source);
			state = HandlerState::Responded;
			debug!("[{}] handler state: {:?}", app_id, state);
			json_to_response(value)
		}
		Err(ScriptError::Unauthorized) => {
			state = HandlerState::Responded;
			debug!("[{}] handler state: {:?}", app_id, state);
			Error::Unauthorized.into_response()
		}
		Err(ScriptError::Compile(message)) => {
			state = HandlerState::Failed;
			warn!("[{}] handler state: {:?}: compile error: {}", app_id, state, message);
			internal_error()
		}
		Err(ScriptError::NoHandler) => {
			state = HandlerState::Failed;
			warn!("[{}] handler state: {:?}: script defines no handler()", app_id, state);
			internal_error()
		}
		Err(ScriptError::Runtime(message)) => {
			// The script itself is fine; only this invocation threw
			app_state
				.script_cache
				.put(&script.meta.content_hash, source);
			state = HandlerState::Failed;
			warn!("[{}] handler state: {:?}: {}", app_id, state, message);
			internal_error()
		}
	}
}

fn flush_logs(app_id: &str, outcome: &ScriptOutcome) {
	for line in &outcome.logs {
		info!("[app:{}] {}", app_id, line);
	}
}

/// Generic 500; the exception detail stays in the per-app log buffer
fn internal_error() -> Response {
	Error::Internal("handler failed".into()).into_response()
}

fn build_request_json(req: &DispatchRequest<'_>) -> serde_json::Value {
	let mut query = HashMap::new();
	if let Some(raw_query) = req.uri.query() {
		for pair in raw_query.split('&') {
			if let Some((key, value)) = pair.split_once('=') {
				query.insert(key.to_string(), value.to_string());
			} else if !pair.is_empty() {
				query.insert(pair.to_string(), String::new());
			}
		}
	}

	let mut headers = HashMap::new();
	for (name, value) in req.headers {
		if let Ok(value) = value.to_str() {
			headers.insert(name.as_str().to_string(), value.to_string());
		}
	}

	let user = match &req.auth {
		Some(auth) => serde_json::json!({
			"id": auth.user_id,
			"email": auth.email,
			"name": auth.name,
			"role": auth.role,
		}),
		None => serde_json::Value::Null,
	};

	serde_json::json!({
		"method": req.method.as_str(),
		"url": req.uri.to_string(),
		"path": req.uri.path(),
		"query": query,
		"headers": headers,
		"body": String::from_utf8_lossy(&req.body),
		"user": user,
		"requestId": req.request_id,
	})
}

/// Interpret a handler's return value as an HTTP response.
///
/// A string becomes text/plain, an object may carry `{status, headers,
/// body | json}`, anything else is serialized as application/json.
fn json_to_response(value: serde_json::Value) -> Response {
	use serde_json::Value;

	match value {
		Value::String(text) => Response::builder()
			.status(StatusCode::OK)
			.header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
			.body(Body::from(text))
			.unwrap_or_else(|_| plain_500()),
		Value::Object(ref map)
			if map.contains_key("status") || map.contains_key("body") || map.contains_key("json") =>
		{
			let status = map
				.get("status")
				.and_then(Value::as_u64)
				.and_then(|code| u16::try_from(code).ok())
				.and_then(|code| StatusCode::from_u16(code).ok())
				.unwrap_or(StatusCode::OK);

			let mut builder = Response::builder().status(status);
			if let Some(Value::Object(headers)) = map.get("headers") {
				for (name, value) in headers {
					if let Some(value) = value.as_str() {
						builder = builder.header(name.as_str(), value);
					}
				}
			}

			let (body, default_mime) = if let Some(json) = map.get("json") {
				(serde_json::to_vec(json).unwrap_or_default(), "application/json")
			} else {
				match map.get("body") {
					Some(Value::String(text)) => {
						(text.clone().into_bytes(), "text/plain; charset=utf-8")
					}
					Some(other) => {
						(serde_json::to_vec(other).unwrap_or_default(), "application/json")
					}
					None => (Vec::new(), "text/plain; charset=utf-8"),
				}
			};

			let has_content_type = map
				.get("headers")
				.and_then(Value::as_object)
				.is_some_and(|headers| headers.keys().any(|k| k.eq_ignore_ascii_case("content-type")));
			if !has_content_type {
				builder = builder.header(header::CONTENT_TYPE, default_mime);
			}

			builder.body(Body::from(body)).unwrap_or_else(|_| plain_500())
		}
		other => Response::builder()
			.status(StatusCode::OK)
			.header(header::CONTENT_TYPE, "application/json")
			.body(Body::from(serde_json::to_vec(&other).unwrap_or_default()))
			.unwrap_or_else(|_| plain_500()),
	}
}

fn plain_500() -> Response {
	let mut response = Response::new(Body::from("Internal Server Error"));
	*response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
	response
}


// vim: ts=4

//! System endpoints: health, configuration, audit ledger

use axum::{
	extract::{Query, State},
	http::StatusCode,
	Json,
};
use serde::Deserialize;

use crate::core::app::VERSION;
use crate::prelude::*;

/// GET /health - 200 "OK" while the substrate answers, 503 otherwise
pub async fn get_health(State(app): State<App>) -> (StatusCode, &'static str) {
	match app.auth_adapter.ping().await {
		Ok(()) => (StatusCode::OK, "OK"),
		Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "storage unreachable"),
	}
}

/// GET /api/system/config - admin-gated installation overview
pub async fn get_config(State(app): State<App>) -> FzResult<Json<serde_json::Value>> {
	let session_ttl = match app.auth_adapter.read_var("session_ttl").await {
		Ok(value) => value.parse::<i64>().unwrap_or(app.opts.session_ttl),
		Err(_) => app.opts.session_ttl,
	};

	Ok(Json(serde_json::json!({
		"data": {
			"version": VERSION,
			"apex": app.opts.apex,
			"listen": app.opts.listen,
			"listenHttps": app.opts.listen_https,
			"acme": app.opts.acme_email.is_some(),
			"sessionTtl": session_ttl,
			"trustedProxies": app.opts.trusted_proxies.iter().map(ToString::to_string).collect::<Vec<_>>(),
		}
	})))
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
	pub limit: Option<u32>,
}

/// GET /api/audit
pub async fn list_audit_events(
	State(app): State<App>,
	Query(query): Query<AuditQuery>,
) -> FzResult<Json<serde_json::Value>> {
	let events = app
		.auth_adapter
		.list_audit_events(query.limit.unwrap_or(100).min(1000))
		.await?;
	Ok(Json(serde_json::json!({ "data": events })))
}

// vim: ts=4

//! API key administration endpoints

use axum::{
	extract::{Path, State},
	http::StatusCode,
	response::{IntoResponse, Response},
	Json,
};
use serde::Deserialize;

use crate::admin::audit;
use crate::core::extract::Auth;
use crate::prelude::*;
use fazt_types::auth_adapter::CreateApiKeyOptions;

/// GET /api/api-keys
pub async fn list_api_keys(State(app): State<App>) -> FzResult<Json<serde_json::Value>> {
	let keys = app.auth_adapter.list_api_keys().await?;
	Ok(Json(serde_json::json!({ "data": keys })))
}

#[derive(Debug, Deserialize)]
pub struct ApiKeyRequest {
	pub name: Option<String>,
	/// Comma-separated scope string, e.g. "deploy"
	pub scopes: Option<String>,
	/// Expiry in seconds from now
	pub expires_in: Option<i64>,
}

/// POST /api/api-keys - the plaintext key appears once, in this response
pub async fn create_api_key(
	State(app): State<App>,
	Auth(auth): Auth,
	Json(req): Json<ApiKeyRequest>,
) -> FzResult<Response> {
	let created = app
		.auth_adapter
		.create_api_key(&CreateApiKeyOptions {
			user_id: &auth.user_id,
			name: req.name.as_deref(),
			scopes: req.scopes.as_deref(),
			expires_at: req.expires_in.map(Timestamp::from_now),
		})
		.await?;

	audit(
		&app,
		Some(&auth),
		"api_key.create",
		9,
		serde_json::json!({"keyId": created.info.key_id, "scopes": created.info.scopes}),
	)
	.await;

	Ok((
		StatusCode::CREATED,
		Json(serde_json::json!({
			"data": { "key": created.plaintext_key, "info": created.info }
		})),
	)
		.into_response())
}

/// DELETE /api/api-keys/{id}
pub async fn delete_api_key(
	State(app): State<App>,
	Auth(auth): Auth,
	Path(key_id): Path<i64>,
) -> FzResult<StatusCode> {
	app.auth_adapter.delete_api_key(key_id).await?;
	audit(&app, Some(&auth), "api_key.delete", 8, serde_json::json!({"keyId": key_id})).await;
	Ok(StatusCode::NO_CONTENT)
}

// vim: ts=4

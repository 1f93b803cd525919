//! User administration endpoints

use axum::{
	extract::{Path, State},
	http::StatusCode,
	Json,
};
use serde::Deserialize;

use crate::admin::audit;
use crate::core::extract::Auth;
use crate::prelude::*;

/// GET /api/users
pub async fn list_users(State(app): State<App>) -> FzResult<Json<serde_json::Value>> {
	let users = app.auth_adapter.list_users().await?;
	Ok(Json(serde_json::json!({ "data": users })))
}

/// GET /api/users/{id}
pub async fn get_user(
	State(app): State<App>,
	Path(user_id): Path<String>,
) -> FzResult<Json<serde_json::Value>> {
	let user = app.auth_adapter.read_user(&user_id).await?;
	Ok(Json(serde_json::json!({ "data": user })))
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
	pub role: Role,
}

/// PUT /api/users/{id}/role - role changes are security-critical
pub async fn update_user_role(
	State(app): State<App>,
	Auth(auth): Auth,
	Path(user_id): Path<String>,
	Json(req): Json<RoleRequest>,
) -> FzResult<Json<serde_json::Value>> {
	let user = app.auth_adapter.update_user_role(&user_id, req.role).await?;

	audit(
		&app,
		Some(&auth),
		"user.role",
		9,
		serde_json::json!({"userId": user_id, "role": req.role}),
	)
	.await;

	Ok(Json(serde_json::json!({ "data": user })))
}

/// DELETE /api/users/{id} - sessions cascade with the user
pub async fn delete_user(
	State(app): State<App>,
	Auth(auth): Auth,
	Path(user_id): Path<String>,
) -> FzResult<StatusCode> {
	if user_id == &*auth.user_id {
		return Err(Error::Conflict("cannot delete your own account".into()));
	}

	app.auth_adapter.delete_user(&user_id).await?;

	audit(&app, Some(&auth), "user.delete", 9, serde_json::json!({"userId": user_id})).await;

	Ok(StatusCode::NO_CONTENT)
}

// vim: ts=4

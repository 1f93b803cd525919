//! Invite administration endpoints (redemption is public, in `auth`)

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
use fazt_types::auth_adapter::CreateInvite;
use fazt_types::types::ApiResponse;

/// GET /api/invites
pub async fn list_invites(State(app): State<App>) -> FzResult<Json<serde_json::Value>> {
	let invites = app.auth_adapter.list_invites().await?;
	Ok(Json(serde_json::json!({ "data": invites })))
}

#[derive(Debug, Deserialize)]
pub struct InviteRequest {
	pub role: Option<Role>,
	pub max_uses: Option<u32>,
	/// Expiry in seconds from now
	pub expires_in: Option<i64>,
}

/// POST /api/invites
pub async fn create_invite(
	State(app): State<App>,
	Auth(auth): Auth,
	Json(req): Json<InviteRequest>,
) -> FzResult<Response> {
	let invite = app
		.auth_adapter
		.create_invite(&CreateInvite {
			role: req.role.unwrap_or(Role::User),
			max_uses: req.max_uses.unwrap_or(1),
			expires_at: req.expires_in.map(Timestamp::from_now),
			created_by: &auth.user_id,
		})
		.await?;

	audit(
		&app,
		Some(&auth),
		"invite.create",
		7,
		serde_json::json!({"code": invite.code, "role": invite.role, "maxUses": invite.max_uses}),
	)
	.await;

	Ok((StatusCode::CREATED, Json(ApiResponse::new(invite))).into_response())
}

/// DELETE /api/invites/{code}
pub async fn delete_invite(
	State(app): State<App>,
	Auth(auth): Auth,
	Path(code): Path<String>,
) -> FzResult<StatusCode> {
	app.auth_adapter.delete_invite(&code).await?;
	audit(&app, Some(&auth), "invite.delete", 5, serde_json::json!({"code": code})).await;
	Ok(StatusCode::NO_CONTENT)
}

// vim: ts=4

//! Command gateway: a whitelisted CLI-equivalent surface.
//!
//! Runs a named command on the server and answers with the uniform
//! `{success, data, error}` envelope. Unknown commands are rejected, not
//! forwarded anywhere.

use axum::{extract::State, Json};
use serde::Deserialize;

use crate::admin::audit;
use crate::core::app::VERSION;
use crate::core::extract::Auth;
use crate::prelude::*;
use fazt_types::auth_adapter::CreateInvite;

#[derive(Debug, Deserialize)]
pub struct CmdRequest {
	pub command: String,
	#[serde(default)]
	pub args: Vec<String>,
}

/// POST /api/cmd
pub async fn post_cmd(
	State(app): State<App>,
	Auth(auth): Auth,
	Json(req): Json<CmdRequest>,
) -> Json<serde_json::Value> {
	let result = run_command(&app, &auth, &req).await;

	audit(
		&app,
		Some(&auth),
		"cmd",
		5,
		serde_json::json!({"command": req.command, "ok": result.is_ok()}),
	)
	.await;

	match result {
		Ok(data) => Json(serde_json::json!({"success": true, "data": data, "error": null})),
		Err(err) => Json(serde_json::json!({
			"success": false,
			"data": null,
			"error": err.to_string(),
		})),
	}
}

async fn run_command(
	app: &App,
	auth: &fazt_types::auth_adapter::AuthCtx,
	req: &CmdRequest,
) -> FzResult<serde_json::Value> {
	match req.command.as_str() {
		"version" => Ok(serde_json::json!({"version": VERSION})),
		"list-apps" => {
			let apps = app.meta_adapter.list_apps().await?;
			Ok(serde_json::to_value(apps)?)
		}
		"list-aliases" => {
			let aliases = app.meta_adapter.list_aliases().await?;
			Ok(serde_json::to_value(aliases)?)
		}
		"list-users" => {
			let users = app.auth_adapter.list_users().await?;
			Ok(serde_json::to_value(users)?)
		}
		"create-invite" => {
			let role = req
				.args
				.first()
				.map(|r| Role::parse(r).ok_or_else(|| {
					Error::ValidationError(format!("unknown role '{}'", r))
				}))
				.transpose()?
				.unwrap_or(Role::User);
			let invite = app
				.auth_adapter
				.create_invite(&CreateInvite {
					role,
					max_uses: 1,
					expires_at: None,
					created_by: &auth.user_id,
				})
				.await?;
			Ok(serde_json::to_value(invite)?)
		}
		"purge-sessions" => {
			let purged = app.auth_adapter.purge_expired_sessions().await?;
			Ok(serde_json::json!({"purged": purged}))
		}
		other => Err(Error::ValidationError(format!("unknown command '{}'", other))),
	}
}

// vim: ts=4

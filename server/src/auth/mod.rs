//! Authentication handlers: login, logout, session introspection, invite
//! redemption and the OAuth callback contract.

pub mod oauth;
pub mod throttle;

use axum::{
	extract::{ConnectInfo, Path, Query, State},
	http::{header, HeaderMap, StatusCode},
	response::{IntoResponse, Redirect, Response},
	Json,
};
use serde::Deserialize;
use std::net::SocketAddr;

use crate::core::extract::{Auth, OptionalAuth};
use crate::core::middleware::SESSION_COOKIE;
use crate::core::utils::{clear_cookie, client_ip, cookie_value, session_cookie};
use crate::prelude::*;
use fazt_types::auth_adapter::{AuditEvent, CreateUser, OAUTH_STATE_EXPIRY};
use fazt_types::types::ApiResponse;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
	/// The account email; the field keeps its historical name
	pub username: String,
	pub password: String,
}

/// POST /api/login - password login, sets the session cookie
pub async fn post_login(
	State(app): State<App>,
	ConnectInfo(peer): ConnectInfo<SocketAddr>,
	headers: HeaderMap,
	Json(req): Json<LoginRequest>,
) -> FzResult<Response> {
	let ip = client_ip(peer.ip(), &headers, &app.opts.trusted_proxies);
	app.login_throttle.check(ip)?;

	let user = match app.auth_adapter.check_password(&req.username, &req.password).await {
		Ok(user) => user,
		Err(_) => {
			app.login_throttle.record_failure(ip);
			return Err(Error::Unauthorized);
		}
	};
	app.login_throttle.record_success(ip);

	let session = app.auth_adapter.create_session(&user.user_id, app.opts.session_ttl).await?;
	let _ = app
		.auth_adapter
		.create_audit_event(&AuditEvent {
			actor: Some(&user.user_id),
			action: "login",
			weight: 3,
			detail: None,
		})
		.await;

	let cookie = session_cookie(
		SESSION_COOKIE,
		&session.token,
		app.opts.session_ttl,
		app.opts.listen_https.is_some(),
	);

	Ok((
		StatusCode::OK,
		[(header::SET_COOKIE, cookie)],
		Json(ApiResponse::new(user)),
	)
		.into_response())
}

/// POST /api/logout - invalidates the session, clears the cookie
pub async fn post_logout(State(app): State<App>, headers: HeaderMap) -> FzResult<Response> {
	if let Some(token) = cookie_value(&headers, SESSION_COOKIE) {
		let _ = app.auth_adapter.delete_session(token).await;
	}

	Ok((
		StatusCode::OK,
		[(header::SET_COOKIE, clear_cookie(SESSION_COOKIE))],
		Json(serde_json::json!({"data": {"loggedOut": true}})),
	)
		.into_response())
}

/// GET /api/auth/status
pub async fn get_status(OptionalAuth(auth): OptionalAuth) -> Json<serde_json::Value> {
	match auth {
		Some(ctx) => Json(serde_json::json!({
			"authenticated": true,
			"user": { "id": ctx.user_id, "email": ctx.email, "name": ctx.name, "role": ctx.role },
		})),
		None => Json(serde_json::json!({ "authenticated": false })),
	}
}

/// GET /api/auth/me
pub async fn get_me(State(app): State<App>, Auth(ctx): Auth) -> FzResult<Json<serde_json::Value>> {
	let user = app.auth_adapter.read_user(&ctx.user_id).await?;
	Ok(Json(serde_json::json!({ "data": user })))
}

#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
	pub code: String,
	pub email: String,
	pub name: String,
	pub password: Option<String>,
}

/// POST /api/invite/redeem - atomic one-shot registration
pub async fn post_invite_redeem(
	State(app): State<App>,
	Json(req): Json<RedeemRequest>,
) -> FzResult<Response> {
	let user = app
		.auth_adapter
		.redeem_invite(&req.code, &req.email, &req.name, req.password.as_deref())
		.await?;

	let _ = app
		.auth_adapter
		.create_audit_event(&AuditEvent {
			actor: Some(&user.user_id),
			action: "invite.redeem",
			weight: 6,
			detail: Some(serde_json::json!({"code": req.code, "role": user.role})),
		})
		.await;

	Ok((StatusCode::CREATED, Json(ApiResponse::new(user))).into_response())
}

/// GET /api/auth/oauth/{provider} - mint a state and redirect out
pub async fn get_oauth_start(
	State(app): State<App>,
	Path(provider): Path<String>,
) -> FzResult<Redirect> {
	let idp = app
		.identity_providers
		.get(provider.as_str())
		.ok_or(Error::NotFound)?;

	let state = app.auth_adapter.create_oauth_state(&provider, OAUTH_STATE_EXPIRY).await?;
	Ok(Redirect::temporary(&idp.authorize_url(&state)))
}

#[derive(Debug, Deserialize)]
pub struct OauthCallback {
	pub code: String,
	pub state: String,
}

/// GET /api/auth/oauth/{provider}/callback - consume the state exactly
/// once, exchange the code, sign the user in
pub async fn get_oauth_callback(
	State(app): State<App>,
	Path(provider): Path<String>,
	Query(params): Query<OauthCallback>,
) -> FzResult<Response> {
	let idp = app
		.identity_providers
		.get(provider.as_str())
		.ok_or(Error::NotFound)?;

	let state = app.auth_adapter.consume_oauth_state(&params.state).await?;
	if &*state.provider != provider.as_str() {
		return Err(Error::Unauthorized);
	}

	let profile = idp.exchange_code(&params.code).await?;
	let user = app
		.auth_adapter
		.upsert_oauth_user(&CreateUser {
			email: &profile.email,
			name: &profile.name,
			avatar_url: profile.avatar_url.as_deref(),
			provider: &provider,
			role: Role::User,
			password: None,
		})
		.await?;

	let session = app.auth_adapter.create_session(&user.user_id, app.opts.session_ttl).await?;
	let cookie = session_cookie(
		SESSION_COOKIE,
		&session.token,
		app.opts.session_ttl,
		app.opts.listen_https.is_some(),
	);

	Ok((
		StatusCode::SEE_OTHER,
		[(header::SET_COOKIE, cookie), (header::LOCATION, "/".to_string())],
		String::new(),
	)
		.into_response())
}

// vim: ts=4

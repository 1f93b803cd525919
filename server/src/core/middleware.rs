//! Custom middlewares

use axum::{
	body::Body,
	extract::State,
	http::{header, Request, Response},
	middleware::Next,
};

use crate::core::extract::{Auth, RequestId};
use crate::core::utils::cookie_value;
use crate::prelude::*;

/// Session cookie name; its value is the plaintext token
pub const SESSION_COOKIE: &str = "fazt_session";

/// Resolve the request's principal, if any, and stash it as an extension.
///
/// Credentials, in order: the session cookie, then an `Authorization:
/// Bearer fz_...` API key. Invalid credentials do not fail the request
/// here; role gates decide downstream. The role inside the resulting
/// context is read fresh from the user row on every request.
pub async fn optional_auth(
	State(state): State<App>,
	mut req: Request<Body>,
	next: Next,
) -> FzResult<Response<Body>> {
	if let Some(token) = cookie_value(req.headers(), SESSION_COOKIE) {
		if let Ok(ctx) = state.auth_adapter.validate_session(token).await {
			req.extensions_mut().insert(Auth(ctx));
			return Ok(next.run(req).await);
		}
	}

	if let Some(auth_header) =
		req.headers().get(header::AUTHORIZATION).and_then(|h| h.to_str().ok())
	{
		if let Some(key) = auth_header.strip_prefix("Bearer ") {
			if let Ok(ctx) = state.auth_adapter.validate_api_key(key.trim()).await {
				req.extensions_mut().insert(Auth(ctx));
			}
		}
	}

	Ok(next.run(req).await)
}

/// 401 unless a valid principal was resolved
pub async fn require_auth(req: Request<Body>, next: Next) -> FzResult<Response<Body>> {
	if req.extensions().get::<Auth>().is_none() {
		return Err(Error::Unauthorized);
	}
	Ok(next.run(req).await)
}

/// 401 without a principal, 403 below admin
pub async fn require_admin(req: Request<Body>, next: Next) -> FzResult<Response<Body>> {
	match req.extensions().get::<Auth>() {
		None => Err(Error::Unauthorized),
		Some(Auth(ctx)) if !ctx.role.is_admin() => Err(Error::PermissionDenied),
		Some(_) => Ok(next.run(req).await),
	}
}

/// Attach a request id for logs and the serverless request object
pub async fn request_id_middleware(
	mut req: Request<Body>,
	next: Next,
) -> FzResult<Response<Body>> {
	req.extensions_mut().insert(RequestId(uuid::Uuid::new_v4().to_string()));
	Ok(next.run(req).await)
}

// vim: ts=4

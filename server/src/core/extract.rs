//! Custom extractors for fazt-specific request data

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::prelude::*;
use fazt_types::auth_adapter::AuthCtx;

// Extractors //
//************//

// SiteCtx //
//*********//
/// The site a request was routed to by the host classifier
#[derive(Clone, Debug)]
pub struct SiteCtx {
	pub site_id: Box<str>,
	/// True for the `404.<apex>` host: content is served with a 404 status
	pub not_found: bool,
	/// True when the request arrived over the local `/_app/<id>/` tunnel
	pub local_tunnel: bool,
}

impl<S> FromRequestParts<S> for SiteCtx
where
	S: Send + Sync,
{
	type Rejection = Error;

	async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
		parts.extensions.get::<SiteCtx>().cloned().ok_or(Error::NotFound)
	}
}

// Auth //
//******//
#[derive(Debug, Clone)]
pub struct Auth(pub AuthCtx);

impl<S> FromRequestParts<S> for Auth
where
	S: Send + Sync,
{
	type Rejection = Error;

	async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
		parts.extensions.get::<Auth>().cloned().ok_or(Error::Unauthorized)
	}
}

// OptionalAuth //
//**************//
/// Optional auth extractor that doesn't fail if auth is missing
#[derive(Debug, Clone)]
pub struct OptionalAuth(pub Option<AuthCtx>);

impl<S> FromRequestParts<S> for OptionalAuth
where
	S: Send + Sync,
{
	type Rejection = Error;

	async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
		let auth = parts.extensions.get::<Auth>().cloned().map(|a| a.0);
		Ok(OptionalAuth(auth))
	}
}

// RequestId //
//***********//
/// Request ID for tracing and handler-visible correlation
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

impl<S> FromRequestParts<S> for RequestId
where
	S: Send + Sync,
{
	type Rejection = Error;

	async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
		Ok(parts
			.extensions
			.get::<RequestId>()
			.cloned()
			.unwrap_or_else(|| RequestId(uuid::Uuid::new_v4().to_string())))
	}
}

// vim: ts=4

//! Adapter that manages and stores authentication, authorization and other sensitive data.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fmt::Debug;

use crate::prelude::*;

/// Default session lifetime (30 days)
pub const SESSION_EXPIRY: i64 = 30 * 86400;

/// Default OAuth state lifetime (10 minutes)
pub const OAUTH_STATE_EXPIRY: i64 = 600;

/// A stored user
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
	pub user_id: Box<str>,
	pub email: Box<str>,
	pub name: Box<str>,
	pub avatar_url: Option<Box<str>>,
	/// Identity provider this account came from ("local", "github", ...)
	pub provider: Box<str>,
	pub role: Role,
	pub created_at: Timestamp,
	pub updated_at: Timestamp,
}

#[derive(Debug)]
pub struct CreateUser<'a> {
	pub email: &'a str,
	pub name: &'a str,
	pub avatar_url: Option<&'a str>,
	pub provider: &'a str,
	pub role: Role,
	/// Plaintext password for the local provider; hashed before storage
	pub password: Option<&'a str>,
}

/// Context struct for an authenticated principal.
///
/// The role is read fresh from the user row at validation time, never
/// cached inside the credential, so demotions take effect within one
/// request.
#[derive(Clone, Debug)]
pub struct AuthCtx {
	pub user_id: Box<str>,
	pub email: Box<str>,
	pub name: Box<str>,
	pub role: Role,
	/// Scope string when authenticated via API key ("deploy", ...)
	pub scope: Option<Box<str>>,
}

impl AuthCtx {
	pub fn has_scope(&self, scope: &str) -> bool {
		match &self.scope {
			// Sessions carry no scope restriction
			None => true,
			Some(s) => s.split(',').any(|part| part.trim() == scope),
		}
	}
}

/// Result of session creation. The plaintext token exists only here and in
/// the client's cookie; the store keeps its hash.
#[derive(Debug)]
pub struct CreatedSession {
	pub token: Box<str>,
	pub expires_at: Timestamp,
}

/// A one-shot or bounded-use registration code
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Invite {
	pub code: Box<str>,
	pub role: Role,
	pub max_uses: u32,
	pub use_count: u32,
	pub expires_at: Option<Timestamp>,
	pub created_by: Box<str>,
	pub created_at: Timestamp,
}

#[derive(Debug)]
pub struct CreateInvite<'a> {
	pub role: Role,
	pub max_uses: u32,
	pub expires_at: Option<Timestamp>,
	pub created_by: &'a str,
}

/// Payload stored with an OAuth state token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OauthState {
	pub provider: Box<str>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyInfo {
	pub key_id: i64,
	pub key_prefix: Box<str>,
	pub name: Option<Box<str>>,
	pub scopes: Option<Box<str>>,
	pub user_id: Box<str>,
	pub expires_at: Option<Timestamp>,
	pub last_used_at: Option<Timestamp>,
	pub created_at: Timestamp,
}

#[derive(Debug)]
pub struct CreatedApiKey {
	pub info: ApiKeyInfo,
	pub plaintext_key: Box<str>,
}

#[derive(Debug)]
pub struct CreateApiKeyOptions<'a> {
	pub user_id: &'a str,
	pub name: Option<&'a str>,
	pub scopes: Option<&'a str>,
	pub expires_at: Option<Timestamp>,
}

/// TLS certificate material for one domain
#[derive(Debug, Clone)]
pub struct CertData {
	pub domain: Box<str>,
	pub cert: Box<str>,
	pub key: Box<str>,
	pub expires_at: Timestamp,
}

/// An administrative audit record. Weight 0 is debug, 9 is
/// security-critical (API-key creation, role changes).
#[derive(Debug)]
pub struct AuditEvent<'a> {
	pub actor: Option<&'a str>,
	pub action: &'a str,
	pub weight: u8,
	pub detail: Option<serde_json::Value>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEventRow {
	pub ev_id: i64,
	pub actor: Option<Box<str>>,
	pub action: Box<str>,
	pub weight: u8,
	pub detail: Option<serde_json::Value>,
	pub created_at: Timestamp,
}

#[async_trait]
pub trait AuthAdapter: Send + Sync + Debug {
	// Users //
	async fn create_user(&self, data: &CreateUser<'_>) -> FzResult<User>;
	async fn read_user(&self, user_id: &str) -> FzResult<User>;
	async fn read_user_by_email(&self, email: &str) -> FzResult<User>;
	async fn list_users(&self) -> FzResult<Vec<User>>;
	/// Role changes. Demoting or deleting the owner is a Conflict.
	async fn update_user_role(&self, user_id: &str, role: Role) -> FzResult<User>;
	async fn update_user_profile(
		&self,
		user_id: &str,
		name: Option<&str>,
		avatar_url: Patch<&str>,
	) -> FzResult<User>;
	/// Deletes the user; sessions cascade.
	async fn delete_user(&self, user_id: &str) -> FzResult<()>;
	async fn check_password(&self, email: &str, password: &str) -> FzResult<User>;
	async fn set_password(&self, user_id: &str, password: &str) -> FzResult<()>;

	// Sessions //
	async fn create_session(&self, user_id: &str, ttl: i64) -> FzResult<CreatedSession>;
	async fn validate_session(&self, token: &str) -> FzResult<AuthCtx>;
	async fn delete_session(&self, token: &str) -> FzResult<()>;
	async fn purge_expired_sessions(&self) -> FzResult<u32>;

	// Invites //
	async fn create_invite(&self, data: &CreateInvite<'_>) -> FzResult<Invite>;
	async fn list_invites(&self) -> FzResult<Vec<Invite>>;
	async fn read_invite(&self, code: &str) -> FzResult<Invite>;
	async fn delete_invite(&self, code: &str) -> FzResult<()>;
	/// Atomically verifies the code (exists, unexpired, uses left),
	/// increments its use count and creates the user. Exhausted or unknown
	/// codes are a Conflict; concurrent redemptions of a single-use code
	/// admit exactly one winner.
	async fn redeem_invite(
		&self,
		code: &str,
		email: &str,
		name: &str,
		password: Option<&str>,
	) -> FzResult<User>;

	// OAuth state //
	async fn create_oauth_state(&self, provider: &str, ttl: i64) -> FzResult<Box<str>>;
	/// Single-use consumption: the first caller gets the state, any other
	/// caller gets Unauthorized.
	async fn consume_oauth_state(&self, state: &str) -> FzResult<OauthState>;
	/// Creates or refreshes a user from an identity-provider profile.
	async fn upsert_oauth_user(&self, data: &CreateUser<'_>) -> FzResult<User>;

	// API keys //
	async fn create_api_key(&self, opts: &CreateApiKeyOptions<'_>) -> FzResult<CreatedApiKey>;
	async fn validate_api_key(&self, key: &str) -> FzResult<AuthCtx>;
	async fn list_api_keys(&self) -> FzResult<Vec<ApiKeyInfo>>;
	async fn delete_api_key(&self, key_id: i64) -> FzResult<()>;

	// Certificates //
	async fn create_cert(&self, data: &CertData) -> FzResult<()>;
	async fn read_cert_by_domain(&self, domain: &str) -> FzResult<CertData>;
	async fn list_certs(&self) -> FzResult<Vec<CertData>>;

	// Installation variables //
	async fn read_var(&self, key: &str) -> FzResult<Box<str>>;
	async fn write_var(&self, key: &str, value: &str) -> FzResult<()>;

	// Audit //
	async fn create_audit_event(&self, ev: &AuditEvent<'_>) -> FzResult<()>;
	async fn list_audit_events(&self, limit: u32) -> FzResult<Vec<AuditEventRow>>;

	/// Storage liveness probe for the health endpoint
	async fn ping(&self) -> FzResult<()>;

	/// Flush and release the storage writer; part of process teardown
	async fn close(&self) {}
}

// vim: ts=4

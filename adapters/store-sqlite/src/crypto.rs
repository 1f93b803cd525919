//! Credential hashing and token generation.
//!
//! Session tokens are high-entropy random values stored as SHA-256 digests;
//! a lookup by digest is cheap, so no work-factor hash is needed. Passwords
//! and API keys go through bcrypt on the worker pool.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use std::sync::Arc;

use fazt_types::prelude::*;
use fazt_types::utils::{random_id_len, sha256_hex};
use fazt_types::worker::WorkerPool;

const BCRYPT_COST: u32 = 10;

/// Session tokens carry 32 bytes of entropy
const SESSION_TOKEN_BYTES: usize = 32;

pub(crate) const API_KEY_PREFIX: &str = "fz_";
const API_KEY_RANDOM_LEN: usize = 40;

pub(crate) async fn generate_password_hash(
	worker: &Arc<WorkerPool>,
	password: Box<str>,
) -> FzResult<Box<str>> {
	worker
		.try_run_immed(move || {
			let hash =
				bcrypt::hash(password.as_ref(), BCRYPT_COST).map_err(|_| Error::PermissionDenied)?;
			Ok(hash.into())
		})
		.await
}

pub(crate) async fn check_password_hash(
	worker: &Arc<WorkerPool>,
	password: Box<str>,
	password_hash: Box<str>,
) -> FzResult<()> {
	worker
		.try_run_immed(move || {
			let res = bcrypt::verify(password.as_ref(), &password_hash)
				.map_err(|_| Error::PermissionDenied)?;
			if !res {
				return Err(Error::PermissionDenied);
			}
			Ok(())
		})
		.await
}

/// Generate a session token: base64url of 32 random bytes. The plaintext
/// goes to the client; only the digest is stored.
pub(crate) fn generate_session_token() -> Box<str> {
	let mut bytes = [0u8; SESSION_TOKEN_BYTES];
	rand::rng().fill(&mut bytes);
	URL_SAFE_NO_PAD.encode(bytes).into()
}

pub(crate) fn session_token_hash(token: &str) -> String {
	sha256_hex(token.as_bytes())
}

/// Generate an API key: `fz_` + 40 random chars. Returns the plaintext key
/// and its lookup prefix (`fz_` + first 8 random chars).
pub(crate) fn generate_api_key() -> (String, String) {
	let random = random_id_len(API_KEY_RANDOM_LEN);
	let key = format!("{}{}", API_KEY_PREFIX, random);
	let prefix = key[..API_KEY_PREFIX.len() + 8].to_string();
	(key, prefix)
}

pub(crate) async fn hash_api_key(worker: &Arc<WorkerPool>, key: &str) -> FzResult<Box<str>> {
	generate_password_hash(worker, key.into()).await
}

pub(crate) async fn verify_api_key(
	worker: &Arc<WorkerPool>,
	key: Box<str>,
	key_hash: Box<str>,
) -> FzResult<()> {
	check_password_hash(worker, key, key_hash).await
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn session_tokens_are_long_and_distinct() {
		let a = generate_session_token();
		let b = generate_session_token();
		// 32 bytes base64url → 43 chars
		assert!(a.len() >= 43);
		assert_ne!(a, b);
	}

	#[test]
	fn api_key_prefix_shape() {
		let (key, prefix) = generate_api_key();
		assert!(key.starts_with("fz_"));
		assert_eq!(prefix.len(), 11);
		assert!(key.starts_with(&prefix));
	}
}

// vim: ts=4

//! Session storage. Only token digests are persisted.

use sqlx::Row;

use crate::{crypto, db_err, map_res, user::map_user_row, StoreSqlite};
use fazt_types::auth_adapter::{AuthCtx, CreatedSession};
use fazt_types::prelude::*;

pub(crate) async fn create_session(
	store: &StoreSqlite,
	user_id: &str,
	ttl: i64,
) -> FzResult<CreatedSession> {
	let token = crypto::generate_session_token();
	let token_hash = crypto::session_token_hash(&token);
	let expires_at = Timestamp::from_now(ttl);

	sqlx::query(
		"INSERT INTO sessions (token_hash, user_id, expires_at, last_seen_at)
			VALUES (?1, ?2, ?3, unixepoch())",
	)
	.bind(&token_hash)
	.bind(user_id)
	.bind(expires_at.0)
	.execute(store.write())
	.await
	.map_err(db_err)?;

	Ok(CreatedSession { token, expires_at })
}

/// Look up a session by token digest. The user row is joined so the role is
/// always current; deleted users disappear via the cascade.
pub(crate) async fn validate_session(store: &StoreSqlite, token: &str) -> FzResult<AuthCtx> {
	let token_hash = crypto::session_token_hash(token);

	let row = sqlx::query(
		"SELECT s.expires_at, u.user_id, u.email, u.name, u.avatar_url, u.provider, u.role,
				u.created_at, u.updated_at
			FROM sessions s
			JOIN users u ON u.user_id = s.user_id
			WHERE s.token_hash = ?1",
	)
	.bind(&token_hash)
	.fetch_one(store.read())
	.await;

	let (expires_at, user) = map_res(row, |row| {
		let expires_at: i64 = row.try_get("expires_at")?;
		Ok((Timestamp(expires_at), map_user_row(row)?))
	})
	.map_err(|_| Error::Unauthorized)?;

	if expires_at.is_past() {
		return Err(Error::Unauthorized);
	}

	// Best-effort freshness marker; failures here never reject the request
	let _ = sqlx::query("UPDATE sessions SET last_seen_at = unixepoch() WHERE token_hash = ?1")
		.bind(&token_hash)
		.execute(store.write())
		.await;

	Ok(AuthCtx {
		user_id: user.user_id,
		email: user.email,
		name: user.name,
		role: user.role,
		scope: None,
	})
}

pub(crate) async fn delete_session(store: &StoreSqlite, token: &str) -> FzResult<()> {
	let token_hash = crypto::session_token_hash(token);
	let result = sqlx::query("DELETE FROM sessions WHERE token_hash = ?1")
		.bind(&token_hash)
		.execute(store.write())
		.await
		.map_err(db_err)?;

	if result.rows_affected() == 0 {
		return Err(Error::NotFound);
	}
	Ok(())
}

pub(crate) async fn purge_expired_sessions(store: &StoreSqlite) -> FzResult<u32> {
	let result = sqlx::query("DELETE FROM sessions WHERE expires_at < unixepoch()")
		.execute(store.write())
		.await
		.map_err(db_err)?;
	Ok(u32::try_from(result.rows_affected()).unwrap_or_default())
}

// vim: ts=4

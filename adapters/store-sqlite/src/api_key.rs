//! API key management

use sqlx::{Row, sqlite::SqliteRow};

use crate::{crypto, db_err, map_res, StoreSqlite};
use fazt_types::auth_adapter::{ApiKeyInfo, AuthCtx, CreateApiKeyOptions, CreatedApiKey};
use fazt_types::prelude::*;

fn map_api_key_row(row: SqliteRow) -> Result<ApiKeyInfo, sqlx::Error> {
	Ok(ApiKeyInfo {
		key_id: row.try_get("key_id")?,
		key_prefix: row.try_get::<String, _>("key_prefix")?.into(),
		name: row.try_get::<Option<String>, _>("name")?.map(Into::into),
		scopes: row.try_get::<Option<String>, _>("scopes")?.map(Into::into),
		user_id: row.try_get::<String, _>("user_id")?.into(),
		expires_at: row.try_get::<Option<i64>, _>("expires_at")?.map(Timestamp),
		last_used_at: row.try_get::<Option<i64>, _>("last_used_at")?.map(Timestamp),
		created_at: Timestamp(row.try_get("created_at")?),
	})
}

const API_KEY_COLUMNS: &str =
	"key_id, key_prefix, name, scopes, user_id, expires_at, last_used_at, created_at";

pub(crate) async fn create_api_key(
	store: &StoreSqlite,
	opts: &CreateApiKeyOptions<'_>,
) -> FzResult<CreatedApiKey> {
	let (plaintext_key, key_prefix) = crypto::generate_api_key();
	let key_hash = crypto::hash_api_key(store.worker(), &plaintext_key).await?;

	let row = sqlx::query(&format!(
		"INSERT INTO api_keys (key_prefix, key_hash, name, scopes, user_id, expires_at)
			VALUES (?1, ?2, ?3, ?4, ?5, ?6)
			RETURNING {API_KEY_COLUMNS}"
	))
	.bind(&key_prefix)
	.bind(key_hash.as_ref())
	.bind(opts.name)
	.bind(opts.scopes)
	.bind(opts.user_id)
	.bind(opts.expires_at.map(|t| t.0))
	.fetch_one(store.write())
	.await
	.map_err(db_err)?;

	let info = map_res(Ok(row), map_api_key_row)?;

	Ok(CreatedApiKey { info, plaintext_key: plaintext_key.into() })
}

/// Validate an API key and return the principal it authenticates. The
/// user's role is joined fresh; the key's scope string restricts what the
/// principal may do.
pub(crate) async fn validate_api_key(store: &StoreSqlite, key: &str) -> FzResult<AuthCtx> {
	if !key.starts_with(crypto::API_KEY_PREFIX) {
		return Err(Error::Unauthorized);
	}
	let prefix_len = crypto::API_KEY_PREFIX.len() + 8;
	if key.len() < prefix_len {
		return Err(Error::Unauthorized);
	}
	let key_prefix = &key[..prefix_len];

	type CandidateRow = (i64, String, Option<String>, Option<i64>, String, String, String, String);
	let candidates: Vec<CandidateRow> = sqlx::query_as(
		"SELECT ak.key_id, ak.key_hash, ak.scopes, ak.expires_at,
				u.user_id, u.email, u.name, u.role
			FROM api_keys ak
			JOIN users u ON u.user_id = ak.user_id
			WHERE ak.key_prefix = ?1",
	)
	.bind(key_prefix)
	.fetch_all(store.read())
	.await
	.map_err(db_err)?;

	for (key_id, key_hash, scopes, expires_at, user_id, email, name, role) in candidates {
		if let Some(exp) = expires_at {
			if Timestamp(exp).is_past() {
				continue;
			}
		}

		if crypto::verify_api_key(store.worker(), key.into(), key_hash.into()).await.is_ok() {
			let _ = sqlx::query("UPDATE api_keys SET last_used_at = unixepoch() WHERE key_id = ?1")
				.bind(key_id)
				.execute(store.write())
				.await;

			return Ok(AuthCtx {
				user_id: user_id.into(),
				email: email.into(),
				name: name.into(),
				role: Role::parse(&role).unwrap_or(Role::User),
				scope: scopes.map(Into::into),
			});
		}
	}

	Err(Error::Unauthorized)
}

pub(crate) async fn list_api_keys(store: &StoreSqlite) -> FzResult<Vec<ApiKeyInfo>> {
	let rows = sqlx::query(&format!(
		"SELECT {API_KEY_COLUMNS} FROM api_keys ORDER BY created_at DESC"
	))
	.fetch_all(store.read())
	.await
	.map_err(db_err)?;
	rows.into_iter().map(|row| map_res(Ok(row), map_api_key_row)).collect()
}

pub(crate) async fn delete_api_key(store: &StoreSqlite, key_id: i64) -> FzResult<()> {
	let result = sqlx::query("DELETE FROM api_keys WHERE key_id = ?1")
		.bind(key_id)
		.execute(store.write())
		.await
		.map_err(db_err)?;

	if result.rows_affected() == 0 {
		return Err(Error::NotFound);
	}
	Ok(())
}

// vim: ts=4

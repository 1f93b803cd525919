//! Per-app, per-user key/value cells.
//!
//! Every function takes the `(app_id, user_id)` scope as explicit
//! arguments; the server injects them from the dispatch context, never from
//! handler-supplied values.

use crate::{db_err, StoreSqlite};
use fazt_types::prelude::*;

pub(crate) async fn kv_get(
	store: &StoreSqlite,
	app_id: &str,
	user_id: &str,
	key: &str,
) -> FzResult<Option<Box<str>>> {
	let value: Option<String> = sqlx::query_scalar(
		"SELECT value FROM kv_cells WHERE app_id = ?1 AND user_id = ?2 AND key = ?3",
	)
	.bind(app_id)
	.bind(user_id)
	.bind(key)
	.fetch_optional(store.read())
	.await
	.map_err(db_err)?;

	Ok(value.map(Into::into))
}

pub(crate) async fn kv_set(
	store: &StoreSqlite,
	app_id: &str,
	user_id: &str,
	key: &str,
	value: &str,
) -> FzResult<()> {
	sqlx::query(
		"INSERT INTO kv_cells (app_id, user_id, key, value) VALUES (?1, ?2, ?3, ?4)
			ON CONFLICT(app_id, user_id, key) DO UPDATE SET
				value = excluded.value, updated_at = unixepoch()",
	)
	.bind(app_id)
	.bind(user_id)
	.bind(key)
	.bind(value)
	.execute(store.write())
	.await
	.map_err(db_err)?;

	Ok(())
}

pub(crate) async fn kv_delete(
	store: &StoreSqlite,
	app_id: &str,
	user_id: &str,
	key: &str,
) -> FzResult<bool> {
	let result =
		sqlx::query("DELETE FROM kv_cells WHERE app_id = ?1 AND user_id = ?2 AND key = ?3")
			.bind(app_id)
			.bind(user_id)
			.bind(key)
			.execute(store.write())
			.await
			.map_err(db_err)?;

	Ok(result.rows_affected() > 0)
}

pub(crate) async fn kv_find(
	store: &StoreSqlite,
	app_id: &str,
	user_id: &str,
	prefix: &str,
	limit: u32,
) -> FzResult<Vec<(Box<str>, Box<str>)>> {
	// ESCAPE guards against % and _ in user prefixes
	let pattern = format!("{}%", prefix.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_"));
	let rows: Vec<(String, String)> = sqlx::query_as(
		"SELECT key, value FROM kv_cells
			WHERE app_id = ?1 AND user_id = ?2 AND key LIKE ?3 ESCAPE '\\'
			ORDER BY key LIMIT ?4",
	)
	.bind(app_id)
	.bind(user_id)
	.bind(&pattern)
	.bind(i64::from(limit))
	.fetch_all(store.read())
	.await
	.map_err(db_err)?;

	Ok(rows.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
}

pub(crate) async fn copy_app_kv(
	store: &StoreSqlite,
	from_app: &str,
	to_app: &str,
) -> FzResult<u32> {
	let result = sqlx::query(
		"INSERT INTO kv_cells (app_id, user_id, key, value)
			SELECT ?2, user_id, key, value FROM kv_cells WHERE app_id = ?1",
	)
	.bind(from_app)
	.bind(to_app)
	.execute(store.write())
	.await
	.map_err(db_err)?;

	Ok(u32::try_from(result.rows_affected()).unwrap_or_default())
}

// vim: ts=4

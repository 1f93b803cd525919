//! Alias rows: subdomain → app / redirect / reserved / split

use sqlx::{Row, sqlite::SqliteRow};

use crate::{db_err, map_res, StoreSqlite};
use fazt_types::meta_adapter::{AliasRecord, AliasTarget};
use fazt_types::prelude::*;

fn map_alias_row(row: SqliteRow) -> Result<AliasRecord, sqlx::Error> {
	let targets: String = row.try_get("targets")?;
	Ok(AliasRecord {
		subdomain: row.try_get::<String, _>("subdomain")?.into(),
		target: serde_json::from_str(&targets).unwrap_or(AliasTarget::Reserved),
		created_at: Timestamp(row.try_get("created_at")?),
		updated_at: Timestamp(row.try_get("updated_at")?),
	})
}

/// Check whether a serialized alias target references an app id. Used by
/// app deletion to find referencing aliases precisely.
pub(crate) fn target_references_app(targets_json: &str, app_id: &str) -> bool {
	match serde_json::from_str::<AliasTarget>(targets_json) {
		Ok(AliasTarget::App { app_id: target }) => &*target == app_id,
		Ok(AliasTarget::Split { targets }) => targets.iter().any(|t| &*t.app_id == app_id),
		_ => false,
	}
}

pub(crate) async fn read_alias(store: &StoreSqlite, subdomain: &str) -> FzResult<AliasRecord> {
	let row = sqlx::query(
		"SELECT subdomain, targets, created_at, updated_at FROM aliases WHERE subdomain = ?1",
	)
	.bind(subdomain)
	.fetch_one(store.read())
	.await;
	map_res(row, map_alias_row)
}

pub(crate) async fn list_aliases(store: &StoreSqlite) -> FzResult<Vec<AliasRecord>> {
	let rows = sqlx::query(
		"SELECT subdomain, targets, created_at, updated_at FROM aliases ORDER BY subdomain",
	)
	.fetch_all(store.read())
	.await
	.map_err(db_err)?;
	rows.into_iter().map(|row| map_res(Ok(row), map_alias_row)).collect()
}

pub(crate) async fn upsert_alias(
	store: &StoreSqlite,
	subdomain: &str,
	target: &AliasTarget,
) -> FzResult<AliasRecord> {
	target.validate()?;
	let targets = serde_json::to_string(target)?;

	let row = sqlx::query(
		"INSERT INTO aliases (subdomain, type, targets) VALUES (?1, ?2, ?3)
			ON CONFLICT(subdomain) DO UPDATE SET
				type = excluded.type, targets = excluded.targets, updated_at = unixepoch()
			RETURNING subdomain, targets, created_at, updated_at",
	)
	.bind(subdomain)
	.bind(target.type_name())
	.bind(&targets)
	.fetch_one(store.write())
	.await;

	map_res(row, map_alias_row)
}

pub(crate) async fn delete_alias(store: &StoreSqlite, subdomain: &str) -> FzResult<()> {
	let result = sqlx::query("DELETE FROM aliases WHERE subdomain = ?1")
		.bind(subdomain)
		.execute(store.write())
		.await
		.map_err(db_err)?;

	if result.rows_affected() == 0 {
		return Err(Error::NotFound);
	}
	Ok(())
}

/// Exchange the targets of two `app` aliases. A single transaction on the
/// writer: both rows are read, then one UPDATE rewrites both, so no request
/// can observe a half-swapped state.
pub(crate) async fn swap_aliases(
	store: &StoreSqlite,
	alias1: &str,
	alias2: &str,
) -> FzResult<()> {
	if alias1 == alias2 {
		return Err(Error::Conflict("cannot swap an alias with itself".into()));
	}

	let mut tx = store.write().begin().await.map_err(db_err)?;

	let mut targets = Vec::with_capacity(2);
	for subdomain in [alias1, alias2] {
		let row: Option<(String, String)> =
			sqlx::query_as("SELECT type, targets FROM aliases WHERE subdomain = ?1")
				.bind(subdomain)
				.fetch_optional(&mut *tx)
				.await
				.map_err(db_err)?;

		match row {
			None => return Err(Error::NotFound),
			Some((typ, _)) if typ != "app" => {
				return Err(Error::Conflict(format!(
					"alias '{}' is not an app alias",
					subdomain
				)));
			}
			Some((_, targets_json)) => targets.push(targets_json),
		}
	}

	let result = sqlx::query(
		"UPDATE aliases
			SET targets = CASE subdomain WHEN ?1 THEN ?4 WHEN ?2 THEN ?3 END,
				updated_at = unixepoch()
			WHERE subdomain IN (?1, ?2)",
	)
	.bind(alias1)
	.bind(alias2)
	.bind(&targets[0])
	.bind(&targets[1])
	.execute(&mut *tx)
	.await
	.map_err(db_err)?;

	if result.rows_affected() != 2 {
		return Err(Error::Conflict("alias disappeared during swap".into()));
	}

	tx.commit().await.map_err(db_err)?;
	Ok(())
}

// vim: ts=4

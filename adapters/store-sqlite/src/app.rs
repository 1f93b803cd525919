//! Application records and fork lineage

use sqlx::{Row, sqlite::SqliteRow, Sqlite, Transaction};

use crate::{db_err, map_res, StoreSqlite};
use fazt_types::meta_adapter::{AppRecord, SourceInfo, UpdateApp, UpsertApp, Visibility};
use fazt_types::prelude::*;
use fazt_types::utils::random_id_len;

pub(crate) fn new_app_id() -> String {
	format!("app_{}", random_id_len(16))
}

pub(crate) fn map_app_row(row: SqliteRow) -> Result<AppRecord, sqlx::Error> {
	let visibility: String = row.try_get("visibility")?;
	let source: String = row.try_get("source")?;
	Ok(AppRecord {
		app_id: row.try_get::<String, _>("app_id")?.into(),
		title: row.try_get::<String, _>("title")?.into(),
		visibility: Visibility::parse(&visibility).unwrap_or(Visibility::Public),
		spa: row.try_get::<i64, _>("spa")? != 0,
		source: serde_json::from_str(&source).unwrap_or(SourceInfo::Deploy),
		original_id: row.try_get::<Option<String>, _>("original_id")?.map(Into::into),
		forked_from_id: row.try_get::<Option<String>, _>("forked_from_id")?.map(Into::into),
		created_at: Timestamp(row.try_get("created_at")?),
		updated_at: Timestamp(row.try_get("updated_at")?),
	})
}

const APP_COLUMNS: &str =
	"app_id, title, visibility, spa, source, original_id, forked_from_id, created_at, updated_at";

pub(crate) async fn read_app(store: &StoreSqlite, app_id: &str) -> FzResult<AppRecord> {
	let row = sqlx::query(&format!("SELECT {APP_COLUMNS} FROM apps WHERE app_id = ?1"))
		.bind(app_id)
		.fetch_one(store.read())
		.await;
	map_res(row, map_app_row)
}

pub(crate) async fn list_apps(store: &StoreSqlite) -> FzResult<Vec<AppRecord>> {
	let rows = sqlx::query(&format!("SELECT {APP_COLUMNS} FROM apps ORDER BY created_at"))
		.fetch_all(store.read())
		.await
		.map_err(db_err)?;
	rows.into_iter().map(|row| map_res(Ok(row), map_app_row)).collect()
}

/// Insert-or-update an application row inside an open writer transaction.
/// Used by both `create_app` and the deploy pipeline's atomic replace.
pub(crate) async fn upsert_app_tx(
	tx: &mut Transaction<'_, Sqlite>,
	data: &UpsertApp<'_>,
) -> FzResult<AppRecord> {
	let source = serde_json::to_string(data.source)?;

	let row = match data.app_id {
		Some(app_id) => sqlx::query(&format!(
			"UPDATE apps SET title = ?2, visibility = ?3, spa = ?4, source = ?5,
					updated_at = unixepoch()
				WHERE app_id = ?1
				RETURNING {APP_COLUMNS}"
		))
		.bind(app_id)
		.bind(data.title)
		.bind(data.visibility.as_str())
		.bind(i64::from(data.spa))
		.bind(&source)
		.fetch_one(&mut **tx)
		.await
		.map_err(db_err)?,
		None => {
			let app_id = new_app_id();
			// A fresh app is its own lineage root unless it is a fork
			let original_id = data.original_id.map(str::to_owned).unwrap_or_else(|| app_id.clone());
			sqlx::query(&format!(
				"INSERT INTO apps (app_id, title, visibility, spa, source, original_id, forked_from_id)
					VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
					RETURNING {APP_COLUMNS}"
			))
			.bind(&app_id)
			.bind(data.title)
			.bind(data.visibility.as_str())
			.bind(i64::from(data.spa))
			.bind(&source)
			.bind(&original_id)
			.bind(data.forked_from_id)
			.fetch_one(&mut **tx)
			.await
			.map_err(db_err)?
		}
	};

	map_res(Ok(row), map_app_row)
}

pub(crate) async fn create_app(store: &StoreSqlite, data: &UpsertApp<'_>) -> FzResult<AppRecord> {
	let mut tx = store.write().begin().await.map_err(db_err)?;
	let app = upsert_app_tx(&mut tx, data).await?;
	tx.commit().await.map_err(db_err)?;
	Ok(app)
}

pub(crate) async fn update_app(
	store: &StoreSqlite,
	app_id: &str,
	data: &UpdateApp,
) -> FzResult<AppRecord> {
	let row = sqlx::query(&format!(
		"UPDATE apps SET
			title = coalesce(?2, title),
			visibility = coalesce(?3, visibility),
			spa = coalesce(?4, spa),
			updated_at = unixepoch()
			WHERE app_id = ?1
			RETURNING {APP_COLUMNS}"
	))
	.bind(app_id)
	.bind(data.title.as_deref())
	.bind(data.visibility.map(|v| v.as_str()))
	.bind(data.spa.map(i64::from))
	.fetch_one(store.write())
	.await;
	map_res(row, map_app_row)
}

/// Delete an application. Without `cascade` the delete is refused while any
/// alias still targets the app; with it, those aliases and the app's VFS
/// site files go too.
pub(crate) async fn delete_app(store: &StoreSqlite, app_id: &str, cascade: bool) -> FzResult<()> {
	let mut tx = store.write().begin().await.map_err(db_err)?;

	let referencing: Vec<String> = sqlx::query_scalar(
		"SELECT subdomain FROM aliases WHERE targets LIKE '%' || ?1 || '%'",
	)
	.bind(app_id)
	.fetch_all(&mut *tx)
	.await
	.map_err(db_err)?;

	// The LIKE is a coarse prefilter; confirm against the parsed targets
	let mut referenced_by: Vec<String> = Vec::new();
	for subdomain in referencing {
		let targets: String =
			sqlx::query_scalar("SELECT targets FROM aliases WHERE subdomain = ?1")
				.bind(&subdomain)
				.fetch_one(&mut *tx)
				.await
				.map_err(db_err)?;
		if crate::alias::target_references_app(&targets, app_id) {
			referenced_by.push(subdomain);
		}
	}

	if !referenced_by.is_empty() {
		if !cascade {
			return Err(Error::Conflict(format!(
				"app is still referenced by aliases: {}",
				referenced_by.join(", ")
			)));
		}
		for subdomain in &referenced_by {
			sqlx::query("DELETE FROM vfs_files WHERE site_id = ?1")
				.bind(subdomain)
				.execute(&mut *tx)
				.await
				.map_err(db_err)?;
			sqlx::query("DELETE FROM aliases WHERE subdomain = ?1")
				.bind(subdomain)
				.execute(&mut *tx)
				.await
				.map_err(db_err)?;
		}
	}

	sqlx::query("DELETE FROM kv_cells WHERE app_id = ?1")
		.bind(app_id)
		.execute(&mut *tx)
		.await
		.map_err(db_err)?;

	let result = sqlx::query("DELETE FROM apps WHERE app_id = ?1")
		.bind(app_id)
		.execute(&mut *tx)
		.await
		.map_err(db_err)?;

	if result.rows_affected() == 0 {
		return Err(Error::NotFound);
	}

	tx.commit().await.map_err(db_err)?;
	Ok(())
}

/// Fork: clone the app row with fresh identity and fork lineage, copy the
/// parent site's files (and optionally KV cells) to the new site, give the
/// fork its alias and record the deployment. One writer transaction.
pub(crate) async fn fork_app(
	store: &StoreSqlite,
	parent_id: &str,
	new_site: &str,
	title: Option<&str>,
	copy_kv: bool,
) -> FzResult<AppRecord> {
	let parent = read_app(store, parent_id).await?;
	let parent_site: Option<String> = sqlx::query_scalar(
		"SELECT site_id FROM deployments WHERE app_id = ?1 ORDER BY deploy_id DESC LIMIT 1",
	)
	.bind(parent_id)
	.fetch_optional(store.read())
	.await
	.map_err(db_err)?;
	let parent_site = parent_site.ok_or(Error::NotFound)?;

	let mut tx = store.write().begin().await.map_err(db_err)?;

	let source = fazt_types::meta_adapter::SourceInfo::Fork { parent_id: parent.app_id.clone() };
	let app = upsert_app_tx(
		&mut tx,
		&UpsertApp {
			app_id: None,
			title: title.unwrap_or(&parent.title),
			visibility: parent.visibility,
			spa: parent.spa,
			source: &source,
			original_id: Some(parent.original_id.as_deref().unwrap_or(&parent.app_id)),
			forked_from_id: Some(&parent.app_id),
		},
	)
	.await?;

	let copied = sqlx::query(
		"INSERT INTO vfs_files (site_id, path, content, size, mime, content_hash)
			SELECT ?2, path, content, size, mime, content_hash
				FROM vfs_files WHERE site_id = ?1",
	)
	.bind(&parent_site)
	.bind(new_site)
	.execute(&mut *tx)
	.await
	.map_err(db_err)?;

	if copy_kv {
		sqlx::query(
			"INSERT INTO kv_cells (app_id, user_id, key, value)
				SELECT ?2, user_id, key, value FROM kv_cells WHERE app_id = ?1",
		)
		.bind(parent_id)
		.bind(app.app_id.as_ref())
		.execute(&mut *tx)
		.await
		.map_err(db_err)?;
	}

	let target = fazt_types::meta_adapter::AliasTarget::App { app_id: app.app_id.clone() };
	sqlx::query(
		"INSERT INTO aliases (subdomain, type, targets) VALUES (?1, 'app', ?2)
			ON CONFLICT(subdomain) DO UPDATE SET
				type = 'app', targets = excluded.targets, updated_at = unixepoch()",
	)
	.bind(new_site)
	.bind(serde_json::to_string(&target)?)
	.execute(&mut *tx)
	.await
	.map_err(db_err)?;

	let total_size: i64 =
		sqlx::query_scalar("SELECT coalesce(sum(size), 0) FROM vfs_files WHERE site_id = ?1")
			.bind(new_site)
			.fetch_one(&mut *tx)
			.await
			.map_err(db_err)?;

	sqlx::query(
		"INSERT INTO deployments (app_id, site_id, source, file_count, total_size)
			VALUES (?1, ?2, ?3, ?4, ?5)",
	)
	.bind(app.app_id.as_ref())
	.bind(new_site)
	.bind(serde_json::to_string(&source)?)
	.bind(i64::try_from(copied.rows_affected()).unwrap_or(0))
	.bind(total_size)
	.execute(&mut *tx)
	.await
	.map_err(db_err)?;

	tx.commit().await.map_err(db_err)?;

	Ok(app)
}

/// Walk the fork-parent chain, nearest parent first. Parents always predate
/// children, so the walk terminates.
pub(crate) async fn read_lineage(store: &StoreSqlite, app_id: &str) -> FzResult<Vec<AppRecord>> {
	let mut chain = Vec::new();
	let mut current = read_app(store, app_id).await?;

	while let Some(parent_id) = current.forked_from_id.clone() {
		match read_app(store, &parent_id).await {
			Ok(parent) => {
				current = parent.clone();
				chain.push(parent);
			}
			// A deleted ancestor ends the chain
			Err(Error::NotFound) => break,
			Err(err) => return Err(err),
		}
	}

	Ok(chain)
}

// vim: ts=4

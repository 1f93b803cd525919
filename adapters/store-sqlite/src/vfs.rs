//! Virtual filesystem rows and the atomic redeploy

use sqlx::{Row, sqlite::SqliteRow};

use crate::{app, db_err, map_res, StoreSqlite};
use fazt_types::meta_adapter::{
	AliasTarget, AppRecord, DeploymentInfo, DeploymentRow, NewVfsFile, SourceInfo, UpsertApp,
	VfsFile, VfsFileMeta,
};
use fazt_types::prelude::*;
use fazt_types::utils::sha256_hex;

fn map_meta_row(row: &SqliteRow) -> Result<VfsFileMeta, sqlx::Error> {
	Ok(VfsFileMeta {
		path: row.try_get::<String, _>("path")?.into(),
		size: row.try_get("size")?,
		mime: row.try_get::<String, _>("mime")?.into(),
		content_hash: row.try_get::<String, _>("content_hash")?.into(),
		updated_at: Timestamp(row.try_get("updated_at")?),
	})
}

pub(crate) async fn read_file(
	store: &StoreSqlite,
	site_id: &str,
	path: &str,
) -> FzResult<VfsFile> {
	let row = sqlx::query(
		"SELECT path, content, size, mime, content_hash, updated_at
			FROM vfs_files WHERE site_id = ?1 AND path = ?2",
	)
	.bind(site_id)
	.bind(path)
	.fetch_one(store.read())
	.await;

	map_res(row, |row| {
		let meta = map_meta_row(&row)?;
		let content: Vec<u8> = row.try_get("content")?;
		Ok(VfsFile { meta, content: content.into() })
	})
}

pub(crate) async fn read_file_meta(
	store: &StoreSqlite,
	site_id: &str,
	path: &str,
) -> FzResult<VfsFileMeta> {
	let row = sqlx::query(
		"SELECT path, size, mime, content_hash, updated_at
			FROM vfs_files WHERE site_id = ?1 AND path = ?2",
	)
	.bind(site_id)
	.bind(path)
	.fetch_one(store.read())
	.await;
	map_res(row, |row| map_meta_row(&row))
}

pub(crate) async fn list_files(store: &StoreSqlite, site_id: &str) -> FzResult<Vec<VfsFileMeta>> {
	let rows = sqlx::query(
		"SELECT path, size, mime, content_hash, updated_at
			FROM vfs_files WHERE site_id = ?1 ORDER BY path",
	)
	.bind(site_id)
	.fetch_all(store.read())
	.await
	.map_err(db_err)?;
	rows.into_iter().map(|row| map_res(Ok(row), |row| map_meta_row(&row))).collect()
}

pub(crate) async fn write_file(
	store: &StoreSqlite,
	site_id: &str,
	file: &NewVfsFile,
) -> FzResult<VfsFileMeta> {
	let content_hash = sha256_hex(&file.content);
	let size = i64::try_from(file.content.len()).unwrap_or(i64::MAX);

	let row = sqlx::query(
		"INSERT INTO vfs_files (site_id, path, content, size, mime, content_hash)
			VALUES (?1, ?2, ?3, ?4, ?5, ?6)
			ON CONFLICT(site_id, path) DO UPDATE SET
				content = excluded.content, size = excluded.size, mime = excluded.mime,
				content_hash = excluded.content_hash, updated_at = unixepoch()
			RETURNING path, size, mime, content_hash, updated_at",
	)
	.bind(site_id)
	.bind(file.path.as_ref())
	.bind(&file.content)
	.bind(size)
	.bind(file.mime.as_ref())
	.bind(&content_hash)
	.fetch_one(store.write())
	.await;

	map_res(row, |row| map_meta_row(&row))
}

pub(crate) async fn delete_file(store: &StoreSqlite, site_id: &str, path: &str) -> FzResult<()> {
	let result = sqlx::query("DELETE FROM vfs_files WHERE site_id = ?1 AND path = ?2")
		.bind(site_id)
		.bind(path)
		.execute(store.write())
		.await
		.map_err(db_err)?;

	if result.rows_affected() == 0 {
		return Err(Error::NotFound);
	}
	Ok(())
}

/// Atomic redeploy. One writer transaction: replace the site's file set,
/// upsert the application row, point the site's alias at it and record the
/// deployment. Readers either see the full old set or the full new set.
pub(crate) async fn replace_site(
	store: &StoreSqlite,
	app_data: &UpsertApp<'_>,
	files: &[NewVfsFile],
	deployment: &DeploymentInfo<'_>,
) -> FzResult<AppRecord> {
	let mut tx = store.write().begin().await.map_err(db_err)?;

	let app = app::upsert_app_tx(&mut tx, app_data).await?;

	sqlx::query("DELETE FROM vfs_files WHERE site_id = ?1")
		.bind(deployment.site_id)
		.execute(&mut *tx)
		.await
		.map_err(db_err)?;

	for file in files {
		let content_hash = sha256_hex(&file.content);
		let size = i64::try_from(file.content.len()).unwrap_or(i64::MAX);
		sqlx::query(
			"INSERT INTO vfs_files (site_id, path, content, size, mime, content_hash)
				VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
		)
		.bind(deployment.site_id)
		.bind(file.path.as_ref())
		.bind(&file.content)
		.bind(size)
		.bind(file.mime.as_ref())
		.bind(&content_hash)
		.execute(&mut *tx)
		.await
		.map_err(db_err)?;
	}

	let target = AliasTarget::App { app_id: app.app_id.clone() };
	let targets = serde_json::to_string(&target)?;
	sqlx::query(
		"INSERT INTO aliases (subdomain, type, targets) VALUES (?1, 'app', ?2)
			ON CONFLICT(subdomain) DO UPDATE SET
				type = 'app', targets = excluded.targets, updated_at = unixepoch()",
	)
	.bind(deployment.site_id)
	.bind(&targets)
	.execute(&mut *tx)
	.await
	.map_err(db_err)?;

	let source = serde_json::to_string(deployment.source)?;
	sqlx::query(
		"INSERT INTO deployments (app_id, site_id, source, file_count, total_size)
			VALUES (?1, ?2, ?3, ?4, ?5)",
	)
	.bind(app.app_id.as_ref())
	.bind(deployment.site_id)
	.bind(&source)
	.bind(i64::from(deployment.file_count))
	.bind(deployment.total_size)
	.execute(&mut *tx)
	.await
	.map_err(db_err)?;

	tx.commit().await.map_err(db_err)?;

	Ok(app)
}

pub(crate) async fn copy_site_files(
	store: &StoreSqlite,
	from_site: &str,
	to_site: &str,
) -> FzResult<u32> {
	let result = sqlx::query(
		"INSERT INTO vfs_files (site_id, path, content, size, mime, content_hash)
			SELECT ?2, path, content, size, mime, content_hash
				FROM vfs_files WHERE site_id = ?1",
	)
	.bind(from_site)
	.bind(to_site)
	.execute(store.write())
	.await
	.map_err(db_err)?;
	Ok(u32::try_from(result.rows_affected()).unwrap_or_default())
}

pub(crate) async fn read_app_site(store: &StoreSqlite, app_id: &str) -> FzResult<Box<str>> {
	let site_id: Option<String> = sqlx::query_scalar(
		"SELECT site_id FROM deployments WHERE app_id = ?1 ORDER BY deploy_id DESC LIMIT 1",
	)
	.bind(app_id)
	.fetch_optional(store.read())
	.await
	.map_err(db_err)?;

	site_id.map(Into::into).ok_or(Error::NotFound)
}

pub(crate) async fn list_deployments(
	store: &StoreSqlite,
	app_id: &str,
) -> FzResult<Vec<DeploymentRow>> {
	let rows = sqlx::query(
		"SELECT deploy_id, app_id, site_id, source, file_count, total_size, created_at
			FROM deployments WHERE app_id = ?1 ORDER BY deploy_id DESC",
	)
	.bind(app_id)
	.fetch_all(store.read())
	.await
	.map_err(db_err)?;

	rows.into_iter()
		.map(|row| {
			map_res(Ok(row), |row| {
				let source: String = row.try_get("source")?;
				Ok(DeploymentRow {
					deploy_id: row.try_get("deploy_id")?,
					app_id: row.try_get::<String, _>("app_id")?.into(),
					site_id: row.try_get::<String, _>("site_id")?.into(),
					source: serde_json::from_str(&source).unwrap_or(SourceInfo::Deploy),
					file_count: row.try_get::<i64, _>("file_count")?.try_into().unwrap_or(0),
					total_size: row.try_get("total_size")?,
					created_at: Timestamp(row.try_get("created_at")?),
				})
			})
		})
		.collect()
}

// vim: ts=4

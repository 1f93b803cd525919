//! TLS certificate material and installation variables

use sqlx::{Row, sqlite::SqliteRow};

use crate::{db_err, map_res, StoreSqlite};
use fazt_types::auth_adapter::CertData;
use fazt_types::prelude::*;

fn map_cert_row(row: SqliteRow) -> Result<CertData, sqlx::Error> {
	Ok(CertData {
		domain: row.try_get::<String, _>("domain")?.into(),
		cert: row.try_get::<String, _>("cert")?.into(),
		key: row.try_get::<String, _>("key")?.into(),
		expires_at: Timestamp(row.try_get("expires_at")?),
	})
}

pub(crate) async fn create_cert(store: &StoreSqlite, data: &CertData) -> FzResult<()> {
	sqlx::query(
		"INSERT INTO certs (domain, cert, key, expires_at) VALUES (?1, ?2, ?3, ?4)
			ON CONFLICT(domain) DO UPDATE SET
				cert = excluded.cert, key = excluded.key, expires_at = excluded.expires_at",
	)
	.bind(data.domain.as_ref())
	.bind(data.cert.as_ref())
	.bind(data.key.as_ref())
	.bind(data.expires_at.0)
	.execute(store.write())
	.await
	.map_err(db_err)?;
	Ok(())
}

pub(crate) async fn read_cert_by_domain(store: &StoreSqlite, domain: &str) -> FzResult<CertData> {
	let row = sqlx::query("SELECT domain, cert, key, expires_at FROM certs WHERE domain = ?1")
		.bind(domain)
		.fetch_one(store.read())
		.await;
	map_res(row, map_cert_row)
}

pub(crate) async fn list_certs(store: &StoreSqlite) -> FzResult<Vec<CertData>> {
	let rows = sqlx::query("SELECT domain, cert, key, expires_at FROM certs")
		.fetch_all(store.read())
		.await
		.map_err(db_err)?;
	rows.into_iter().map(|row| map_res(Ok(row), map_cert_row)).collect()
}

pub(crate) async fn read_var(store: &StoreSqlite, key: &str) -> FzResult<Box<str>> {
	let value: Option<String> = sqlx::query_scalar("SELECT value FROM vars WHERE key = ?1")
		.bind(key)
		.fetch_optional(store.read())
		.await
		.map_err(db_err)?;
	value.map(Into::into).ok_or(Error::NotFound)
}

pub(crate) async fn write_var(store: &StoreSqlite, key: &str, value: &str) -> FzResult<()> {
	sqlx::query(
		"INSERT INTO vars (key, value) VALUES (?1, ?2)
			ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = unixepoch()",
	)
	.bind(key)
	.bind(value)
	.execute(store.write())
	.await
	.map_err(db_err)?;
	Ok(())
}

// vim: ts=4

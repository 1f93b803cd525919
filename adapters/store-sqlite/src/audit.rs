//! Audit event ledger

use sqlx::{Row, sqlite::SqliteRow};

use crate::{db_err, map_res, StoreSqlite};
use fazt_types::auth_adapter::{AuditEvent, AuditEventRow};
use fazt_types::meta_adapter::PageView;
use fazt_types::prelude::*;

fn map_audit_row(row: SqliteRow) -> Result<AuditEventRow, sqlx::Error> {
	let detail: Option<String> = row.try_get("detail")?;
	Ok(AuditEventRow {
		ev_id: row.try_get("ev_id")?,
		actor: row.try_get::<Option<String>, _>("actor")?.map(Into::into),
		action: row.try_get::<String, _>("action")?.into(),
		weight: row.try_get::<i64, _>("weight")?.try_into().unwrap_or(0),
		detail: detail.and_then(|d| serde_json::from_str(&d).ok()),
		created_at: Timestamp(row.try_get("created_at")?),
	})
}

pub(crate) async fn create_audit_event(
	store: &StoreSqlite,
	ev: &AuditEvent<'_>,
) -> FzResult<()> {
	let detail = match &ev.detail {
		Some(value) => Some(serde_json::to_string(value)?),
		None => None,
	};

	sqlx::query("INSERT INTO audit_events (actor, action, weight, detail) VALUES (?1, ?2, ?3, ?4)")
		.bind(ev.actor)
		.bind(ev.action)
		.bind(i64::from(ev.weight.min(9)))
		.bind(detail)
		.execute(store.write())
		.await
		.map_err(db_err)?;

	Ok(())
}

pub(crate) async fn list_audit_events(
	store: &StoreSqlite,
	limit: u32,
) -> FzResult<Vec<AuditEventRow>> {
	let rows = sqlx::query(
		"SELECT ev_id, actor, action, weight, detail, created_at
			FROM audit_events ORDER BY ev_id DESC LIMIT ?1",
	)
	.bind(i64::from(limit))
	.fetch_all(store.read())
	.await
	.map_err(db_err)?;
	rows.into_iter().map(|row| map_res(Ok(row), map_audit_row)).collect()
}

/// Flush a batch of page-view beacons in one transaction
pub(crate) async fn record_page_views(store: &StoreSqlite, views: &[PageView]) -> FzResult<()> {
	if views.is_empty() {
		return Ok(());
	}

	let mut tx = store.write().begin().await.map_err(db_err)?;
	for view in views {
		sqlx::query(
			"INSERT INTO page_views (site, path, referrer, created_at) VALUES (?1, ?2, ?3, ?4)",
		)
		.bind(view.site.as_ref())
		.bind(view.path.as_ref())
		.bind(view.referrer.as_deref())
		.bind(view.created_at.0)
		.execute(&mut *tx)
		.await
		.map_err(db_err)?;
	}
	tx.commit().await.map_err(db_err)?;

	Ok(())
}

// vim: ts=4

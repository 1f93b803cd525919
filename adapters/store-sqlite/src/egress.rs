//! Egress allowlist rules

use sqlx::{Row, sqlite::SqliteRow};

use crate::{db_err, map_res, StoreSqlite};
use fazt_types::meta_adapter::{CreateEgressRule, EgressRule, EgressSecret, EgressSecretKind};
use fazt_types::prelude::*;

fn parse_secret_kind(s: &str) -> Option<EgressSecretKind> {
	match s {
		"bearer" => Some(EgressSecretKind::Bearer),
		"header" => Some(EgressSecretKind::Header),
		"query" => Some(EgressSecretKind::Query),
		_ => None,
	}
}

fn secret_kind_str(kind: EgressSecretKind) -> &'static str {
	match kind {
		EgressSecretKind::Bearer => "bearer",
		EgressSecretKind::Header => "header",
		EgressSecretKind::Query => "query",
	}
}

fn map_rule_row(row: SqliteRow) -> Result<EgressRule, sqlx::Error> {
	let secret_kind: Option<String> = row.try_get("secret_kind")?;
	let secret_name: Option<String> = row.try_get("secret_name")?;
	let secret_value: Option<String> = row.try_get("secret_value")?;

	let secret = match (secret_kind.as_deref().and_then(parse_secret_kind), secret_value) {
		(Some(kind), Some(value)) => Some(EgressSecret {
			kind,
			name: secret_name.unwrap_or_default().into(),
			value: value.into(),
		}),
		_ => None,
	};

	Ok(EgressRule {
		rule_id: row.try_get("rule_id")?,
		domain: row.try_get::<String, _>("domain")?.into(),
		app_id: row.try_get::<Option<String>, _>("app_id")?.map(Into::into),
		allow_http: row.try_get::<i64, _>("allow_http")? != 0,
		rate_per_min: row.try_get::<Option<i64>, _>("rate_per_min")?.and_then(|v| v.try_into().ok()),
		burst: row.try_get::<Option<i64>, _>("burst")?.and_then(|v| v.try_into().ok()),
		timeout_ms: row.try_get::<Option<i64>, _>("timeout_ms")?.and_then(|v| v.try_into().ok()),
		max_response_bytes: row
			.try_get::<Option<i64>, _>("max_response_bytes")?
			.and_then(|v| v.try_into().ok()),
		cache_ttl_secs: row
			.try_get::<Option<i64>, _>("cache_ttl_secs")?
			.and_then(|v| v.try_into().ok()),
		secret,
		created_at: Timestamp(row.try_get("created_at")?),
	})
}

const RULE_COLUMNS: &str = "rule_id, domain, app_id, allow_http, rate_per_min, burst, timeout_ms,
	max_response_bytes, cache_ttl_secs, secret_kind, secret_name, secret_value, created_at";

pub(crate) async fn list_egress_rules(store: &StoreSqlite) -> FzResult<Vec<EgressRule>> {
	let rows = sqlx::query(&format!("SELECT {RULE_COLUMNS} FROM egress_rules ORDER BY rule_id"))
		.fetch_all(store.read())
		.await
		.map_err(db_err)?;
	rows.into_iter().map(|row| map_res(Ok(row), map_rule_row)).collect()
}

pub(crate) async fn create_egress_rule(
	store: &StoreSqlite,
	data: &CreateEgressRule<'_>,
) -> FzResult<EgressRule> {
	if data.domain.is_empty() {
		return Err(Error::ValidationError("domain is required".into()));
	}

	let row = sqlx::query(&format!(
		"INSERT INTO egress_rules (domain, app_id, allow_http, rate_per_min, burst, timeout_ms,
				max_response_bytes, cache_ttl_secs, secret_kind, secret_name, secret_value)
			VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
			RETURNING {RULE_COLUMNS}"
	))
	.bind(data.domain)
	.bind(data.app_id)
	.bind(i64::from(data.allow_http))
	.bind(data.rate_per_min.map(i64::from))
	.bind(data.burst.map(i64::from))
	.bind(data.timeout_ms.map(i64::from))
	.bind(data.max_response_bytes.and_then(|v| i64::try_from(v).ok()))
	.bind(data.cache_ttl_secs.map(i64::from))
	.bind(data.secret.as_ref().map(|s| secret_kind_str(s.kind)))
	.bind(data.secret.as_ref().map(|s| s.name.as_ref()))
	.bind(data.secret.as_ref().map(|s| s.value.as_ref()))
	.fetch_one(store.write())
	.await
	.map_err(db_err)?;

	map_res(Ok(row), map_rule_row)
}

pub(crate) async fn delete_egress_rule(store: &StoreSqlite, rule_id: i64) -> FzResult<()> {
	let result = sqlx::query("DELETE FROM egress_rules WHERE rule_id = ?1")
		.bind(rule_id)
		.execute(store.write())
		.await
		.map_err(db_err)?;

	if result.rows_affected() == 0 {
		return Err(Error::NotFound);
	}
	Ok(())
}

// vim: ts=4

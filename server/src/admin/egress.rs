//! Egress allowlist administration

use axum::{
	extract::{Path, State},
	http::StatusCode,
	response::{IntoResponse, Response},
	Json,
};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::admin::audit;
use crate::core::extract::Auth;
use crate::prelude::*;
use fazt_types::meta_adapter::{CreateEgressRule, EgressRule, EgressSecret, EgressSecretKind};

/// Listing shape; secret values never leave the substrate
#[skip_serializing_none]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EgressRuleView {
	pub rule_id: i64,
	pub domain: Box<str>,
	pub app_id: Option<Box<str>>,
	pub allow_http: bool,
	pub rate_per_min: Option<u32>,
	pub burst: Option<u32>,
	pub timeout_ms: Option<u32>,
	pub max_response_bytes: Option<u64>,
	pub cache_ttl_secs: Option<u32>,
	pub has_secret: bool,
	pub created_at: Timestamp,
}

impl From<EgressRule> for EgressRuleView {
	fn from(rule: EgressRule) -> Self {
		EgressRuleView {
			rule_id: rule.rule_id,
			domain: rule.domain,
			app_id: rule.app_id,
			allow_http: rule.allow_http,
			rate_per_min: rule.rate_per_min,
			burst: rule.burst,
			timeout_ms: rule.timeout_ms,
			max_response_bytes: rule.max_response_bytes,
			cache_ttl_secs: rule.cache_ttl_secs,
			has_secret: rule.secret.is_some(),
			created_at: rule.created_at,
		}
	}
}

/// GET /api/egress
pub async fn list_rules(State(app): State<App>) -> FzResult<Json<serde_json::Value>> {
	let rules: Vec<EgressRuleView> =
		app.meta_adapter.list_egress_rules().await?.into_iter().map(Into::into).collect();
	Ok(Json(serde_json::json!({ "data": rules })))
}

#[derive(Debug, Deserialize)]
pub struct SecretRequest {
	pub kind: EgressSecretKind,
	#[serde(default)]
	pub name: String,
	pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct EgressRuleRequest {
	pub domain: String,
	pub app_id: Option<String>,
	#[serde(default)]
	pub allow_http: bool,
	pub rate_per_min: Option<u32>,
	pub burst: Option<u32>,
	pub timeout_ms: Option<u32>,
	pub max_response_bytes: Option<u64>,
	pub cache_ttl_secs: Option<u32>,
	pub secret: Option<SecretRequest>,
}

/// POST /api/egress
pub async fn create_rule(
	State(app): State<App>,
	Auth(auth): Auth,
	Json(req): Json<EgressRuleRequest>,
) -> FzResult<Response> {
	let secret = req.secret.map(|s| EgressSecret {
		kind: s.kind,
		name: s.name.into(),
		value: s.value.into(),
	});

	let rule = app
		.meta_adapter
		.create_egress_rule(&CreateEgressRule {
			domain: &req.domain,
			app_id: req.app_id.as_deref(),
			allow_http: req.allow_http,
			rate_per_min: req.rate_per_min,
			burst: req.burst,
			timeout_ms: req.timeout_ms,
			max_response_bytes: req.max_response_bytes,
			cache_ttl_secs: req.cache_ttl_secs,
			secret,
		})
		.await?;

	audit(
		&app,
		Some(&auth),
		"egress.create",
		8,
		serde_json::json!({"ruleId": rule.rule_id, "domain": rule.domain, "appId": rule.app_id}),
	)
	.await;

	let view: EgressRuleView = rule.into();
	Ok((StatusCode::CREATED, Json(serde_json::json!({ "data": view }))).into_response())
}

/// DELETE /api/egress/{id}
pub async fn delete_rule(
	State(app): State<App>,
	Auth(auth): Auth,
	Path(rule_id): Path<i64>,
) -> FzResult<StatusCode> {
	app.meta_adapter.delete_egress_rule(rule_id).await?;
	audit(&app, Some(&auth), "egress.delete", 7, serde_json::json!({"ruleId": rule_id})).await;
	Ok(StatusCode::NO_CONTENT)
}

// vim: ts=4

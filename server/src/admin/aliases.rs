//! Alias management endpoints

use axum::{
	extract::{Path, State},
	http::StatusCode,
	response::{IntoResponse, Response},
	Json,
};
use serde::Deserialize;

use crate::admin::audit;
use crate::core::extract::Auth;
use crate::deploy::archive::validate_site_name;
use crate::prelude::*;
use fazt_types::meta_adapter::{AliasTarget, SplitTarget};
use fazt_types::types::ApiResponse;

#[derive(Debug, Deserialize)]
pub struct AliasRequest {
	pub subdomain: Option<String>,
	#[serde(rename = "type")]
	pub alias_type: String,
	pub app_id: Option<String>,
	pub url: Option<String>,
	pub targets: Option<Vec<SplitTarget>>,
}

impl AliasRequest {
	fn into_target(self) -> FzResult<AliasTarget> {
		let target = match self.alias_type.as_str() {
			"app" => AliasTarget::App {
				app_id: self
					.app_id
					.ok_or_else(|| Error::ValidationError("app alias requires app_id".into()))?
					.into(),
			},
			"redirect" => AliasTarget::Redirect {
				url: self
					.url
					.ok_or_else(|| Error::ValidationError("redirect alias requires url".into()))?
					.into(),
			},
			"reserved" => AliasTarget::Reserved,
			"split" => AliasTarget::Split {
				targets: self
					.targets
					.ok_or_else(|| Error::ValidationError("split alias requires targets".into()))?,
			},
			other => {
				return Err(Error::ValidationError(format!("unknown alias type '{}'", other)));
			}
		};
		target.validate()?;
		Ok(target)
	}
}

/// Targets of `app` and `split` aliases must name existing applications
async fn validate_targets(app: &App, target: &AliasTarget) -> FzResult<()> {
	match target {
		AliasTarget::App { app_id } => {
			app.meta_adapter
				.read_app(app_id)
				.await
				.map_err(|_| Error::ValidationError(format!("unknown app '{}'", app_id)))?;
		}
		AliasTarget::Split { targets } => {
			for split_target in targets {
				app.meta_adapter.read_app(&split_target.app_id).await.map_err(|_| {
					Error::ValidationError(format!("unknown app '{}'", split_target.app_id))
				})?;
			}
		}
		_ => {}
	}
	Ok(())
}

/// GET /api/aliases
pub async fn list_aliases(State(app): State<App>) -> FzResult<Json<serde_json::Value>> {
	let aliases = app.meta_adapter.list_aliases().await?;
	Ok(Json(serde_json::json!({ "data": aliases })))
}

/// POST /api/aliases
pub async fn create_alias(
	State(app): State<App>,
	Auth(auth): Auth,
	Json(req): Json<AliasRequest>,
) -> FzResult<Response> {
	let subdomain = req
		.subdomain
		.clone()
		.ok_or_else(|| Error::ValidationError("subdomain is required".into()))?;
	validate_site_name(&subdomain)?;

	if app.meta_adapter.read_alias(&subdomain).await.is_ok() {
		return Err(Error::Conflict(format!("alias '{}' already exists", subdomain)));
	}

	let target = req.into_target()?;
	validate_targets(&app, &target).await?;
	let record = app.meta_adapter.upsert_alias(&subdomain, &target).await?;

	audit(
		&app,
		Some(&auth),
		"alias.create",
		4,
		serde_json::json!({"subdomain": subdomain, "type": target.type_name()}),
	)
	.await;

	Ok((StatusCode::CREATED, Json(ApiResponse::new(record))).into_response())
}

/// GET /api/aliases/{subdomain}
pub async fn get_alias(
	State(app): State<App>,
	Path(subdomain): Path<String>,
) -> FzResult<Json<serde_json::Value>> {
	let record = app.meta_adapter.read_alias(&subdomain).await?;
	Ok(Json(serde_json::json!({ "data": record })))
}

/// PUT /api/aliases/{subdomain}
pub async fn update_alias(
	State(app): State<App>,
	Auth(auth): Auth,
	Path(subdomain): Path<String>,
	Json(req): Json<AliasRequest>,
) -> FzResult<Json<serde_json::Value>> {
	let target = req.into_target()?;
	validate_targets(&app, &target).await?;
	let record = app.meta_adapter.upsert_alias(&subdomain, &target).await?;

	audit(
		&app,
		Some(&auth),
		"alias.update",
		4,
		serde_json::json!({"subdomain": subdomain, "type": target.type_name()}),
	)
	.await;

	Ok(Json(serde_json::json!({ "data": record })))
}

/// DELETE /api/aliases/{subdomain}
pub async fn delete_alias(
	State(app): State<App>,
	Auth(auth): Auth,
	Path(subdomain): Path<String>,
) -> FzResult<StatusCode> {
	app.meta_adapter.delete_alias(&subdomain).await?;
	audit(&app, Some(&auth), "alias.delete", 5, serde_json::json!({"subdomain": subdomain})).await;
	Ok(StatusCode::NO_CONTENT)
}

/// POST /api/aliases/{subdomain}/reserve
pub async fn reserve_alias(
	State(app): State<App>,
	Auth(auth): Auth,
	Path(subdomain): Path<String>,
) -> FzResult<Response> {
	validate_site_name(&subdomain)?;
	let record = app.meta_adapter.upsert_alias(&subdomain, &AliasTarget::Reserved).await?;
	audit(&app, Some(&auth), "alias.reserve", 4, serde_json::json!({"subdomain": subdomain})).await;
	Ok((StatusCode::CREATED, Json(ApiResponse::new(record))).into_response())
}

#[derive(Debug, Deserialize)]
pub struct SplitRequest {
	pub targets: Vec<SplitTarget>,
}

/// POST /api/aliases/{subdomain}/split
pub async fn split_alias(
	State(app): State<App>,
	Auth(auth): Auth,
	Path(subdomain): Path<String>,
	Json(req): Json<SplitRequest>,
) -> FzResult<Json<serde_json::Value>> {
	let target = AliasTarget::Split { targets: req.targets };
	target.validate()?;
	validate_targets(&app, &target).await?;

	let record = app.meta_adapter.upsert_alias(&subdomain, &target).await?;

	audit(&app, Some(&auth), "alias.split", 5, serde_json::json!({"subdomain": subdomain})).await;

	Ok(Json(serde_json::json!({ "data": record })))
}

#[derive(Debug, Deserialize)]
pub struct SwapRequest {
	pub alias1: String,
	pub alias2: String,
}

/// POST /api/aliases/swap - atomic exchange of two app aliases
pub async fn swap_aliases(
	State(app): State<App>,
	Auth(auth): Auth,
	Json(req): Json<SwapRequest>,
) -> FzResult<Json<serde_json::Value>> {
	app.meta_adapter.swap_aliases(&req.alias1, &req.alias2).await?;

	audit(
		&app,
		Some(&auth),
		"alias.swap",
		6,
		serde_json::json!({"alias1": req.alias1, "alias2": req.alias2}),
	)
	.await;

	Ok(Json(serde_json::json!({
		"data": { "swapped": [req.alias1, req.alias2] }
	})))
}

// vim: ts=4

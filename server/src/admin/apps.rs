//! Application management endpoints

use axum::{
	extract::{Path, Query, State},
	http::{header, StatusCode},
	response::{IntoResponse, Response},
	Json,
};
use serde::Deserialize;

use crate::admin::audit;
use crate::core::extract::Auth;
use crate::deploy::archive::validate_site_name;
use crate::prelude::*;
use fazt_types::meta_adapter::{SourceInfo, UpdateApp, UpsertApp, Visibility};
use fazt_types::types::ApiResponse;

/// GET /api/apps
pub async fn list_apps(State(app): State<App>) -> FzResult<Json<serde_json::Value>> {
	let apps = app.meta_adapter.list_apps().await?;
	Ok(Json(serde_json::json!({ "data": apps })))
}

#[derive(Debug, Deserialize)]
pub struct CreateAppRequest {
	pub title: String,
	pub visibility: Option<Visibility>,
	#[serde(default)]
	pub spa: bool,
}

/// POST /api/apps - an empty application shell (files arrive via deploy)
pub async fn create_app(
	State(app): State<App>,
	Auth(auth): Auth,
	Json(req): Json<CreateAppRequest>,
) -> FzResult<Response> {
	let record = app
		.meta_adapter
		.create_app(&UpsertApp {
			app_id: None,
			title: &req.title,
			visibility: req.visibility.unwrap_or(Visibility::Public),
			spa: req.spa,
			source: &SourceInfo::Deploy,
			original_id: None,
			forked_from_id: None,
		})
		.await?;

	audit(&app, Some(&auth), "app.create", 4, serde_json::json!({"appId": record.app_id})).await;

	Ok((StatusCode::CREATED, Json(ApiResponse::new(record))).into_response())
}

/// GET /api/apps/{id}
pub async fn get_app(
	State(app): State<App>,
	Path(app_id): Path<String>,
) -> FzResult<Json<serde_json::Value>> {
	let record = app.meta_adapter.read_app(&app_id).await?;
	Ok(Json(serde_json::json!({ "data": record })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateAppRequest {
	pub title: Option<String>,
	pub visibility: Option<Visibility>,
	pub spa: Option<bool>,
}

/// PUT /api/apps/{id}
pub async fn update_app(
	State(app): State<App>,
	Auth(auth): Auth,
	Path(app_id): Path<String>,
	Json(req): Json<UpdateAppRequest>,
) -> FzResult<Json<serde_json::Value>> {
	let record = app
		.meta_adapter
		.update_app(
			&app_id,
			&UpdateApp {
				title: req.title.map(Into::into),
				visibility: req.visibility,
				spa: req.spa,
			},
		)
		.await?;

	audit(&app, Some(&auth), "app.update", 4, serde_json::json!({"appId": app_id})).await;

	Ok(Json(serde_json::json!({ "data": record })))
}

#[derive(Debug, Deserialize)]
pub struct DeleteAppQuery {
	#[serde(default)]
	pub cascade: bool,
}

/// DELETE /api/apps/{id}
pub async fn delete_app(
	State(app): State<App>,
	Auth(auth): Auth,
	Path(app_id): Path<String>,
	Query(query): Query<DeleteAppQuery>,
) -> FzResult<StatusCode> {
	app.meta_adapter.delete_app(&app_id, query.cascade).await?;

	audit(
		&app,
		Some(&auth),
		"app.delete",
		6,
		serde_json::json!({"appId": app_id, "cascade": query.cascade}),
	)
	.await;

	Ok(StatusCode::NO_CONTENT)
}

/// GET /api/apps/{id}/files
pub async fn list_app_files(
	State(app): State<App>,
	Path(app_id): Path<String>,
) -> FzResult<Json<serde_json::Value>> {
	let site_id = app.meta_adapter.read_app_site(&app_id).await?;
	let files = app.meta_adapter.list_files(&site_id).await?;
	Ok(Json(serde_json::json!({ "data": { "siteId": site_id, "files": files } })))
}

/// GET /api/apps/{id}/files/{path...}
pub async fn get_app_file(
	State(app): State<App>,
	Path((app_id, file_path)): Path<(String, String)>,
) -> FzResult<Response> {
	let site_id = app.meta_adapter.read_app_site(&app_id).await?;
	let file = app.meta_adapter.read_file(&site_id, &file_path).await?;

	Ok((
		StatusCode::OK,
		[
			(header::CONTENT_TYPE, file.meta.mime.to_string()),
			(header::ETAG, format!("\"{}\"", file.meta.content_hash)),
		],
		Vec::from(file.content),
	)
		.into_response())
}

#[derive(Debug, Deserialize)]
pub struct ForkRequest {
	/// Subdomain (and site id) for the fork
	pub site_name: String,
	pub title: Option<String>,
	#[serde(default)]
	pub copy_storage: bool,
}

/// POST /api/apps/{id}/fork
pub async fn fork_app(
	State(app): State<App>,
	Auth(auth): Auth,
	Path(app_id): Path<String>,
	Json(req): Json<ForkRequest>,
) -> FzResult<Response> {
	validate_site_name(&req.site_name)?;

	if app.meta_adapter.read_alias(&req.site_name).await.is_ok() {
		return Err(Error::Conflict(format!("'{}' is already taken", req.site_name)));
	}

	let record = app
		.meta_adapter
		.fork_app(&app_id, &req.site_name, req.title.as_deref(), req.copy_storage)
		.await?;

	audit(
		&app,
		Some(&auth),
		"app.fork",
		5,
		serde_json::json!({"parentId": app_id, "appId": record.app_id, "site": req.site_name}),
	)
	.await;

	Ok((StatusCode::CREATED, Json(ApiResponse::new(record))).into_response())
}

/// GET /api/apps/{id}/lineage
pub async fn get_lineage(
	State(app): State<App>,
	Path(app_id): Path<String>,
) -> FzResult<Json<serde_json::Value>> {
	let record = app.meta_adapter.read_app(&app_id).await?;
	let ancestors = app.meta_adapter.read_lineage(&app_id).await?;
	Ok(Json(serde_json::json!({
		"data": { "app": record, "ancestors": ancestors }
	})))
}

/// GET /api/apps/{id}/deployments
pub async fn list_deployments(
	State(app): State<App>,
	Path(app_id): Path<String>,
) -> FzResult<Json<serde_json::Value>> {
	let deployments = app.meta_adapter.list_deployments(&app_id).await?;
	Ok(Json(serde_json::json!({ "data": deployments })))
}

// vim: ts=4

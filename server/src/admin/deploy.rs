//! Deploy upload endpoint

use axum::{
	extract::{Multipart, State},
	http::StatusCode,
	response::{IntoResponse, Response},
	Json,
};

use crate::core::extract::Auth;
use crate::deploy::{deploy_site, DeployParams};
use crate::prelude::*;
use fazt_types::meta_adapter::SourceInfo;
use fazt_types::types::ApiResponse;

/// Uploads are capped well above the decompressed archive bounds
const MAX_UPLOAD: usize = 64 * 1024 * 1024;

/// POST /api/deploy - multipart: `site_name` field + `file` ZIP.
/// Requires a session or an API key carrying the deploy scope.
pub async fn post_deploy(
	State(app): State<App>,
	Auth(auth): Auth,
	mut multipart: Multipart,
) -> FzResult<Response> {
	if !auth.has_scope("deploy") {
		return Err(Error::PermissionDenied);
	}

	let mut site_name = String::new();
	let mut archive: Option<Vec<u8>> = None;
	let mut git = (None, None, None);

	while let Some(field) = multipart
		.next_field()
		.await
		.map_err(|_| Error::ValidationError("malformed multipart body".into()))?
	{
		let name = field.name().map(str::to_owned);
		match name.as_deref() {
			Some("site_name") => {
				site_name = field
					.text()
					.await
					.map_err(|_| Error::ValidationError("invalid site_name field".into()))?;
			}
			Some("file") => {
				let bytes = field
					.bytes()
					.await
					.map_err(|_| Error::ValidationError("invalid file field".into()))?;
				if bytes.len() > MAX_UPLOAD {
					return Err(Error::ValidationError("upload exceeds the size limit".into()));
				}
				archive = Some(bytes.to_vec());
			}
			// Optional git provenance, recorded with the deployment so a
			// later upgrade can re-resolve the same source
			Some("git_url") => {
				git.0 = Some(field.text().await.map_err(|_| bad_field("git_url"))?);
			}
			Some("git_ref") => {
				git.1 = Some(field.text().await.map_err(|_| bad_field("git_ref"))?);
			}
			Some("git_commit") => {
				git.2 = Some(field.text().await.map_err(|_| bad_field("git_commit"))?);
			}
			_ => {}
		}
	}

	let archive =
		archive.ok_or_else(|| Error::ValidationError("missing 'file' field".into()))?;

	let source = match git {
		(Some(url), git_ref, commit) => SourceInfo::Git {
			url: url.into(),
			git_ref: git_ref.unwrap_or_else(|| "main".to_string()).into(),
			commit: commit.unwrap_or_default().into(),
		},
		_ => SourceInfo::Deploy,
	};

	let record = deploy_site(
		&app,
		DeployParams { site_name: &site_name, source, actor: Some(&auth.user_id) },
		&archive,
	)
	.await?;

	Ok((StatusCode::CREATED, Json(ApiResponse::new(record))).into_response())
}

fn bad_field(name: &str) -> Error {
	Error::ValidationError(format!("invalid {} field", name))
}

// vim: ts=4

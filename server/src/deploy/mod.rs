//! Deploy pipeline: validated archive → atomic site replace

pub mod archive;

use crate::prelude::*;
use archive::{extract_archive, validate_site_name};
use fazt_types::auth_adapter::AuditEvent;
use fazt_types::meta_adapter::{AliasTarget, AppRecord, DeploymentInfo, SourceInfo, UpsertApp, Visibility};

pub struct DeployParams<'a> {
	pub site_name: &'a str,
	pub source: SourceInfo,
	pub actor: Option<&'a str>,
}

/// Deploy an uploaded archive to a site. All validation happens first;
/// the replace itself is one writer transaction in the substrate.
pub async fn deploy_site(
	app_state: &App,
	params: DeployParams<'_>,
	zip_bytes: &[u8],
) -> FzResult<AppRecord> {
	let extracted = extract_archive(zip_bytes)?;

	let site_name = if params.site_name.is_empty() {
		extracted
			.manifest
			.as_ref()
			.and_then(|m| m.name.as_deref())
			.ok_or_else(|| Error::ValidationError("site_name is required".into()))?
	} else {
		params.site_name
	};
	validate_site_name(site_name)?;

	// A redeploy updates the app the site's alias already points at
	let existing = match app_state.meta_adapter.read_alias(site_name).await {
		Ok(alias) => match alias.target {
			AliasTarget::App { app_id } => {
				app_state.meta_adapter.read_app(&app_id).await.ok()
			}
			AliasTarget::Reserved => {
				return Err(Error::Conflict(format!("'{}' is reserved", site_name)));
			}
			_ => {
				return Err(Error::Conflict(format!(
					"'{}' already routes elsewhere; delete its alias first",
					site_name
				)));
			}
		},
		Err(_) => None,
	};

	let manifest = extracted.manifest.as_ref();
	let title = manifest
		.and_then(|m| m.title.as_deref())
		.or(existing.as_ref().map(|app| &*app.title))
		.unwrap_or(site_name);
	let visibility = manifest
		.and_then(|m| m.visibility.as_deref())
		.and_then(Visibility::parse)
		.or(existing.as_ref().map(|app| app.visibility))
		.unwrap_or(Visibility::Public);
	let spa = manifest.map(|m| m.spa).or(existing.as_ref().map(|app| app.spa)).unwrap_or(false);

	let file_count = u32::try_from(extracted.files.len()).unwrap_or(u32::MAX);
	let app = app_state
		.meta_adapter
		.replace_site(
			&UpsertApp {
				app_id: existing.as_ref().map(|app| &*app.app_id),
				title,
				visibility,
				spa,
				source: &params.source,
				original_id: None,
				forked_from_id: None,
			},
			&extracted.files,
			&DeploymentInfo {
				site_id: site_name,
				source: &params.source,
				file_count,
				total_size: extracted.total_size,
			},
		)
		.await?;

	let _ = app_state
		.auth_adapter
		.create_audit_event(&AuditEvent {
			actor: params.actor,
			action: "deploy",
			weight: 5,
			detail: Some(serde_json::json!({
				"site": site_name,
				"appId": app.app_id,
				"files": file_count,
				"bytes": extracted.total_size,
			})),
		})
		.await;

	info!("Deployed {} files to site '{}' (app {})", file_count, site_name, app.app_id);

	Ok(app)
}

// vim: ts=4

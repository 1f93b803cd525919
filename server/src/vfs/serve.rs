//! Static serving: conditional GET, cache classes, directory index,
//! trailing-slash canonicalization, SPA fallback, private paths.

use axum::{
	body::Body,
	http::{header, HeaderMap, HeaderValue, Method, StatusCode},
	response::Response,
};

use crate::prelude::*;
use crate::vfs::{mime_for_path, path as vfs_path, CacheClass};
use fazt_types::auth_adapter::AuthCtx;
use fazt_types::meta_adapter::{AppRecord, VfsFile, Visibility, NOT_FOUND_SITE};

/// Prefix whose files require an authenticated session regardless of the
/// app's visibility
const PRIVATE_PREFIX: &str = "private/";

pub struct ServeRequest<'a> {
	pub site_id: &'a str,
	/// Backing application, when the site was reached through an alias
	pub app: Option<&'a AppRecord>,
	pub method: &'a Method,
	/// Raw request path, as received (percent-encoded, leading slash)
	pub raw_path: &'a str,
	pub headers: &'a HeaderMap,
	pub auth: Option<&'a AuthCtx>,
	/// Force the response status to 404 (the `404.<apex>` host)
	pub force_not_found: bool,
}

pub async fn serve(app_state: &App, req: ServeRequest<'_>) -> Response {
	match serve_inner(app_state, &req).await {
		Ok(response) => response,
		Err(err) => axum::response::IntoResponse::into_response(err),
	}
}

async fn serve_inner(app_state: &App, req: &ServeRequest<'_>) -> FzResult<Response> {
	if req.method != Method::GET && req.method != Method::HEAD {
		return Ok(status_response(StatusCode::METHOD_NOT_ALLOWED));
	}

	let path = vfs_path::canonicalize(req.raw_path)?;
	let trimmed = path.trim_end_matches('/');

	// Private files need a session; private apps apply the rule everywhere
	let needs_auth = path.starts_with(PRIVATE_PREFIX)
		|| req.app.is_some_and(|a| a.visibility == Visibility::Private);
	if needs_auth && req.auth.is_none() {
		return Err(Error::Unauthorized);
	}

	// 1. Direct match
	if let Ok(file) = app_state.meta_adapter.read_file(req.site_id, &path).await {
		return build_file_response(app_state, req, &path, file);
	}

	// 2. Directory index for extension-less paths. The untrimmed path is
	// used deliberately: "docs/" probes "docs//index.html", misses, and
	// falls through to the canonical-form redirect below.
	if vfs_path::extension(&path).is_none() {
		let index_path =
			if path.is_empty() { "index.html".to_string() } else { format!("{}/index.html", path) };
		if let Ok(file) = app_state.meta_adapter.read_file(req.site_id, &index_path).await {
			return build_file_response(app_state, req, &index_path, file);
		}
	}

	// 3. Canonical form has no trailing slash
	if path.ends_with('/') && !trimmed.is_empty() {
		return Ok(Response::builder()
			.status(StatusCode::MOVED_PERMANENTLY)
			.header(header::LOCATION, format!("/{}", trimmed))
			.body(Body::empty())?);
	}

	// 4. SPA fallback
	if req.app.is_some_and(|a| a.spa) && vfs_path::spa_fallback_eligible(&path) {
		if let Ok(file) = app_state.meta_adapter.read_file(req.site_id, "index.html").await {
			return build_file_response(app_state, req, "index.html", file);
		}
	}

	// 5. Miss: the 404 site supplies the body when it exists
	Ok(not_found_response(app_state).await)
}

/// The shared not-found page: the `404` site's index.html, or a plain body
pub async fn not_found_response(app_state: &App) -> Response {
	match app_state.meta_adapter.read_file(NOT_FOUND_SITE, "index.html").await {
		Ok(file) => Response::builder()
			.status(StatusCode::NOT_FOUND)
			.header(header::CONTENT_TYPE, "text/html; charset=utf-8")
			.body(Body::from(Vec::from(file.content)))
			.unwrap_or_else(|_| status_response(StatusCode::NOT_FOUND)),
		Err(_) => status_response(StatusCode::NOT_FOUND),
	}
}

fn status_response(status: StatusCode) -> Response {
	let mut response = Response::new(Body::from(
		status.canonical_reason().unwrap_or_default().to_string(),
	));
	*response.status_mut() = status;
	response
}

fn build_file_response(
	app_state: &App,
	req: &ServeRequest<'_>,
	served_path: &str,
	file: VfsFile,
) -> FzResult<Response> {
	let etag = format!("\"{}\"", file.meta.content_hash);

	// Conditional GET: a matching If-None-Match short-circuits to 304
	if let Some(if_none_match) = req.headers.get(header::IF_NONE_MATCH).and_then(|v| v.to_str().ok())
	{
		if if_none_match.split(',').any(|candidate| candidate.trim().trim_start_matches("W/") == etag)
		{
			return Ok(Response::builder()
				.status(StatusCode::NOT_MODIFIED)
				.header(header::ETAG, etag)
				.body(Body::empty())?);
		}
	}

	let mime = if file.meta.mime.is_empty() {
		mime_for_path(served_path)
	} else {
		file.meta.mime.to_string()
	};
	let cache_class = CacheClass::classify(served_path, &mime);

	let mut content = Vec::from(file.content);
	// The beacon rides along in VFS-served HTML. The ETag stays derived
	// from the stored content hash, so conditional requests keep working.
	if mime.starts_with("text/html") {
		content = inject_beacon(content, &app_state.opts.apex, req.site_id);
	}

	let status =
		if req.force_not_found { StatusCode::NOT_FOUND } else { StatusCode::OK };

	let mut builder = Response::builder()
		.status(status)
		.header(header::CONTENT_TYPE, mime)
		.header(header::ETAG, etag)
		.header(header::CACHE_CONTROL, HeaderValue::from_static(cache_class.header_value()));

	if req.method == Method::HEAD {
		builder = builder.header(header::CONTENT_LENGTH, content.len());
		return Ok(builder.body(Body::empty())?);
	}

	Ok(builder.body(Body::from(content))?)
}

/// Append the analytics beacon before the closing body tag (or at the end
/// when the document has none)
fn inject_beacon(mut content: Vec<u8>, apex: &str, site_id: &str) -> Vec<u8> {
	let snippet = format!(
		"<script>navigator.sendBeacon&&navigator.sendBeacon('//admin.{}/api/t',JSON.stringify({{site:'{}',path:location.pathname,referrer:document.referrer}}));</script>",
		apex, site_id
	);

	let needle = b"</body>";
	if let Some(pos) = content
		.windows(needle.len())
		.rposition(|window| window.eq_ignore_ascii_case(needle))
	{
		content.splice(pos..pos, snippet.into_bytes());
	} else {
		content.extend_from_slice(snippet.as_bytes());
	}
	content
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn beacon_lands_before_body_close() {
		let html = b"<html><body><h1>Hi</h1></body></html>".to_vec();
		let out = inject_beacon(html, "example.com", "demo");
		let out = String::from_utf8(out).unwrap();
		assert!(out.contains("sendBeacon"));
		let beacon_pos = out.find("sendBeacon").unwrap();
		let body_pos = out.find("</body>").unwrap();
		assert!(beacon_pos < body_pos);
	}

	#[test]
	fn beacon_appended_without_body_tag() {
		let html = b"<h1>Hi</h1>".to_vec();
		let out = String::from_utf8(inject_beacon(html, "example.com", "demo")).unwrap();
		assert!(out.ends_with("</script>"));
	}
}

// vim: ts=4

//! Request path canonicalization for VFS lookups.
//!
//! Stored paths carry no leading slash and no dot segments; the deploy
//! pipeline guarantees that on write, this module guarantees it on read.

use percent_encoding::percent_decode_str;

use crate::prelude::*;

/// Canonicalize a request path into VFS form.
///
/// Percent-decodes, strips the leading slash, and rejects NUL bytes and
/// `.`/`..` segments. The trailing-slash rule lives in the serving engine,
/// so a trailing slash survives canonicalization.
pub fn canonicalize(raw: &str) -> FzResult<String> {
	let decoded = percent_decode_str(raw)
		.decode_utf8()
		.map_err(|_| Error::ValidationError("invalid percent-encoding in path".into()))?;

	if decoded.contains('\0') {
		return Err(Error::ValidationError("NUL byte in path".into()));
	}

	let path = decoded.trim_start_matches('/');

	for segment in path.split('/') {
		if segment == "." || segment == ".." {
			return Err(Error::ValidationError("dot segment in path".into()));
		}
	}

	Ok(path.to_string())
}

/// File extension of the last path segment, if any
pub fn extension(path: &str) -> Option<&str> {
	let last_segment = path.rsplit('/').next()?;
	let dot = last_segment.rfind('.')?;
	let ext = &last_segment[dot + 1..];
	if ext.is_empty() { None } else { Some(ext) }
}

/// Extensions that never receive SPA fallback: a miss on these is a real
/// 404, not a client-side route.
const ASSET_EXTENSIONS: &[&str] = &[
	"js", "mjs", "css", "map", "json", "png", "jpg", "jpeg", "gif", "svg", "webp", "avif", "ico",
	"woff", "woff2", "ttf", "otf", "eot", "txt", "xml", "pdf", "wasm", "mp3", "mp4", "webm",
	"html", "htm",
];

/// Whether a path is eligible for SPA fallback: no extension, or an
/// extension outside the well-known asset list.
pub fn spa_fallback_eligible(path: &str) -> bool {
	match extension(path) {
		None => true,
		Some(ext) => !ASSET_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn canonicalizes_simple_paths() {
		assert_eq!(canonicalize("/index.html").unwrap(), "index.html");
		assert_eq!(canonicalize("/css/s.css").unwrap(), "css/s.css");
		assert_eq!(canonicalize("/").unwrap(), "");
	}

	#[test]
	fn percent_decoding() {
		assert_eq!(canonicalize("/a%20b.txt").unwrap(), "a b.txt");
	}

	#[test]
	fn rejects_traversal() {
		assert!(canonicalize("/../etc/passwd").is_err());
		assert!(canonicalize("/a/../b").is_err());
		assert!(canonicalize("/a/./b").is_err());
		// Encoded traversal decodes first, then is rejected
		assert!(canonicalize("/%2e%2e/secret").is_err());
	}

	#[test]
	fn rejects_nul() {
		assert!(canonicalize("/a%00b").is_err());
	}

	#[test]
	fn extension_extraction() {
		assert_eq!(extension("app.js"), Some("js"));
		assert_eq!(extension("dir/app.min.js"), Some("js"));
		assert_eq!(extension("dashboard/settings"), None);
		assert_eq!(extension("dir.v2/readme"), None);
		assert_eq!(extension("trailing."), None);
	}

	#[test]
	fn spa_eligibility() {
		assert!(spa_fallback_eligible("dashboard/settings"));
		assert!(spa_fallback_eligible("about"));
		// Resource ids with odd "extensions" still fall back
		assert!(spa_fallback_eligible("user/alice.example"));
		assert!(!spa_fallback_eligible("missing.js"));
		assert!(!spa_fallback_eligible("style.CSS"));
		assert!(!spa_fallback_eligible("page.html"));
	}
}

// vim: ts=4

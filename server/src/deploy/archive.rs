//! Archive extraction and validation for the deploy pipeline.
//!
//! Everything here runs before any state change: a rejected archive leaves
//! the site untouched.

use std::io::Read;

use crate::prelude::*;
use crate::vfs::mime_for_path;
use fazt_types::meta_adapter::NewVfsFile;

/// Bounds against decompression bombs
const MAX_FILES: usize = 2000;
const MAX_FILE_SIZE: u64 = 25 * 1024 * 1024;
const MAX_TOTAL_SIZE: u64 = 200 * 1024 * 1024;

/// The optional application manifest inside an archive
#[derive(Debug, Default, serde::Deserialize)]
pub struct Manifest {
	pub name: Option<String>,
	pub title: Option<String>,
	#[serde(default)]
	pub spa: bool,
	pub visibility: Option<String>,
}

pub const MANIFEST_PATH: &str = "fazt.json";

#[derive(Debug)]
pub struct ExtractedArchive {
	pub files: Vec<NewVfsFile>,
	pub manifest: Option<Manifest>,
	pub total_size: i64,
}

/// Well-known junk that never deploys
fn is_ignored(path: &str) -> bool {
	path.split('/').any(|segment| {
		segment.starts_with('.') || segment == "__MACOSX" || segment == "Thumbs.db"
	})
}

/// Validate one archive entry path into canonical VFS form
fn validate_entry_path(raw: &str) -> FzResult<String> {
	if raw.contains('\0') {
		return Err(Error::ValidationError("NUL byte in archive path".into()));
	}
	if raw.contains('\\') {
		return Err(Error::ValidationError("backslash in archive path".into()));
	}
	if raw.starts_with('/') {
		return Err(Error::ValidationError("absolute path in archive".into()));
	}

	for segment in raw.split('/') {
		if segment == ".." {
			return Err(Error::ValidationError("path traversal in archive".into()));
		}
	}

	Ok(raw.trim_end_matches('/').to_string())
}

pub fn extract_archive(data: &[u8]) -> FzResult<ExtractedArchive> {
	let cursor = std::io::Cursor::new(data);
	let mut archive = zip::ZipArchive::new(cursor)
		.map_err(|_| Error::ValidationError("not a valid ZIP archive".into()))?;

	if archive.len() > MAX_FILES {
		return Err(Error::ValidationError(format!(
			"archive has too many entries (max {})",
			MAX_FILES
		)));
	}

	let mut files = Vec::new();
	let mut manifest = None;
	let mut total_size: u64 = 0;

	for index in 0..archive.len() {
		let mut entry = archive
			.by_index(index)
			.map_err(|_| Error::ValidationError("unreadable archive entry".into()))?;

		if entry.is_dir() {
			continue;
		}

		let path = validate_entry_path(entry.name())?;
		if path.is_empty() || is_ignored(&path) {
			continue;
		}

		if entry.size() > MAX_FILE_SIZE {
			return Err(Error::ValidationError(format!("file '{}' exceeds the size limit", path)));
		}
		total_size += entry.size();
		if total_size > MAX_TOTAL_SIZE {
			return Err(Error::ValidationError("archive decompresses beyond the total limit".into()));
		}

		let mut content = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
		entry
			.read_to_end(&mut content)
			.map_err(|_| Error::ValidationError("corrupt archive entry".into()))?;

		if path == MANIFEST_PATH {
			manifest = Some(
				serde_json::from_slice::<Manifest>(&content)
					.map_err(|_| Error::ValidationError("invalid fazt.json manifest".into()))?,
			);
		}

		let mime = mime_for_path(&path).into();
		files.push(NewVfsFile { path: path.into(), content, mime });
	}

	if files.is_empty() {
		return Err(Error::ValidationError("archive contains no deployable files".into()));
	}

	if let Some(manifest) = &manifest {
		if let Some(name) = &manifest.name {
			validate_site_name(name)?;
		}
	}

	Ok(ExtractedArchive {
		files,
		manifest,
		total_size: i64::try_from(total_size).unwrap_or(i64::MAX),
	})
}

/// Conservative subdomain character class: lowercase alphanumerics and
/// inner hyphens, at most 63 chars.
pub fn validate_site_name(name: &str) -> FzResult<()> {
	let valid = !name.is_empty()
		&& name.len() <= 63
		&& !name.starts_with('-')
		&& !name.ends_with('-')
		&& name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

	if valid {
		Ok(())
	} else {
		Err(Error::ValidationError(format!("'{}' is not a valid site name", name)))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
		let mut buf = std::io::Cursor::new(Vec::new());
		{
			let mut writer = zip::ZipWriter::new(&mut buf);
			let options = zip::write::SimpleFileOptions::default();
			for (name, content) in entries {
				writer.start_file(*name, options).unwrap();
				writer.write_all(content).unwrap();
			}
			writer.finish().unwrap();
		}
		buf.into_inner()
	}

	#[test]
	fn extracts_files_with_mime() {
		let data = build_zip(&[("index.html", b"<h1>Hello</h1>"), ("css/s.css", b"body{}")]);
		let extracted = extract_archive(&data).unwrap();
		assert_eq!(extracted.files.len(), 2);

		let index = extracted.files.iter().find(|f| &*f.path == "index.html").unwrap();
		assert_eq!(&*index.mime, "text/html; charset=utf-8");
	}

	#[test]
	fn rejects_traversal_entries() {
		let data = build_zip(&[("../evil.txt", b"x")]);
		assert!(matches!(extract_archive(&data), Err(Error::ValidationError(_))));
	}

	#[test]
	fn filters_dotfiles_and_junk() {
		let data = build_zip(&[
			("index.html", b"hi".as_slice()),
			(".env", b"SECRET=1"),
			("__MACOSX/x", b"junk"),
			(".git/config", b"cfg"),
		]);
		let extracted = extract_archive(&data).unwrap();
		assert_eq!(extracted.files.len(), 1);
		assert_eq!(&*extracted.files[0].path, "index.html");
	}

	#[test]
	fn parses_manifest() {
		let data = build_zip(&[
			("index.html", b"hi".as_slice()),
			("fazt.json", br#"{"name":"demo","spa":true}"#),
		]);
		let extracted = extract_archive(&data).unwrap();
		let manifest = extracted.manifest.unwrap();
		assert_eq!(manifest.name.as_deref(), Some("demo"));
		assert!(manifest.spa);
	}

	#[test]
	fn rejects_bad_manifest_name() {
		let data = build_zip(&[
			("index.html", b"hi".as_slice()),
			("fazt.json", br#"{"name":"Bad Name!"}"#),
		]);
		assert!(extract_archive(&data).is_err());
	}

	#[test]
	fn site_name_validation() {
		assert!(validate_site_name("demo").is_ok());
		assert!(validate_site_name("my-app-2").is_ok());
		assert!(validate_site_name("").is_err());
		assert!(validate_site_name("-lead").is_err());
		assert!(validate_site_name("trail-").is_err());
		assert!(validate_site_name("UPPER").is_err());
		assert!(validate_site_name("dot.name").is_err());
	}
}

// vim: ts=4

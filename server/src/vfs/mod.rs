//! Virtual filesystem serving engine

pub mod path;
pub mod serve;

/// Cache policy classes for served files. The set is closed; serving picks
/// exactly one per response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheClass {
	/// Content-hashed asset names and `assets/` directories never change
	Immutable,
	/// HTML revalidates on every request
	Html,
	/// Everything else gets a short shared cache
	Default,
}

impl CacheClass {
	pub fn header_value(self) -> &'static str {
		match self {
			CacheClass::Immutable => "public, max-age=31536000, immutable",
			CacheClass::Html => "no-cache",
			CacheClass::Default => "public, max-age=300",
		}
	}

	/// Classify by the final served path and MIME type
	pub fn classify(path: &str, mime: &str) -> CacheClass {
		if mime.starts_with("text/html") {
			return CacheClass::Html;
		}
		if path.starts_with("assets/") || path.contains("/assets/") || has_hash_token(path) {
			return CacheClass::Immutable;
		}
		CacheClass::Default
	}
}

/// Does the file name carry a hash-like token: `-<8+ hex chars>.` right
/// before the extension (e.g. `app-3f9a01bc.js`)?
fn has_hash_token(path: &str) -> bool {
	let Some(file_name) = path.rsplit('/').next() else { return false };
	let Some(dot) = file_name.rfind('.') else { return false };
	let stem = &file_name[..dot];
	let Some(dash) = stem.rfind('-') else { return false };
	let token = &stem[dash + 1..];
	token.len() >= 8 && token.chars().all(|c| c.is_ascii_hexdigit())
}

/// MIME type for a VFS path, by extension
pub fn mime_for_path(path: &str) -> String {
	let guess = mime_guess::from_path(path).first_or_octet_stream();
	if guess.type_() == mime_guess::mime::TEXT && guess.get_param(mime_guess::mime::CHARSET).is_none()
	{
		format!("{}; charset=utf-8", guess.essence_str())
	} else {
		guess.to_string()
	}
}


// vim: ts=4

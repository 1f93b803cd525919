//! Adapter that manages application metadata, the virtual filesystem,
//! aliases, per-app storage and egress rules.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fmt::Debug;

use crate::prelude::*;

/// Sentinel user id for unauthenticated/session-scoped KV rows
pub const ANON_USER: &str = "-";

/// Site id served for the apex and `root.<apex>` hosts
pub const ROOT_SITE: &str = "root";

/// Site id whose `index.html` is the custom not-found page
pub const NOT_FOUND_SITE: &str = "404";

// Applications //
//**************//

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
	Public,
	Private,
}

impl Visibility {
	pub fn as_str(&self) -> &'static str {
		match self {
			Visibility::Public => "public",
			Visibility::Private => "private",
		}
	}

	pub fn parse(s: &str) -> Option<Visibility> {
		match s {
			"public" => Some(Visibility::Public),
			"private" => Some(Visibility::Private),
			_ => None,
		}
	}
}

/// Source provenance of an application
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceInfo {
	/// Local archive upload
	Deploy,
	/// Cloned from a git repository
	Git {
		url: Box<str>,
		#[serde(rename = "ref")]
		git_ref: Box<str>,
		commit: Box<str>,
	},
	/// Forked from another application
	Fork { parent_id: Box<str> },
}

#[skip_serializing_none]
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppRecord {
	pub app_id: Box<str>,
	pub title: Box<str>,
	pub visibility: Visibility,
	/// Serve `index.html` for extensionless paths that miss the VFS
	pub spa: bool,
	pub source: SourceInfo,
	/// Immutable lineage: the root of this app's fork DAG
	pub original_id: Option<Box<str>>,
	pub forked_from_id: Option<Box<str>>,
	pub created_at: Timestamp,
	pub updated_at: Timestamp,
}

#[derive(Debug)]
pub struct UpsertApp<'a> {
	/// Existing app id to update, or None to mint a new one
	pub app_id: Option<&'a str>,
	pub title: &'a str,
	pub visibility: Visibility,
	pub spa: bool,
	pub source: &'a SourceInfo,
	pub original_id: Option<&'a str>,
	pub forked_from_id: Option<&'a str>,
}

#[derive(Debug, Default)]
pub struct UpdateApp {
	pub title: Option<Box<str>>,
	pub visibility: Option<Visibility>,
	pub spa: Option<bool>,
}

// VFS //
//*****//

#[skip_serializing_none]
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VfsFileMeta {
	pub path: Box<str>,
	pub size: i64,
	pub mime: Box<str>,
	pub content_hash: Box<str>,
	pub updated_at: Timestamp,
}

#[derive(Debug)]
pub struct VfsFile {
	pub meta: VfsFileMeta,
	pub content: Box<[u8]>,
}

/// A file to write during deploy; size and content hash are derived by the
/// adapter.
#[derive(Debug)]
pub struct NewVfsFile {
	pub path: Box<str>,
	pub content: Vec<u8>,
	pub mime: Box<str>,
}

#[derive(Debug)]
pub struct DeploymentInfo<'a> {
	pub site_id: &'a str,
	pub source: &'a SourceInfo,
	pub file_count: u32,
	pub total_size: i64,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRow {
	pub deploy_id: i64,
	pub app_id: Box<str>,
	pub site_id: Box<str>,
	pub source: SourceInfo,
	pub file_count: u32,
	pub total_size: i64,
	pub created_at: Timestamp,
}

// Aliases //
//*********//

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitTarget {
	pub app_id: Box<str>,
	pub weight: u32,
}

/// Alias target. The variant set is closed; routing matches on it
/// exhaustively.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AliasTarget {
	App { app_id: Box<str> },
	Redirect { url: Box<str> },
	Reserved,
	Split { targets: Vec<SplitTarget> },
}

impl AliasTarget {
	pub fn type_name(&self) -> &'static str {
		match self {
			AliasTarget::App { .. } => "app",
			AliasTarget::Redirect { .. } => "redirect",
			AliasTarget::Reserved => "reserved",
			AliasTarget::Split { .. } => "split",
		}
	}

	/// Split weights must be non-negative integers with a positive sum
	pub fn validate(&self) -> FzResult<()> {
		if let AliasTarget::Split { targets } = self {
			if targets.is_empty() {
				return Err(Error::ValidationError("split requires at least one target".into()));
			}
			let sum: u64 = targets.iter().map(|t| u64::from(t.weight)).sum();
			if sum == 0 {
				return Err(Error::ValidationError("split weights must sum to a positive value".into()));
			}
		}
		Ok(())
	}
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasRecord {
	pub subdomain: Box<str>,
	#[serde(flatten)]
	pub target: AliasTarget,
	pub created_at: Timestamp,
	pub updated_at: Timestamp,
}

// Egress //
//********//

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EgressSecretKind {
	Bearer,
	Header,
	Query,
}

/// Secret material injected into an outbound request just before
/// transmission; never surfaced to handlers or list endpoints.
#[derive(Clone, Debug)]
pub struct EgressSecret {
	pub kind: EgressSecretKind,
	/// Header or query-parameter name (unused for bearer)
	pub name: Box<str>,
	pub value: Box<str>,
}

#[derive(Clone, Debug)]
pub struct EgressRule {
	pub rule_id: i64,
	/// Exact domain or `*.example.com` (wildcard matches exactly one label)
	pub domain: Box<str>,
	/// None = rule applies to every app
	pub app_id: Option<Box<str>>,
	/// Plaintext HTTP is denied unless explicitly permitted
	pub allow_http: bool,
	pub rate_per_min: Option<u32>,
	pub burst: Option<u32>,
	pub timeout_ms: Option<u32>,
	pub max_response_bytes: Option<u64>,
	pub cache_ttl_secs: Option<u32>,
	pub secret: Option<EgressSecret>,
	pub created_at: Timestamp,
}

#[derive(Debug)]
pub struct CreateEgressRule<'a> {
	pub domain: &'a str,
	pub app_id: Option<&'a str>,
	pub allow_http: bool,
	pub rate_per_min: Option<u32>,
	pub burst: Option<u32>,
	pub timeout_ms: Option<u32>,
	pub max_response_bytes: Option<u64>,
	pub cache_ttl_secs: Option<u32>,
	pub secret: Option<EgressSecret>,
}

// Analytics //
//***********//

#[derive(Clone, Debug, Deserialize)]
pub struct PageView {
	pub site: Box<str>,
	pub path: Box<str>,
	#[serde(default)]
	pub referrer: Option<Box<str>>,
	#[serde(skip)]
	pub created_at: Timestamp,
}

#[async_trait]
pub trait MetaAdapter: Send + Sync + Debug {
	// Applications //
	async fn read_app(&self, app_id: &str) -> FzResult<AppRecord>;
	async fn list_apps(&self) -> FzResult<Vec<AppRecord>>;
	async fn create_app(&self, data: &UpsertApp<'_>) -> FzResult<AppRecord>;
	async fn update_app(&self, app_id: &str, data: &UpdateApp) -> FzResult<AppRecord>;
	/// Refuses while aliases still point at the app unless `cascade`;
	/// cascade also removes those aliases and the app's VFS files.
	async fn delete_app(&self, app_id: &str, cascade: bool) -> FzResult<()>;
	/// The chain of fork parents, nearest first
	async fn read_lineage(&self, app_id: &str) -> FzResult<Vec<AppRecord>>;
	/// Clone an application: new app row with fork lineage, the parent
	/// site's files copied under `new_site`, optionally its KV cells, an
	/// alias for `new_site`, and a deployment record. One transaction.
	async fn fork_app(
		&self,
		parent_id: &str,
		new_site: &str,
		title: Option<&str>,
		copy_kv: bool,
	) -> FzResult<AppRecord>;

	// VFS //
	async fn read_file(&self, site_id: &str, path: &str) -> FzResult<VfsFile>;
	async fn read_file_meta(&self, site_id: &str, path: &str) -> FzResult<VfsFileMeta>;
	async fn list_files(&self, site_id: &str) -> FzResult<Vec<VfsFileMeta>>;
	async fn write_file(&self, site_id: &str, file: &NewVfsFile) -> FzResult<VfsFileMeta>;
	async fn delete_file(&self, site_id: &str, path: &str) -> FzResult<()>;
	/// Atomic redeploy: replaces the site's whole file set, upserts the
	/// application row and its `app` alias, and records the deployment, all
	/// in one writer transaction. Requests started before the commit see
	/// the old set; requests after see the new.
	async fn replace_site(
		&self,
		app: &UpsertApp<'_>,
		files: &[NewVfsFile],
		deployment: &DeploymentInfo<'_>,
	) -> FzResult<AppRecord>;
	async fn copy_site_files(&self, from_site: &str, to_site: &str) -> FzResult<u32>;
	async fn list_deployments(&self, app_id: &str) -> FzResult<Vec<DeploymentRow>>;
	/// The site id an app's files live under: the site of its most recent
	/// deployment. File lookups key on this, not on the requested
	/// subdomain, which is what makes fork and swap work.
	async fn read_app_site(&self, app_id: &str) -> FzResult<Box<str>>;

	// Aliases //
	async fn read_alias(&self, subdomain: &str) -> FzResult<AliasRecord>;
	async fn list_aliases(&self) -> FzResult<Vec<AliasRecord>>;
	async fn upsert_alias(&self, subdomain: &str, target: &AliasTarget) -> FzResult<AliasRecord>;
	async fn delete_alias(&self, subdomain: &str) -> FzResult<()>;
	/// Exchanges the app targets of two aliases in one transaction. Both
	/// must be `app` aliases; no intermediate state is observable.
	async fn swap_aliases(&self, alias1: &str, alias2: &str) -> FzResult<()>;

	// Per-app, per-user storage //
	async fn kv_get(&self, app_id: &str, user_id: &str, key: &str) -> FzResult<Option<Box<str>>>;
	async fn kv_set(&self, app_id: &str, user_id: &str, key: &str, value: &str) -> FzResult<()>;
	async fn kv_delete(&self, app_id: &str, user_id: &str, key: &str) -> FzResult<bool>;
	/// Keys under the same `(app, user)` scope beginning with `prefix`
	async fn kv_find(
		&self,
		app_id: &str,
		user_id: &str,
		prefix: &str,
		limit: u32,
	) -> FzResult<Vec<(Box<str>, Box<str>)>>;
	async fn copy_app_kv(&self, from_app: &str, to_app: &str) -> FzResult<u32>;

	// Egress rules //
	async fn list_egress_rules(&self) -> FzResult<Vec<EgressRule>>;
	async fn create_egress_rule(&self, data: &CreateEgressRule<'_>) -> FzResult<EgressRule>;
	async fn delete_egress_rule(&self, rule_id: i64) -> FzResult<()>;

	// Analytics //
	async fn record_page_views(&self, views: &[PageView]) -> FzResult<()>;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn alias_target_tagged_json() {
		let target = AliasTarget::Split {
			targets: vec![
				SplitTarget { app_id: "app_1".into(), weight: 1 },
				SplitTarget { app_id: "app_2".into(), weight: 3 },
			],
		};
		let json = serde_json::to_value(&target).unwrap();
		assert_eq!(json["type"], "split");
		assert_eq!(json["targets"][1]["weight"], 3);

		let back: AliasTarget = serde_json::from_value(json).unwrap();
		assert_eq!(back, target);
	}

	#[test]
	fn split_weight_validation() {
		let zero = AliasTarget::Split {
			targets: vec![SplitTarget { app_id: "app_1".into(), weight: 0 }],
		};
		assert!(zero.validate().is_err());

		let empty = AliasTarget::Split { targets: vec![] };
		assert!(empty.validate().is_err());

		let ok = AliasTarget::Split {
			targets: vec![
				SplitTarget { app_id: "app_1".into(), weight: 0 },
				SplitTarget { app_id: "app_2".into(), weight: 2 },
			],
		};
		assert!(ok.validate().is_ok());
	}

	#[test]
	fn source_info_git_ref_field() {
		let source = SourceInfo::Git {
			url: "https://git.example/repo.git".into(),
			git_ref: "main".into(),
			commit: "abc123".into(),
		};
		let json = serde_json::to_value(&source).unwrap();
		assert_eq!(json["type"], "git");
		assert_eq!(json["ref"], "main");
	}
}

// vim: ts=4

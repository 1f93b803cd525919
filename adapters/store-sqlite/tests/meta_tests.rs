//! Substrate tests for apps, VFS, aliases, KV scoping and egress rules.

use std::sync::Arc;

use fazt_store_sqlite::StoreSqlite;
use fazt_types::error::Error;
use fazt_types::meta_adapter::{
	AliasTarget, DeploymentInfo, MetaAdapter, NewVfsFile, SourceInfo, SplitTarget, UpsertApp,
	Visibility, ANON_USER,
};
use fazt_types::worker::WorkerPool;
use tempfile::TempDir;

async fn create_store() -> (Arc<StoreSqlite>, TempDir) {
	let temp_dir = TempDir::new().expect("Failed to create temp directory");
	let worker = Arc::new(WorkerPool::new(1, 1));
	let store = StoreSqlite::new(worker, temp_dir.path()).await.expect("Failed to open store");
	(Arc::new(store), temp_dir)
}

fn file(path: &str, content: &[u8]) -> NewVfsFile {
	NewVfsFile {
		path: path.into(),
		content: content.to_vec(),
		mime: "text/plain; charset=utf-8".into(),
	}
}

async fn deploy(
	store: &Arc<StoreSqlite>,
	site: &str,
	app_id: Option<&str>,
	files: Vec<NewVfsFile>,
) -> fazt_types::meta_adapter::AppRecord {
	let file_count = u32::try_from(files.len()).unwrap();
	store
		.replace_site(
			&UpsertApp {
				app_id,
				title: site,
				visibility: Visibility::Public,
				spa: false,
				source: &SourceInfo::Deploy,
				original_id: None,
				forked_from_id: None,
			},
			&files,
			&DeploymentInfo {
				site_id: site,
				source: &SourceInfo::Deploy,
				file_count,
				total_size: 0,
			},
		)
		.await
		.expect("deploy failed")
}

#[tokio::test(flavor = "multi_thread")]
async fn deploy_replaces_the_whole_file_set() {
	let (store, _tmp) = create_store().await;

	let app =
		deploy(&store, "demo", None, vec![file("index.html", b"v1"), file("old.txt", b"old")])
			.await;

	// Redeploy with a different set: the old file must be gone
	deploy(
		&store,
		"demo",
		Some(&app.app_id),
		vec![file("index.html", b"v2"), file("new.txt", b"new")],
	)
	.await;

	let files = store.list_files("demo").await.unwrap();
	let paths: Vec<&str> = files.iter().map(|f| &*f.path).collect();
	assert_eq!(paths, vec!["index.html", "new.txt"]);

	let index = store.read_file("demo", "index.html").await.unwrap();
	assert_eq!(&*index.content, b"v2");

	// The alias points at the same app across redeploys
	let alias = store.read_alias("demo").await.unwrap();
	assert_eq!(alias.target, AliasTarget::App { app_id: app.app_id.clone() });

	// Two deployments recorded, site mapping intact
	assert_eq!(store.list_deployments(&app.app_id).await.unwrap().len(), 2);
	assert_eq!(&*store.read_app_site(&app.app_id).await.unwrap(), "demo");
}

#[tokio::test(flavor = "multi_thread")]
async fn content_hash_is_stable_per_content() {
	let (store, _tmp) = create_store().await;
	deploy(&store, "demo", None, vec![file("a.txt", b"same")]).await;
	let first = store.read_file_meta("demo", "a.txt").await.unwrap();

	deploy(&store, "other", None, vec![file("b.txt", b"same")]).await;
	let second = store.read_file_meta("other", "b.txt").await.unwrap();

	assert_eq!(first.content_hash, second.content_hash);
}

#[tokio::test(flavor = "multi_thread")]
async fn swap_exchanges_app_targets_atomically() {
	let (store, _tmp) = create_store().await;
	let v1 = deploy(&store, "tetris", None, vec![file("index.html", b"v1")]).await;
	let v2 = deploy(&store, "tetris-next", None, vec![file("index.html", b"v2")]).await;

	store.swap_aliases("tetris", "tetris-next").await.unwrap();

	let a = store.read_alias("tetris").await.unwrap();
	let b = store.read_alias("tetris-next").await.unwrap();
	assert_eq!(a.target, AliasTarget::App { app_id: v2.app_id.clone() });
	assert_eq!(b.target, AliasTarget::App { app_id: v1.app_id.clone() });

	// Swap back restores the original mapping
	store.swap_aliases("tetris", "tetris-next").await.unwrap();
	let a = store.read_alias("tetris").await.unwrap();
	assert_eq!(a.target, AliasTarget::App { app_id: v1.app_id });
}

#[tokio::test(flavor = "multi_thread")]
async fn swap_rejects_bad_inputs() {
	let (store, _tmp) = create_store().await;
	deploy(&store, "a", None, vec![file("index.html", b"a")]).await;

	assert!(matches!(store.swap_aliases("a", "a").await, Err(Error::Conflict(_))));
	assert!(matches!(store.swap_aliases("a", "missing").await, Err(Error::NotFound)));

	store
		.upsert_alias("r", &AliasTarget::Redirect { url: "https://x.example/".into() })
		.await
		.unwrap();
	assert!(matches!(store.swap_aliases("a", "r").await, Err(Error::Conflict(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn fork_copies_files_and_sets_lineage() {
	let (store, _tmp) = create_store().await;
	let parent =
		deploy(&store, "game", None, vec![file("index.html", b"game"), file("s.js", b"js")])
			.await;

	store.kv_set(&parent.app_id, ANON_USER, "highscore", "100").await.unwrap();

	let fork = store.fork_app(&parent.app_id, "game-next", None, true).await.unwrap();
	assert_eq!(fork.forked_from_id.as_deref(), Some(&*parent.app_id));
	assert_eq!(fork.original_id.as_deref(), Some(&*parent.app_id));

	// Files live under the new site id
	let copied = store.read_file("game-next", "index.html").await.unwrap();
	assert_eq!(&*copied.content, b"game");
	assert_eq!(&*store.read_app_site(&fork.app_id).await.unwrap(), "game-next");

	// KV was copied into the fork's scope
	let value = store.kv_get(&fork.app_id, ANON_USER, "highscore").await.unwrap();
	assert_eq!(value.as_deref(), Some("100"));

	// Lineage walks to the parent
	let lineage = store.read_lineage(&fork.app_id).await.unwrap();
	assert_eq!(lineage.len(), 1);
	assert_eq!(lineage[0].app_id, parent.app_id);
}

#[tokio::test(flavor = "multi_thread")]
async fn kv_rows_are_scoped_per_app_and_user() {
	let (store, _tmp) = create_store().await;

	store.kv_set("app_a", "usr_1", "k", "\"a1\"").await.unwrap();
	store.kv_set("app_a", "usr_2", "k", "\"a2\"").await.unwrap();
	store.kv_set("app_b", "usr_1", "k", "\"b1\"").await.unwrap();

	// Same key, three scopes, three values
	assert_eq!(store.kv_get("app_a", "usr_1", "k").await.unwrap().as_deref(), Some("\"a1\""));
	assert_eq!(store.kv_get("app_a", "usr_2", "k").await.unwrap().as_deref(), Some("\"a2\""));
	assert_eq!(store.kv_get("app_b", "usr_1", "k").await.unwrap().as_deref(), Some("\"b1\""));

	// A foreign scope sees nothing
	assert_eq!(store.kv_get("app_b", "usr_2", "k").await.unwrap(), None);

	// find stays inside its scope
	store.kv_set("app_a", "usr_1", "k2", "\"x\"").await.unwrap();
	let found = store.kv_find("app_a", "usr_1", "k", 10).await.unwrap();
	assert_eq!(found.len(), 2);
	let foreign = store.kv_find("app_b", "usr_2", "", 10).await.unwrap();
	assert!(foreign.is_empty());

	// delete is scoped too
	assert!(store.kv_delete("app_a", "usr_1", "k").await.unwrap());
	assert_eq!(store.kv_get("app_a", "usr_2", "k").await.unwrap().as_deref(), Some("\"a2\""));
}

#[tokio::test(flavor = "multi_thread")]
async fn kv_find_escapes_like_wildcards() {
	let (store, _tmp) = create_store().await;
	store.kv_set("app_a", "-", "a%b", "\"1\"").await.unwrap();
	store.kv_set("app_a", "-", "axb", "\"2\"").await.unwrap();

	let found = store.kv_find("app_a", "-", "a%", 10).await.unwrap();
	assert_eq!(found.len(), 1);
	assert_eq!(&*found[0].0, "a%b");
}

#[tokio::test(flavor = "multi_thread")]
async fn app_deletion_honors_alias_references() {
	let (store, _tmp) = create_store().await;
	let app = deploy(&store, "demo", None, vec![file("index.html", b"x")]).await;

	// Refused while the alias exists
	assert!(matches!(store.delete_app(&app.app_id, false).await, Err(Error::Conflict(_))));

	// Cascade removes alias and files
	store.delete_app(&app.app_id, true).await.unwrap();
	assert!(store.read_alias("demo").await.is_err());
	assert!(store.list_files("demo").await.unwrap().is_empty());
	assert!(store.read_app(&app.app_id).await.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn split_alias_round_trip() {
	let (store, _tmp) = create_store().await;
	let a = deploy(&store, "a", None, vec![file("index.html", b"a")]).await;
	let b = deploy(&store, "b", None, vec![file("index.html", b"b")]).await;

	let target = AliasTarget::Split {
		targets: vec![
			SplitTarget { app_id: a.app_id.clone(), weight: 1 },
			SplitTarget { app_id: b.app_id.clone(), weight: 3 },
		],
	};
	store.upsert_alias("canary", &target).await.unwrap();

	let read = store.read_alias("canary").await.unwrap();
	assert_eq!(read.target, target);

	// Zero-sum splits are rejected at the adapter boundary
	let bad = AliasTarget::Split {
		targets: vec![SplitTarget { app_id: a.app_id, weight: 0 }],
	};
	assert!(store.upsert_alias("bad", &bad).await.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn egress_rules_round_trip_with_secret() {
	use fazt_types::meta_adapter::{CreateEgressRule, EgressSecret, EgressSecretKind};

	let (store, _tmp) = create_store().await;
	let rule = store
		.create_egress_rule(&CreateEgressRule {
			domain: "*.api.example.com",
			app_id: Some("app_x"),
			allow_http: false,
			rate_per_min: Some(60),
			burst: Some(10),
			timeout_ms: Some(5000),
			max_response_bytes: Some(1024 * 1024),
			cache_ttl_secs: Some(30),
			secret: Some(EgressSecret {
				kind: EgressSecretKind::Bearer,
				name: "".into(),
				value: "sekrit-token".into(),
			}),
		})
		.await
		.unwrap();

	let rules = store.list_egress_rules().await.unwrap();
	assert_eq!(rules.len(), 1);
	assert_eq!(&*rules[0].domain, "*.api.example.com");
	assert_eq!(rules[0].secret.as_ref().map(|s| s.kind), Some(EgressSecretKind::Bearer));

	store.delete_egress_rule(rule.rule_id).await.unwrap();
	assert!(store.list_egress_rules().await.unwrap().is_empty());
}

// vim: ts=4

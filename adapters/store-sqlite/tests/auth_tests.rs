//! Credential storage tests: sessions, invites, OAuth state, API keys.

use std::sync::Arc;

use fazt_store_sqlite::StoreSqlite;
use fazt_types::auth_adapter::{AuthAdapter, CreateApiKeyOptions, CreateInvite, CreateUser};
use fazt_types::error::Error;
use fazt_types::types::{Patch, Role, Timestamp};
use fazt_types::worker::WorkerPool;
use tempfile::TempDir;

async fn create_store() -> (Arc<StoreSqlite>, TempDir) {
	let temp_dir = TempDir::new().expect("Failed to create temp directory");
	let worker = Arc::new(WorkerPool::new(1, 1));
	let store = StoreSqlite::new(worker, temp_dir.path()).await.expect("Failed to open store");
	(Arc::new(store), temp_dir)
}

fn owner_data<'a>() -> CreateUser<'a> {
	CreateUser {
		email: "owner@example.com",
		name: "Owner",
		avatar_url: None,
		provider: "local",
		role: Role::Owner,
		password: Some("hunter2hunter2"),
	}
}

#[tokio::test(flavor = "multi_thread")]
async fn session_round_trip_and_expiry() {
	let (store, _tmp) = create_store().await;
	let user = store.create_user(&owner_data()).await.unwrap();

	let session = store.create_session(&user.user_id, 3600).await.unwrap();
	assert!(session.token.len() >= 43, "token must carry at least 32 bytes of entropy");

	let ctx = store.validate_session(&session.token).await.unwrap();
	assert_eq!(ctx.user_id, user.user_id);
	assert_eq!(ctx.role, Role::Owner);

	// An expired session no longer validates
	let expired = store.create_session(&user.user_id, -10).await.unwrap();
	assert!(matches!(store.validate_session(&expired.token).await, Err(Error::Unauthorized)));

	// Logout invalidates
	store.delete_session(&session.token).await.unwrap();
	assert!(store.validate_session(&session.token).await.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn plaintext_token_never_persisted() {
	let (store, tmp) = create_store().await;
	let user = store.create_user(&owner_data()).await.unwrap();
	let session = store.create_session(&user.user_id, 3600).await.unwrap();

	// Force a WAL checkpoint by closing the pools, then scan the raw file
	store.close().await;
	let mut raw = Vec::new();
	for name in ["data.db", "data.db-wal"] {
		let path = tmp.path().join(name);
		if let Ok(bytes) = std::fs::read(&path) {
			raw.extend_from_slice(&bytes);
		}
	}
	let token = session.token.as_bytes();
	let found = raw.windows(token.len()).any(|window| window == token);
	assert!(!found, "plaintext session token must not appear in storage");
}

#[tokio::test(flavor = "multi_thread")]
async fn role_changes_are_current_on_next_validation() {
	let (store, _tmp) = create_store().await;
	store.create_user(&owner_data()).await.unwrap();

	let admin = store
		.create_user(&CreateUser {
			email: "admin@example.com",
			name: "Admin",
			avatar_url: None,
			provider: "local",
			role: Role::Admin,
			password: Some("password123"),
		})
		.await
		.unwrap();

	let session = store.create_session(&admin.user_id, 3600).await.unwrap();
	assert_eq!(store.validate_session(&session.token).await.unwrap().role, Role::Admin);

	// Demote: the same token now carries the reduced role
	store.update_user_role(&admin.user_id, Role::User).await.unwrap();
	assert_eq!(store.validate_session(&session.token).await.unwrap().role, Role::User);
}

#[tokio::test(flavor = "multi_thread")]
async fn owner_is_protected() {
	let (store, _tmp) = create_store().await;
	let owner = store.create_user(&owner_data()).await.unwrap();

	assert!(matches!(
		store.update_user_role(&owner.user_id, Role::User).await,
		Err(Error::Conflict(_))
	));
	assert!(matches!(store.delete_user(&owner.user_id).await, Err(Error::Conflict(_))));

	// A second owner cannot be created
	let second = CreateUser { email: "other@example.com", ..owner_data() };
	assert!(matches!(store.create_user(&second).await, Err(Error::Conflict(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn session_cascades_with_user_deletion() {
	let (store, _tmp) = create_store().await;
	store.create_user(&owner_data()).await.unwrap();
	let user = store
		.create_user(&CreateUser {
			email: "u@example.com",
			name: "U",
			avatar_url: None,
			provider: "local",
			role: Role::User,
			password: Some("password123"),
		})
		.await
		.unwrap();
	let session = store.create_session(&user.user_id, 3600).await.unwrap();

	store.delete_user(&user.user_id).await.unwrap();
	assert!(store.validate_session(&session.token).await.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn invite_race_admits_exactly_one() {
	let (store, _tmp) = create_store().await;
	let owner = store.create_user(&owner_data()).await.unwrap();

	let invite = store
		.create_invite(&CreateInvite {
			role: Role::User,
			max_uses: 1,
			expires_at: None,
			created_by: &owner.user_id,
		})
		.await
		.unwrap();

	let attempts = 10;
	let results = futures::future::join_all((0..attempts).map(|i| {
		let store = store.clone();
		let code = invite.code.to_string();
		async move {
			store
				.redeem_invite(&code, &format!("user{}@example.com", i), "User", None)
				.await
		}
	}))
	.await;

	let successes = results.iter().filter(|r| r.is_ok()).count();
	let conflicts =
		results.iter().filter(|r| matches!(r, Err(Error::Conflict(_)))).count();
	assert_eq!(successes, 1, "exactly one redemption must win");
	assert_eq!(conflicts, attempts - 1);

	let final_state = store.read_invite(&invite.code).await.unwrap();
	assert_eq!(final_state.use_count, 1);

	// Exactly one new user (plus the owner)
	assert_eq!(store.list_users().await.unwrap().len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn expired_invite_is_rejected() {
	let (store, _tmp) = create_store().await;
	let owner = store.create_user(&owner_data()).await.unwrap();

	let invite = store
		.create_invite(&CreateInvite {
			role: Role::User,
			max_uses: 5,
			expires_at: Some(Timestamp::from_now(-60)),
			created_by: &owner.user_id,
		})
		.await
		.unwrap();

	assert!(matches!(
		store.redeem_invite(&invite.code, "late@example.com", "Late", None).await,
		Err(Error::Conflict(_))
	));
	assert_eq!(store.read_invite(&invite.code).await.unwrap().use_count, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn oauth_state_consumed_exactly_once() {
	let (store, _tmp) = create_store().await;

	let state = store.create_oauth_state("github", 600).await.unwrap();

	let results = futures::future::join_all((0..8).map(|_| {
		let store = store.clone();
		let state = state.to_string();
		async move { store.consume_oauth_state(&state).await }
	}))
	.await;

	let successes = results.iter().filter(|r| r.is_ok()).count();
	assert_eq!(successes, 1, "a state token is single-use");

	// Expired states never consume
	let stale = store.create_oauth_state("github", -1).await.unwrap();
	assert!(store.consume_oauth_state(&stale).await.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn api_key_validation_and_scope() {
	let (store, _tmp) = create_store().await;
	let owner = store.create_user(&owner_data()).await.unwrap();

	let created = store
		.create_api_key(&CreateApiKeyOptions {
			user_id: &owner.user_id,
			name: Some("ci"),
			scopes: Some("deploy"),
			expires_at: None,
		})
		.await
		.unwrap();

	assert!(created.plaintext_key.starts_with("fz_"));

	let ctx = store.validate_api_key(&created.plaintext_key).await.unwrap();
	assert_eq!(ctx.user_id, owner.user_id);
	assert!(ctx.has_scope("deploy"));
	assert!(!ctx.has_scope("admin"));

	assert!(store.validate_api_key("fz_definitely-not-a-key-000").await.is_err());

	store.delete_api_key(created.info.key_id).await.unwrap();
	assert!(store.validate_api_key(&created.plaintext_key).await.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn profile_update_patch_semantics() {
	let (store, _tmp) = create_store().await;
	let owner = store.create_user(&owner_data()).await.unwrap();

	let updated = store
		.update_user_profile(&owner.user_id, Some("Renamed"), Patch::Value("https://a/i.png"))
		.await
		.unwrap();
	assert_eq!(&*updated.name, "Renamed");
	assert_eq!(updated.avatar_url.as_deref(), Some("https://a/i.png"));

	// Undefined leaves the avatar alone; Null clears it
	let kept = store.update_user_profile(&owner.user_id, None, Patch::Undefined).await.unwrap();
	assert_eq!(kept.avatar_url.as_deref(), Some("https://a/i.png"));

	let cleared = store.update_user_profile(&owner.user_id, None, Patch::Null).await.unwrap();
	assert_eq!(cleared.avatar_url, None);
}

// vim: ts=4

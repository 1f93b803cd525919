//! OAuth state tokens: issued before the provider redirect, consumed
//! exactly once on callback.

use crate::{db_err, user, StoreSqlite};
use fazt_types::auth_adapter::{CreateUser, OauthState, User};
use fazt_types::prelude::*;
use fazt_types::utils::random_id;

pub(crate) async fn create_oauth_state(
	store: &StoreSqlite,
	provider: &str,
	ttl: i64,
) -> FzResult<Box<str>> {
	let state = random_id();

	sqlx::query("INSERT INTO oauth_states (state, provider, expires_at) VALUES (?1, ?2, ?3)")
		.bind(&state)
		.bind(provider)
		.bind(Timestamp::from_now(ttl).0)
		.execute(store.write())
		.await
		.map_err(db_err)?;

	Ok(state.into())
}

/// Single-statement consumption: the `DELETE ... RETURNING` both verifies
/// the state (present, unexpired) and removes it, so a state presented
/// twice succeeds at most once.
pub(crate) async fn consume_oauth_state(store: &StoreSqlite, state: &str) -> FzResult<OauthState> {
	let provider: Option<String> = sqlx::query_scalar(
		"DELETE FROM oauth_states WHERE state = ?1 AND expires_at > unixepoch() RETURNING provider",
	)
	.bind(state)
	.fetch_optional(store.write())
	.await
	.map_err(db_err)?;

	match provider {
		Some(provider) => Ok(OauthState { provider: provider.into() }),
		None => Err(Error::Unauthorized),
	}
}

pub(crate) async fn purge_expired_oauth_states(store: &StoreSqlite) -> FzResult<u32> {
	let result = sqlx::query("DELETE FROM oauth_states WHERE expires_at < unixepoch()")
		.execute(store.write())
		.await
		.map_err(db_err)?;
	Ok(u32::try_from(result.rows_affected()).unwrap_or_default())
}

/// Create or refresh a user from an identity-provider profile. Matching is
/// by email; name and avatar follow the provider on each login.
pub(crate) async fn upsert_oauth_user(
	store: &StoreSqlite,
	data: &CreateUser<'_>,
) -> FzResult<User> {
	match user::read_user_by_email(store, data.email).await {
		Ok(existing) => {
			user::update_user_profile(
				store,
				&existing.user_id,
				Some(data.name),
				match data.avatar_url {
					Some(url) => Patch::Value(url),
					None => Patch::Undefined,
				},
			)
			.await
		}
		Err(Error::NotFound) => user::create_user(store, data).await,
		Err(err) => Err(err),
	}
}

// vim: ts=4

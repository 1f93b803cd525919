//! User management

use sqlx::{Row, sqlite::SqliteRow};

use crate::{crypto, db_err, map_res, StoreSqlite};
use fazt_types::auth_adapter::{CreateUser, User};
use fazt_types::prelude::*;
use fazt_types::utils::random_id_len;

pub(crate) fn new_user_id() -> String {
	format!("usr_{}", random_id_len(16))
}

pub(crate) fn map_user_row(row: SqliteRow) -> Result<User, sqlx::Error> {
	let role: String = row.try_get("role")?;
	Ok(User {
		user_id: row.try_get::<String, _>("user_id")?.into(),
		email: row.try_get::<String, _>("email")?.into(),
		name: row.try_get::<String, _>("name")?.into(),
		avatar_url: row.try_get::<Option<String>, _>("avatar_url")?.map(Into::into),
		provider: row.try_get::<String, _>("provider")?.into(),
		role: Role::parse(&role).unwrap_or(Role::User),
		created_at: Timestamp(row.try_get("created_at")?),
		updated_at: Timestamp(row.try_get("updated_at")?),
	})
}

const USER_COLUMNS: &str = "user_id, email, name, avatar_url, provider, role, created_at, updated_at";

pub(crate) async fn create_user(store: &StoreSqlite, data: &CreateUser<'_>) -> FzResult<User> {
	let password_hash = match data.password {
		Some(password) => {
			Some(crypto::generate_password_hash(store.worker(), password.into()).await?)
		}
		None => None,
	};
	insert_user(store, data, password_hash.as_deref()).await
}

/// Insert with a pre-hashed password (the bcrypt work happens before this
/// so it never holds the writer). The "exactly one owner" invariant is
/// enforced by the statement itself: the insert of an owner row only
/// selects a row to insert while no owner exists, so concurrent callers
/// cannot slip a second owner in between a check and a write.
pub(crate) async fn insert_user(
	store: &StoreSqlite,
	data: &CreateUser<'_>,
	password_hash: Option<&str>,
) -> FzResult<User> {
	let user_id = new_user_id();
	let row = sqlx::query(&format!(
		"INSERT INTO users (user_id, email, name, avatar_url, provider, role, password)
			SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7
				WHERE ?6 != 'owner'
					OR NOT EXISTS (SELECT 1 FROM users WHERE role = 'owner')
			RETURNING {USER_COLUMNS}"
	))
	.bind(&user_id)
	.bind(data.email)
	.bind(data.name)
	.bind(data.avatar_url)
	.bind(data.provider)
	.bind(data.role.as_str())
	.bind(password_hash)
	.fetch_optional(store.write())
	.await
	.map_err(db_err)?;

	match row {
		Some(row) => map_res(Ok(row), map_user_row),
		None => Err(Error::Conflict("an owner already exists".into())),
	}
}

pub(crate) async fn read_user(store: &StoreSqlite, user_id: &str) -> FzResult<User> {
	let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ?1"))
		.bind(user_id)
		.fetch_one(store.read())
		.await;
	map_res(row, map_user_row)
}

pub(crate) async fn read_user_by_email(store: &StoreSqlite, email: &str) -> FzResult<User> {
	let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"))
		.bind(email)
		.fetch_one(store.read())
		.await;
	map_res(row, map_user_row)
}

pub(crate) async fn list_users(store: &StoreSqlite) -> FzResult<Vec<User>> {
	let rows = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at"))
		.fetch_all(store.read())
		.await
		.map_err(db_err)?;
	rows.into_iter().map(|row| map_res(Ok(row), map_user_row)).collect()
}

pub(crate) async fn update_user_role(
	store: &StoreSqlite,
	user_id: &str,
	role: Role,
) -> FzResult<User> {
	if role == Role::Owner {
		return Err(Error::Conflict("ownership cannot be granted".into()));
	}

	// The owner cannot be demoted; the WHERE clause makes the check and the
	// write one statement on the writer.
	let row = sqlx::query(&format!(
		"UPDATE users SET role = ?2, updated_at = unixepoch()
			WHERE user_id = ?1 AND role != 'owner'
			RETURNING {USER_COLUMNS}"
	))
	.bind(user_id)
	.bind(role.as_str())
	.fetch_optional(store.write())
	.await
	.map_err(db_err)?;

	match row {
		Some(row) => map_res(Ok(row), map_user_row),
		None => {
			// Distinguish missing user from protected owner
			match read_user(store, user_id).await {
				Ok(_) => Err(Error::Conflict("the owner role is immutable".into())),
				Err(err) => Err(err),
			}
		}
	}
}

pub(crate) async fn update_user_profile(
	store: &StoreSqlite,
	user_id: &str,
	name: Option<&str>,
	avatar_url: Patch<&str>,
) -> FzResult<User> {
	let row = sqlx::query(&format!(
		"UPDATE users SET
			name = coalesce(?2, name),
			avatar_url = CASE ?3 WHEN 'keep' THEN avatar_url WHEN 'null' THEN NULL ELSE ?4 END,
			updated_at = unixepoch()
			WHERE user_id = ?1
			RETURNING {USER_COLUMNS}"
	))
	.bind(user_id)
	.bind(name)
	.bind(match avatar_url {
		Patch::Undefined => "keep",
		Patch::Null => "null",
		Patch::Value(_) => "set",
	})
	.bind(avatar_url.value().copied())
	.fetch_one(store.write())
	.await;
	map_res(row, map_user_row)
}

pub(crate) async fn delete_user(store: &StoreSqlite, user_id: &str) -> FzResult<()> {
	// Sessions and API keys cascade via foreign keys
	let result = sqlx::query("DELETE FROM users WHERE user_id = ?1 AND role != 'owner'")
		.bind(user_id)
		.execute(store.write())
		.await
		.map_err(db_err)?;

	if result.rows_affected() == 0 {
		match read_user(store, user_id).await {
			Ok(_) => Err(Error::Conflict("the owner cannot be deleted".into())),
			Err(err) => Err(err),
		}
	} else {
		Ok(())
	}
}

pub(crate) async fn check_password(
	store: &StoreSqlite,
	email: &str,
	password: &str,
) -> FzResult<User> {
	let row = sqlx::query(&format!(
		"SELECT {USER_COLUMNS}, password FROM users WHERE email = ?1"
	))
	.bind(email)
	.fetch_one(store.read())
	.await;

	let (user, password_hash) = map_res(row, |row| {
		let hash: Option<String> = row.try_get("password")?;
		Ok((map_user_row(row)?, hash))
	})
	.map_err(|_| Error::PermissionDenied)?;

	let Some(password_hash) = password_hash else {
		// OAuth-only account, no local credential
		return Err(Error::PermissionDenied);
	};

	crypto::check_password_hash(store.worker(), password.into(), password_hash.into()).await?;
	Ok(user)
}

pub(crate) async fn set_password(
	store: &StoreSqlite,
	user_id: &str,
	password: &str,
) -> FzResult<()> {
	let password_hash = crypto::generate_password_hash(store.worker(), password.into()).await?;
	let result = sqlx::query("UPDATE users SET password = ?2, updated_at = unixepoch() WHERE user_id = ?1")
		.bind(user_id)
		.bind(password_hash.as_ref())
		.execute(store.write())
		.await
		.map_err(db_err)?;

	if result.rows_affected() == 0 {
		return Err(Error::NotFound);
	}
	Ok(())
}

// vim: ts=4

//! Invite codes and their atomic redemption

use sqlx::{Row, sqlite::SqliteRow};

use crate::{crypto, db_err, map_res, user, StoreSqlite};
use fazt_types::auth_adapter::{CreateInvite, Invite, User};
use fazt_types::prelude::*;
use fazt_types::utils::random_id_len;

fn map_invite_row(row: SqliteRow) -> Result<Invite, sqlx::Error> {
	let role: String = row.try_get("role")?;
	Ok(Invite {
		code: row.try_get::<String, _>("code")?.into(),
		role: Role::parse(&role).unwrap_or(Role::User),
		max_uses: row.try_get::<i64, _>("max_uses")?.try_into().unwrap_or(0),
		use_count: row.try_get::<i64, _>("use_count")?.try_into().unwrap_or(0),
		expires_at: row.try_get::<Option<i64>, _>("expires_at")?.map(Timestamp),
		created_by: row.try_get::<String, _>("created_by")?.into(),
		created_at: Timestamp(row.try_get("created_at")?),
	})
}

const INVITE_COLUMNS: &str = "code, role, max_uses, use_count, expires_at, created_by, created_at";

pub(crate) async fn create_invite(
	store: &StoreSqlite,
	data: &CreateInvite<'_>,
) -> FzResult<Invite> {
	if data.max_uses == 0 {
		return Err(Error::ValidationError("max_uses must be positive".into()));
	}
	if data.role == Role::Owner {
		return Err(Error::ValidationError("invites cannot grant the owner role".into()));
	}

	let code = random_id_len(12);
	let row = sqlx::query(&format!(
		"INSERT INTO invites (code, role, max_uses, expires_at, created_by)
			VALUES (?1, ?2, ?3, ?4, ?5)
			RETURNING {INVITE_COLUMNS}"
	))
	.bind(&code)
	.bind(data.role.as_str())
	.bind(i64::from(data.max_uses))
	.bind(data.expires_at.map(|t| t.0))
	.bind(data.created_by)
	.fetch_one(store.write())
	.await
	.map_err(db_err)?;

	map_res(Ok(row), map_invite_row)
}

pub(crate) async fn list_invites(store: &StoreSqlite) -> FzResult<Vec<Invite>> {
	let rows = sqlx::query(&format!(
		"SELECT {INVITE_COLUMNS} FROM invites ORDER BY created_at DESC"
	))
	.fetch_all(store.read())
	.await
	.map_err(db_err)?;
	rows.into_iter().map(|row| map_res(Ok(row), map_invite_row)).collect()
}

pub(crate) async fn read_invite(store: &StoreSqlite, code: &str) -> FzResult<Invite> {
	let row = sqlx::query(&format!("SELECT {INVITE_COLUMNS} FROM invites WHERE code = ?1"))
		.bind(code)
		.fetch_one(store.read())
		.await;
	map_res(row, map_invite_row)
}

pub(crate) async fn delete_invite(store: &StoreSqlite, code: &str) -> FzResult<()> {
	let result = sqlx::query("DELETE FROM invites WHERE code = ?1")
		.bind(code)
		.execute(store.write())
		.await
		.map_err(db_err)?;
	if result.rows_affected() == 0 {
		return Err(Error::NotFound);
	}
	Ok(())
}

/// Redeem an invite and create the user in one writer transaction.
///
/// The guarded `UPDATE ... RETURNING` is the whole check: existence,
/// expiry and remaining uses are verified by the same statement that
/// increments the counter, so concurrent redemptions of a single-use code
/// admit exactly one winner.
pub(crate) async fn redeem_invite(
	store: &StoreSqlite,
	code: &str,
	email: &str,
	name: &str,
	password: Option<&str>,
) -> FzResult<User> {
	// Hash outside the transaction; bcrypt must not hold the writer
	let password_hash = match password {
		Some(password) => {
			Some(crypto::generate_password_hash(store.worker(), password.into()).await?)
		}
		None => None,
	};

	let mut tx = store.write().begin().await.map_err(db_err)?;

	let role: Option<String> = sqlx::query_scalar(
		"UPDATE invites SET use_count = use_count + 1
			WHERE code = ?1
				AND use_count < max_uses
				AND (expires_at IS NULL OR expires_at > unixepoch())
			RETURNING role",
	)
	.bind(code)
	.fetch_optional(&mut *tx)
	.await
	.map_err(db_err)?;

	let Some(role) = role else {
		return Err(Error::Conflict("invite is unknown, expired or exhausted".into()));
	};
	let role = Role::parse(&role).unwrap_or(Role::User);

	let user_id = user::new_user_id();
	let row = sqlx::query(
		"INSERT INTO users (user_id, email, name, provider, role, password)
			VALUES (?1, ?2, ?3, 'local', ?4, ?5)
			RETURNING user_id, email, name, avatar_url, provider, role, created_at, updated_at",
	)
	.bind(&user_id)
	.bind(email)
	.bind(name)
	.bind(role.as_str())
	.bind(password_hash.as_deref())
	.fetch_one(&mut *tx)
	.await
	.map_err(db_err)?;

	let user = map_res(Ok(row), user::map_user_row)?;

	tx.commit().await.map_err(db_err)?;

	Ok(user)
}

// vim: ts=4

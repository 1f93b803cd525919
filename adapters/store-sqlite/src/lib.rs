//! SQLite storage substrate for fazt.
//!
//! All durable state lives in one `data.db` file (WAL journal). Mutations
//! are serialized through a dedicated writer pool holding a single
//! connection; readers use a separate pool and run in parallel. The
//! atomicity guarantees of invite redemption, OAuth state consumption,
//! alias swap and redeploy depend on every mutating method going through
//! [`StoreSqlite::write`].

use sqlx::sqlite::{self, SqlitePool, SqliteRow};
use std::{fmt::Debug, path::Path, sync::Arc};

use fazt_types::prelude::*;
use fazt_types::worker::WorkerPool;

pub(crate) mod alias;
pub(crate) mod api_key;
pub(crate) mod app;
pub(crate) mod audit;
pub(crate) mod cert;
pub(crate) mod crypto;
pub(crate) mod egress;
pub(crate) mod invite;
pub(crate) mod kv;
pub(crate) mod oauth;
pub(crate) mod schema;
pub(crate) mod session;
pub(crate) mod user;
pub(crate) mod vfs;

mod adapter_impl;

/// # Helper functions

pub(crate) fn inspect(err: &sqlx::Error) {
	warn!("DB: {:#?}", err);
}

pub(crate) fn map_res<T, F>(row: Result<SqliteRow, sqlx::Error>, f: F) -> FzResult<T>
where
	F: FnOnce(SqliteRow) -> Result<T, sqlx::Error>,
{
	match row {
		Ok(row) => f(row).inspect_err(inspect).map_err(|_| Error::DbError),
		Err(sqlx::Error::RowNotFound) => Err(Error::NotFound),
		Err(err) => {
			inspect(&err);
			Err(Error::DbError)
		}
	}
}

pub(crate) fn db_err(err: sqlx::Error) -> Error {
	if is_unique_violation(&err) {
		return Error::Conflict("unique constraint violation".into());
	}
	inspect(&err);
	Error::DbError
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
	match err {
		sqlx::Error::Database(db) => db.is_unique_violation(),
		_ => false,
	}
}

pub struct StoreSqlite {
	/// Parallel reader pool
	read: SqlitePool,
	/// The writer lease: a pool holding exactly one connection. Every
	/// mutation must go through this pool; nothing else may open a write
	/// connection to the database.
	write: SqlitePool,
	worker: Arc<WorkerPool>,
}

impl Debug for StoreSqlite {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("StoreSqlite").finish()
	}
}

impl StoreSqlite {
	pub async fn new(worker: Arc<WorkerPool>, data_dir: impl AsRef<Path>) -> FzResult<Self> {
		let db_path = data_dir.as_ref().join("data.db");

		let opts = sqlite::SqliteConnectOptions::new()
			.filename(&db_path)
			.create_if_missing(true)
			.journal_mode(sqlite::SqliteJournalMode::Wal)
			.foreign_keys(true)
			.busy_timeout(std::time::Duration::from_secs(10));

		let write = sqlite::SqlitePoolOptions::new()
			.max_connections(1)
			.connect_with(opts.clone())
			.await
			.inspect_err(|err| warn!("DbError: {:#?}", err))
			.or(Err(Error::DbError))?;

		schema::init_db(&write)
			.await
			.inspect_err(|err| warn!("DbError: {:#?}", err))
			.or(Err(Error::DbError))?;

		// Read-only connections cannot become a second writer by accident
		let read = sqlite::SqlitePoolOptions::new()
			.max_connections(8)
			.connect_with(opts.create_if_missing(false).read_only(true))
			.await
			.inspect_err(|err| warn!("DbError: {:#?}", err))
			.or(Err(Error::DbError))?;

		Ok(Self { read, write, worker })
	}

	pub(crate) fn read(&self) -> &SqlitePool {
		&self.read
	}

	pub(crate) fn write(&self) -> &SqlitePool {
		&self.write
	}

	pub(crate) fn worker(&self) -> &Arc<WorkerPool> {
		&self.worker
	}

	/// Flush and close both pools; called from server teardown.
	pub async fn close(&self) {
		self.read.close().await;
		self.write.close().await;
	}
}

// vim: ts=4

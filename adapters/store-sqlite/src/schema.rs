//! Database schema initialization and migrations

use sqlx::SqlitePool;

/// Initialize the database schema
pub(crate) async fn init_db(db: &SqlitePool) -> Result<(), sqlx::Error> {
	let mut tx = db.begin().await?;

	sqlx::query(
		"CREATE TABLE IF NOT EXISTS vars (
			key text NOT NULL,
			value text NOT NULL,
			created_at integer DEFAULT (unixepoch()),
			updated_at integer DEFAULT (unixepoch()),
			PRIMARY KEY(key)
	)",
	)
	.execute(&mut *tx)
	.await?;

	sqlx::query(
		"CREATE TABLE IF NOT EXISTS users (
			user_id text NOT NULL,
			email text NOT NULL,
			name text NOT NULL,
			avatar_url text,
			provider text NOT NULL DEFAULT 'local',
			role text NOT NULL DEFAULT 'user',
			password text,
			created_at integer DEFAULT (unixepoch()),
			updated_at integer DEFAULT (unixepoch()),
			PRIMARY KEY(user_id)
	)",
	)
	.execute(&mut *tx)
	.await?;
	sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email ON users (email)")
		.execute(&mut *tx)
		.await?;

	sqlx::query(
		"CREATE TABLE IF NOT EXISTS sessions (
			session_id integer PRIMARY KEY,
			token_hash text NOT NULL,
			user_id text NOT NULL REFERENCES users (user_id) ON DELETE CASCADE,
			created_at integer DEFAULT (unixepoch()),
			expires_at integer NOT NULL,
			last_seen_at integer
	)",
	)
	.execute(&mut *tx)
	.await?;
	sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_hash ON sessions (token_hash)")
		.execute(&mut *tx)
		.await?;
	sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions (expires_at)")
		.execute(&mut *tx)
		.await?;

	sqlx::query(
		"CREATE TABLE IF NOT EXISTS invites (
			code text NOT NULL,
			role text NOT NULL DEFAULT 'user',
			max_uses integer NOT NULL DEFAULT 1,
			use_count integer NOT NULL DEFAULT 0,
			expires_at integer,
			created_by text NOT NULL,
			created_at integer DEFAULT (unixepoch()),
			PRIMARY KEY(code),
			CHECK(use_count <= max_uses)
	)",
	)
	.execute(&mut *tx)
	.await?;

	sqlx::query(
		"CREATE TABLE IF NOT EXISTS oauth_states (
			state text NOT NULL,
			provider text NOT NULL,
			created_at integer DEFAULT (unixepoch()),
			expires_at integer NOT NULL,
			PRIMARY KEY(state)
	)",
	)
	.execute(&mut *tx)
	.await?;

	sqlx::query(
		"CREATE TABLE IF NOT EXISTS api_keys (
			key_id integer PRIMARY KEY,
			key_prefix text NOT NULL,
			key_hash text NOT NULL,
			name text,
			scopes text,
			user_id text NOT NULL REFERENCES users (user_id) ON DELETE CASCADE,
			expires_at integer,
			last_used_at integer,
			created_at integer DEFAULT (unixepoch())
	)",
	)
	.execute(&mut *tx)
	.await?;
	sqlx::query("CREATE INDEX IF NOT EXISTS idx_api_keys_prefix ON api_keys (key_prefix)")
		.execute(&mut *tx)
		.await?;

	sqlx::query(
		"CREATE TABLE IF NOT EXISTS apps (
			app_id text NOT NULL,
			title text NOT NULL,
			visibility text NOT NULL DEFAULT 'public',
			spa integer NOT NULL DEFAULT 0,
			source text NOT NULL,
			original_id text,
			forked_from_id text,
			created_at integer DEFAULT (unixepoch()),
			updated_at integer DEFAULT (unixepoch()),
			PRIMARY KEY(app_id)
	)",
	)
	.execute(&mut *tx)
	.await?;

	sqlx::query(
		"CREATE TABLE IF NOT EXISTS vfs_files (
			site_id text NOT NULL,
			path text NOT NULL,
			content blob NOT NULL,
			size integer NOT NULL,
			mime text NOT NULL,
			content_hash text NOT NULL,
			updated_at integer DEFAULT (unixepoch()),
			PRIMARY KEY(site_id, path)
	)",
	)
	.execute(&mut *tx)
	.await?;

	sqlx::query(
		"CREATE TABLE IF NOT EXISTS aliases (
			subdomain text NOT NULL,
			type text NOT NULL,
			targets text NOT NULL,
			created_at integer DEFAULT (unixepoch()),
			updated_at integer DEFAULT (unixepoch()),
			PRIMARY KEY(subdomain)
	)",
	)
	.execute(&mut *tx)
	.await?;

	sqlx::query(
		"CREATE TABLE IF NOT EXISTS kv_cells (
			app_id text NOT NULL,
			user_id text NOT NULL,
			key text NOT NULL,
			value text NOT NULL,
			created_at integer DEFAULT (unixepoch()),
			updated_at integer DEFAULT (unixepoch()),
			PRIMARY KEY(app_id, user_id, key)
	)",
	)
	.execute(&mut *tx)
	.await?;

	sqlx::query(
		"CREATE TABLE IF NOT EXISTS egress_rules (
			rule_id integer PRIMARY KEY,
			domain text NOT NULL,
			app_id text,
			allow_http integer NOT NULL DEFAULT 0,
			rate_per_min integer,
			burst integer,
			timeout_ms integer,
			max_response_bytes integer,
			cache_ttl_secs integer,
			secret_kind text,
			secret_name text,
			secret_value text,
			created_at integer DEFAULT (unixepoch())
	)",
	)
	.execute(&mut *tx)
	.await?;
	sqlx::query("CREATE INDEX IF NOT EXISTS idx_egress_domain ON egress_rules (domain)")
		.execute(&mut *tx)
		.await?;

	sqlx::query(
		"CREATE TABLE IF NOT EXISTS deployments (
			deploy_id integer PRIMARY KEY,
			app_id text NOT NULL,
			site_id text NOT NULL,
			source text NOT NULL,
			file_count integer NOT NULL,
			total_size integer NOT NULL,
			created_at integer DEFAULT (unixepoch())
	)",
	)
	.execute(&mut *tx)
	.await?;
	sqlx::query("CREATE INDEX IF NOT EXISTS idx_deployments_app ON deployments (app_id)")
		.execute(&mut *tx)
		.await?;

	sqlx::query(
		"CREATE TABLE IF NOT EXISTS audit_events (
			ev_id integer PRIMARY KEY,
			actor text,
			action text NOT NULL,
			weight integer NOT NULL DEFAULT 0,
			detail text,
			created_at integer DEFAULT (unixepoch())
	)",
	)
	.execute(&mut *tx)
	.await?;

	sqlx::query(
		"CREATE TABLE IF NOT EXISTS page_views (
			view_id integer PRIMARY KEY,
			site text NOT NULL,
			path text NOT NULL,
			referrer text,
			created_at integer DEFAULT (unixepoch())
	)",
	)
	.execute(&mut *tx)
	.await?;

	sqlx::query(
		"CREATE TABLE IF NOT EXISTS certs (
			domain text NOT NULL,
			cert text NOT NULL,
			key text NOT NULL,
			expires_at integer NOT NULL,
			created_at integer DEFAULT (unixepoch()),
			PRIMARY KEY(domain)
	)",
	)
	.execute(&mut *tx)
	.await?;

	tx.commit().await?;

	Ok(())
}

// vim: ts=4

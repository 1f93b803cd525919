//! Shared fixtures for server integration tests

use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::Request;
use tempfile::TempDir;

use fazt_server::core::app::App;
use fazt_server::Builder;
use fazt_store_sqlite::StoreSqlite;
use fazt_types::auth_adapter::{AuthAdapter, CreateUser};
use fazt_types::types::Role;
use fazt_types::worker::WorkerPool;

pub const APEX: &str = "example.com";

pub async fn test_state() -> (App, TempDir) {
	let temp_dir = TempDir::new().expect("Failed to create temp directory");
	let worker = Arc::new(WorkerPool::new(1, 2));
	let store = Arc::new(
		StoreSqlite::new(worker.clone(), temp_dir.path()).await.expect("Failed to open store"),
	);

	let mut builder = Builder::new();
	builder
		.apex(APEX)
		.data_dir(temp_dir.path())
		.worker(worker)
		.auth_adapter(store.clone())
		.meta_adapter(store);

	let app = builder.build_state().expect("Failed to build state");
	(app, temp_dir)
}

pub async fn create_owner(app: &App) -> fazt_types::auth_adapter::User {
	app.auth_adapter
		.create_user(&CreateUser {
			email: "owner@example.com",
			name: "Owner",
			avatar_url: None,
			provider: "local",
			role: Role::Owner,
			password: Some("hunter2hunter2"),
		})
		.await
		.expect("Failed to create owner")
}

pub async fn session_cookie_for(app: &App, user_id: &str) -> String {
	let session =
		app.auth_adapter.create_session(user_id, 3600).await.expect("Failed to create session");
	format!("fazt_session={}", session.token)
}

/// Attach the peer address extension the real listener would provide
pub fn with_conn(mut req: Request<Body>) -> Request<Body> {
	let peer: SocketAddr = "203.0.113.10:55555".parse().expect("addr");
	req.extensions_mut().insert(ConnectInfo(peer));
	req
}

pub fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
	let mut buf = std::io::Cursor::new(Vec::new());
	{
		let mut writer = zip::ZipWriter::new(&mut buf);
		let options = zip::write::SimpleFileOptions::default();
		for (name, content) in entries {
			writer.start_file(*name, options).expect("zip entry");
			writer.write_all(content).expect("zip write");
		}
		writer.finish().expect("zip finish");
	}
	buf.into_inner()
}

// vim: ts=4

//! App state type

use rustls::sign::CertifiedKey;
use std::{
	collections::HashMap,
	net::IpAddr,
	path::Path,
	sync::{Arc, RwLock},
};
use tokio::sync::Semaphore;

use crate::analytics::AnalyticsBuffer;
use crate::auth::oauth::IdentityProvider;
use crate::auth::throttle::LoginThrottle;
use crate::core::ws_broadcast::SiteBroadcast;
use crate::prelude::*;
use crate::serverless::egress::EgressGateway;
use crate::serverless::ScriptCache;

use fazt_types::auth_adapter::AuthAdapter;
use fazt_types::meta_adapter::MetaAdapter;
use fazt_types::worker::WorkerPool;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Per-app serverless concurrency ceilings. One app saturating its
/// semaphore cannot exhaust the worker pool for everyone else.
#[derive(Debug, Default)]
pub struct AppSlots {
	slots: parking_lot::Mutex<HashMap<Box<str>, Arc<Semaphore>>>,
	per_app: usize,
}

impl AppSlots {
	pub fn new(per_app: usize) -> Self {
		AppSlots { slots: parking_lot::Mutex::new(HashMap::new()), per_app }
	}

	pub fn for_app(&self, app_id: &str) -> Arc<Semaphore> {
		let mut slots = self.slots.lock();
		slots
			.entry(app_id.into())
			.or_insert_with(|| Arc::new(Semaphore::new(self.per_app)))
			.clone()
	}
}

pub struct AppState {
	pub worker: Arc<WorkerPool>,
	pub opts: AppBuilderOpts,

	pub auth_adapter: Arc<dyn AuthAdapter>,
	pub meta_adapter: Arc<dyn MetaAdapter>,
	pub identity_providers: HashMap<Box<str>, Arc<dyn IdentityProvider>>,

	// TLS
	pub acme_challenge_map: RwLock<HashMap<Box<str>, Box<str>>>,
	pub certs: RwLock<HashMap<Box<str>, Arc<CertifiedKey>>>,

	// Shared caches and limiters
	pub script_cache: ScriptCache,
	pub egress: EgressGateway,
	pub login_throttle: LoginThrottle,
	pub app_slots: AppSlots,
	pub analytics: AnalyticsBuffer,
	pub broadcast: SiteBroadcast,
}

impl std::fmt::Debug for AppState {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AppState").field("opts", &self.opts).finish()
	}
}

pub type App = Arc<AppState>;

#[derive(Debug)]
pub struct AppBuilderOpts {
	/// Plain HTTP listener ("host:port")
	pub listen: Box<str>,
	/// HTTPS listener; TLS and on-demand issuance activate when set
	pub listen_https: Option<Box<str>>,
	/// The operator's apex domain, e.g. "example.com"
	pub apex: Box<str>,
	/// Directory holding data.db, its WAL sibling and the PID file
	pub data_dir: Box<Path>,
	pub acme_email: Option<Box<str>>,
	/// Peers whose X-Forwarded-For is trusted. Empty by default.
	pub trusted_proxies: Box<[IpAddr]>,
	/// Owner bootstrap credentials for a fresh installation
	pub owner_email: Option<Box<str>>,
	pub owner_password: Option<Box<str>>,
	pub session_ttl: i64,
}

// vim: ts=4

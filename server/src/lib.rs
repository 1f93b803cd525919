//! fazt server library: builder, state assembly and the run loop.

use std::{
	collections::HashMap,
	net::IpAddr,
	path::{Path, PathBuf},
	sync::{Arc, RwLock},
};

pub mod admin;
pub mod alias;
pub mod analytics;
pub mod auth;
pub mod core;
pub mod deploy;
pub mod prelude;
pub mod routes;
pub mod serverless;
pub mod vfs;

use crate::analytics::AnalyticsBuffer;
use crate::auth::oauth::IdentityProvider;
use crate::auth::throttle::LoginThrottle;
use crate::core::app::{AppBuilderOpts, AppSlots, AppState};
use crate::core::ws_broadcast::SiteBroadcast;
use crate::core::{scheduler, webserver};
use crate::prelude::*;
use crate::serverless::egress::EgressGateway;
use crate::serverless::ScriptCache;

use fazt_types::auth_adapter::{AuthAdapter, CreateUser, SESSION_EXPIRY};
use fazt_types::meta_adapter::MetaAdapter;
use fazt_types::worker::WorkerPool;

/// Default per-app serverless concurrency ceiling
const APP_CONCURRENCY: usize = 4;

pub struct Adapters {
	pub auth_adapter: Option<Arc<dyn AuthAdapter>>,
	pub meta_adapter: Option<Arc<dyn MetaAdapter>>,
}

pub struct Builder {
	opts: AppBuilderOpts,
	worker: Option<Arc<WorkerPool>>,
	adapters: Adapters,
	identity_providers: HashMap<Box<str>, Arc<dyn IdentityProvider>>,
}

impl Builder {
	pub fn new() -> Self {
		Builder {
			opts: AppBuilderOpts {
				listen: "127.0.0.1:8080".into(),
				listen_https: None,
				apex: "localhost.localdomain".into(),
				data_dir: PathBuf::from("./data").into(),
				acme_email: None,
				trusted_proxies: Box::new([]),
				owner_email: None,
				owner_password: None,
				session_ttl: SESSION_EXPIRY,
			},
			worker: None,
			adapters: Adapters { auth_adapter: None, meta_adapter: None },
			identity_providers: HashMap::new(),
		}
	}

	// Opts
	pub fn listen(&mut self, listen: impl Into<Box<str>>) -> &mut Self {
		self.opts.listen = listen.into();
		self
	}
	pub fn listen_https(&mut self, listen_https: impl Into<Box<str>>) -> &mut Self {
		self.opts.listen_https = Some(listen_https.into());
		self
	}
	pub fn apex(&mut self, apex: impl Into<Box<str>>) -> &mut Self {
		self.opts.apex = apex.into();
		self
	}
	pub fn data_dir(&mut self, data_dir: impl Into<Box<Path>>) -> &mut Self {
		self.opts.data_dir = data_dir.into();
		self
	}
	pub fn acme_email(&mut self, acme_email: impl Into<Box<str>>) -> &mut Self {
		self.opts.acme_email = Some(acme_email.into());
		self
	}
	pub fn trusted_proxies(&mut self, proxies: impl IntoIterator<Item = IpAddr>) -> &mut Self {
		self.opts.trusted_proxies = proxies.into_iter().collect();
		self
	}
	pub fn owner(
		&mut self,
		email: impl Into<Box<str>>,
		password: impl Into<Box<str>>,
	) -> &mut Self {
		self.opts.owner_email = Some(email.into());
		self.opts.owner_password = Some(password.into());
		self
	}
	pub fn session_ttl(&mut self, session_ttl: i64) -> &mut Self {
		self.opts.session_ttl = session_ttl;
		self
	}
	pub fn worker(&mut self, worker: Arc<WorkerPool>) -> &mut Self {
		self.worker = Some(worker);
		self
	}

	// Adapters
	pub fn auth_adapter(&mut self, auth_adapter: Arc<dyn AuthAdapter>) -> &mut Self {
		self.adapters.auth_adapter = Some(auth_adapter);
		self
	}
	pub fn meta_adapter(&mut self, meta_adapter: Arc<dyn MetaAdapter>) -> &mut Self {
		self.adapters.meta_adapter = Some(meta_adapter);
		self
	}
	pub fn identity_provider(&mut self, provider: Arc<dyn IdentityProvider>) -> &mut Self {
		self.identity_providers.insert(provider.name().into(), provider);
		self
	}

	/// Assemble the shared state without starting listeners. Exposed for
	/// the test harness.
	pub fn build_state(self) -> FzResult<App> {
		let auth_adapter = self
			.adapters
			.auth_adapter
			.ok_or_else(|| Error::ConfigError("no auth adapter".into()))?;
		let meta_adapter = self
			.adapters
			.meta_adapter
			.ok_or_else(|| Error::ConfigError("no meta adapter".into()))?;
		let worker =
			self.worker.ok_or_else(|| Error::ConfigError("no worker pool".into()))?;

		Ok(Arc::new(AppState {
			worker,
			opts: self.opts,
			auth_adapter,
			meta_adapter,
			identity_providers: self.identity_providers,
			acme_challenge_map: RwLock::new(HashMap::new()),
			certs: RwLock::new(HashMap::new()),
			script_cache: ScriptCache::default(),
			egress: EgressGateway::new()?,
			login_throttle: LoginThrottle::default(),
			app_slots: AppSlots::new(APP_CONCURRENCY),
			analytics: AnalyticsBuffer::default(),
			broadcast: SiteBroadcast::default(),
		}))
	}

	pub async fn run(self) -> FzResult<()> {
		tracing_subscriber::fmt()
			.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
			.with_target(false)
			.init();

		// The cert cache and resolver need the process-default crypto
		// provider before the first ServerConfig is built
		if rustls::crypto::CryptoProvider::get_default().is_none() {
			let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
		}

		let state = self.build_state()?;

		let pid_path = state.opts.data_dir.join("fazt.pid");
		tokio::fs::write(&pid_path, std::process::id().to_string()).await?;

		bootstrap(&state).await?;

		let loaded = webserver::prepopulate_cert_cache(&state).await;
		if loaded > 0 {
			info!("Loaded {} certificates into the TLS cache", loaded);
		}

		let mut sched = scheduler::Scheduler::new();
		scheduler::standard_tasks(&mut sched)?;
		sched.start(state.clone());

		let routers = routes::init(state.clone());

		let http_server =
			webserver::create_http_server(state.clone(), &state.opts.listen, routers.clone())
				.await?;
		let https_server = match &state.opts.listen_https {
			Some(listen_https) => Some(
				webserver::create_https_server(state.clone(), listen_https, routers).await?,
			),
			None => None,
		};

		tokio::select! {
			_ = tokio::signal::ctrl_c() => {
				info!("Shutdown signal received");
			}
			result = http_server => {
				warn!("HTTP listener exited: {:?}", result);
			}
			result = async {
				match https_server {
					Some(handle) => handle.await,
					None => std::future::pending().await,
				}
			} => {
				warn!("HTTPS listener exited: {:?}", result);
			}
		}

		// Teardown: flush buffered analytics, release the storage writer
		state.analytics.flush(&state).await;
		state.auth_adapter.close().await;
		let _ = tokio::fs::remove_file(&pid_path).await;

		Ok(())
	}
}

impl Default for Builder {
	fn default() -> Self {
		Self::new()
	}
}

/// First-start bootstrap: record the apex and create the owner account
async fn bootstrap(state: &App) -> FzResult<()> {
	state.auth_adapter.write_var("apex", &state.opts.apex).await?;

	let owner_exists = state
		.auth_adapter
		.list_users()
		.await?
		.iter()
		.any(|user| user.role == Role::Owner);
	if owner_exists {
		return Ok(());
	}

	let (Some(email), Some(password)) =
		(state.opts.owner_email.as_deref(), state.opts.owner_password.as_deref())
	else {
		warn!("No owner account exists and no owner bootstrap credentials were given");
		return Ok(());
	};

	info!("Bootstrapping owner account {}", email);
	state
		.auth_adapter
		.create_user(&CreateUser {
			email,
			name: "Owner",
			avatar_url: None,
			provider: "local",
			role: Role::Owner,
			password: Some(password),
		})
		.await?;

	Ok(())
}

// vim: ts=4

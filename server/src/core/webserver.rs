// Webserver implementation

use axum::response::Response;
use axum::{body::Body, http::Request, http::Uri, Router, ServiceExt};
use rustls::{
	server::{ClientHello, ResolvesServerCert},
	sign::CertifiedKey,
};
use rustls_pki_types::{pem::PemObject, CertificateDer, PrivateKeyDer};
use std::convert::Infallible;
use std::{net::SocketAddr, str::FromStr, sync::Arc};
use tower::Service;

use crate::core::extract::SiteCtx;
use crate::core::host::{self, HostRoute};
use crate::core::{acme, app::App};
use crate::prelude::*;
use crate::vfs::serve::not_found_response;

pub struct CertResolver {
	state: App,
}

impl CertResolver {
	pub fn new(state: App) -> CertResolver {
		CertResolver { state }
	}

	pub fn get(&self, name: &str) -> Option<Arc<CertifiedKey>> {
		match self.state.certs.read() {
			Ok(cache) => cache.get(name).cloned(),
			Err(poisoned) => {
				error!("RwLock poisoned in cert cache read (recovering)");
				poisoned.into_inner().get(name).cloned()
			}
		}
	}
}

impl std::fmt::Debug for CertResolver {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CertResolver").finish()
	}
}

impl ResolvesServerCert for CertResolver {
	fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
		let name = client_hello.server_name()?;
		if let Some(cert) = self.get(name) {
			return Some(cert);
		}

		// Cache miss: check the substrate. FIXME: Should not block
		let cert_data = tokio::task::block_in_place(|| {
			tokio::runtime::Handle::current()
				.block_on(async { self.state.auth_adapter.read_cert_by_domain(name).await })
		});

		match cert_data {
			Ok(cert_data) => {
				let certified_key = Arc::new(
					CertifiedKey::from_der(
						CertificateDer::pem_slice_iter(cert_data.cert.as_bytes())
							.filter_map(Result::ok)
							.collect(),
						PrivateKeyDer::from_pem_slice(cert_data.key.as_bytes()).ok()?,
						rustls::crypto::CryptoProvider::get_default()?,
					)
					.ok()?,
				);
				let mut cache = match self.state.certs.write() {
					Ok(cache) => cache,
					Err(poisoned) => {
						error!("RwLock poisoned in cert cache write (recovering)");
						poisoned.into_inner()
					}
				};
				cache.insert(cert_data.domain, certified_key.clone());
				Some(certified_key)
			}
			Err(_) => {
				// Unknown hostname: queue on-demand issuance; this
				// handshake fails, the next one finds the cert.
				acme::request_certificate(&self.state, name);
				warn!("Certificate not found for {}", name);
				None
			}
		}
	}
}

/// Pre-populate the TLS cert cache from the substrate to avoid blocking
/// I/O during the first handshakes
pub async fn prepopulate_cert_cache(app: &App) -> usize {
	let certs = match app.auth_adapter.list_certs().await {
		Ok(certs) => certs,
		Err(_) => return 0,
	};

	let mut loaded = 0;
	let Ok(mut cache) = app.certs.write() else {
		error!("Failed to acquire cert cache write lock for pre-population");
		return 0;
	};

	for cert_data in &certs {
		let certified_key = match CertifiedKey::from_der(
			CertificateDer::pem_slice_iter(cert_data.cert.as_bytes())
				.filter_map(Result::ok)
				.collect(),
			match PrivateKeyDer::from_pem_slice(cert_data.key.as_bytes()) {
				Ok(k) => k,
				Err(_) => continue,
			},
			match rustls::crypto::CryptoProvider::get_default() {
				Some(p) => p,
				None => continue,
			},
		) {
			Ok(k) => Arc::new(k),
			Err(_) => continue,
		};

		cache.insert(cert_data.domain.clone(), certified_key);
		loaded += 1;
	}

	loaded
}

/// The three routers the host dispatcher chooses between
#[derive(Clone)]
pub struct Routers {
	/// `admin.<apex>`: role-gated control plane
	pub admin: Router,
	/// `localhost`: control plane with auth but no role gate
	pub dev: Router,
	/// Everything site-shaped
	pub site: Router,
}

/// Classify by Host (and the local `/_app/` tunnel) and hand the request
/// to exactly one router.
async fn dispatch(
	state: App,
	routers: Routers,
	req: Request<Body>,
) -> Result<Response, Infallible> {
	let start = std::time::Instant::now();
	let mut req = req;

	let peer = req
		.extensions()
		.get::<axum::extract::ConnectInfo<SocketAddr>>()
		.map(|info| info.0);
	let peer_label = peer.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string());

	let host_header = req
		.uri()
		.host()
		.map(str::to_owned)
		.or_else(|| {
			req.headers()
				.get(axum::http::header::HOST)
				.and_then(|h| h.to_str().ok())
				.map(str::to_owned)
		})
		.unwrap_or_default();

	info!("REQ [{}] {} {} {}", peer_label, req.method(), host_header, req.uri().path());

	// Local-only direct app access bypasses host classification
	let tunnel = host::parse_app_tunnel(req.uri().path())
		.map(|(site_id, rest)| (Box::<str>::from(site_id), rest));
	let response = if let Some((site_id, rewritten)) = tunnel {
		let is_local = peer.map(|p| host::is_local_peer(p.ip())).unwrap_or(false);
		if is_local {
			rewrite_path(&mut req, &rewritten);
			req.extensions_mut().insert(SiteCtx {
				site_id,
				not_found: false,
				local_tunnel: true,
			});
			routers.site.clone().call(req).await
		} else {
			// 404, not 401: the route's existence stays hidden
			Ok(not_found_response(&state).await)
		}
	} else {
		match host::classify_host(&host_header, &state.opts.apex) {
			HostRoute::Admin { dev: true } => routers.dev.clone().call(req).await,
			HostRoute::Admin { dev: false } => routers.admin.clone().call(req).await,
			HostRoute::Site { site_id, not_found } => {
				req.extensions_mut().insert(SiteCtx { site_id, not_found, local_tunnel: false });
				routers.site.clone().call(req).await
			}
			HostRoute::Fallback => Ok(not_found_response(&state).await),
		}
	};

	let response = response.unwrap_or_else(|err: Infallible| match err {});

	let status = response.status();
	if status.is_client_error() || status.is_server_error() {
		warn!("RES: {} tm:{:?}", status, start.elapsed().as_millis());
	} else {
		info!("RES: {} tm:{:?}", status, start.elapsed().as_millis());
	}

	Ok(response)
}

fn rewrite_path(req: &mut Request<Body>, new_path: &str) {
	let path_and_query = match req.uri().query() {
		Some(query) => format!("{}?{}", new_path, query),
		None => new_path.to_string(),
	};

	let mut parts = req.uri().clone().into_parts();
	match axum::http::uri::PathAndQuery::from_str(&path_and_query) {
		Ok(pq) => parts.path_and_query = Some(pq),
		Err(_) => return,
	}
	if let Ok(uri) = Uri::from_parts(parts) {
		*req.uri_mut() = uri;
	}
}

pub async fn create_https_server(
	state: App,
	listen: &str,
	routers: Routers,
) -> Result<tokio::task::JoinHandle<Result<(), std::io::Error>>, std::io::Error> {
	let cert_resolver = Arc::new(CertResolver::new(state.clone()));
	let mut server_config =
		rustls::ServerConfig::builder().with_no_client_auth().with_cert_resolver(cert_resolver);
	server_config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

	let addr = SocketAddr::from_str(listen).map_err(|_| std::io::ErrorKind::InvalidInput)?;
	let https_server = axum_server::bind_rustls(
		addr,
		axum_server::tls_rustls::RustlsConfig::from_config(Arc::new(server_config)),
	);

	let svc = tower::service_fn(move |req: Request<hyper::body::Incoming>| {
		dispatch(state.clone(), routers.clone(), req.map(Body::new))
	});

	info!("Listening on HTTPS {}", &listen);
	let handle = tokio::spawn(async move {
		https_server.serve(svc.into_make_service_with_connect_info::<SocketAddr>()).await
	});

	Ok(handle)
}

/// Plain HTTP server. With TLS active this should only receive ACME
/// challenges; without TLS it carries the whole dispatch.
pub async fn create_http_server(
	state: App,
	listen: &str,
	routers: Routers,
) -> Result<tokio::task::JoinHandle<Result<(), std::io::Error>>, std::io::Error> {
	let addr = SocketAddr::from_str(listen).map_err(|_| std::io::ErrorKind::InvalidInput)?;
	let http_server = axum_server::bind(addr);

	let svc = tower::service_fn(move |req: Request<hyper::body::Incoming>| {
		dispatch(state.clone(), routers.clone(), req.map(Body::new))
	});

	info!("Listening on HTTP {}", &listen);
	let handle = tokio::spawn(async move {
		http_server.serve(svc.into_make_service_with_connect_info::<SocketAddr>()).await
	});

	Ok(handle)
}

// vim: ts=4

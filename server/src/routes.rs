//! API routes and the site serving entry point

use axum::{
	body::Body,
	extract::{State, WebSocketUpgrade},
	http::{header, HeaderValue, Request, StatusCode},
	middleware,
	response::{IntoResponse, Response},
	routing::{any, delete, get, post, put},
	Router,
};
use tower_http::{compression::CompressionLayer, set_header::SetResponseHeaderLayer};

use crate::admin;
use crate::alias::{self, Resolution, SPLIT_COOKIE};
use crate::analytics;
use crate::auth;
use crate::core::extract::{Auth, RequestId, SiteCtx};
use crate::core::middleware::{optional_auth, request_id_middleware, require_admin, require_auth};
use crate::core::utils::{cookie_value, session_cookie};
use crate::core::webserver::Routers;
use crate::core::ws_broadcast;
use crate::prelude::*;
use crate::serverless;
use crate::vfs::serve::{self, not_found_response, ServeRequest};
use fazt_types::utils::random_id;

// ============================================================================
// PROTECTED ROUTES - admin role required (localhost dev host relaxes this)
// ============================================================================
fn init_protected_routes() -> Router<App> {
	Router::new()
		// --- Applications ---
		.route("/api/apps", get(admin::apps::list_apps))
		.route("/api/apps", post(admin::apps::create_app))
		.route("/api/apps/{id}", get(admin::apps::get_app))
		.route("/api/apps/{id}", put(admin::apps::update_app))
		.route("/api/apps/{id}", delete(admin::apps::delete_app))
		.route("/api/apps/{id}/files", get(admin::apps::list_app_files))
		.route("/api/apps/{id}/files/{*path}", get(admin::apps::get_app_file))
		.route("/api/apps/{id}/fork", post(admin::apps::fork_app))
		.route("/api/apps/{id}/lineage", get(admin::apps::get_lineage))
		.route("/api/apps/{id}/deployments", get(admin::apps::list_deployments))

		// --- Aliases ---
		.route("/api/aliases", get(admin::aliases::list_aliases))
		.route("/api/aliases", post(admin::aliases::create_alias))
		.route("/api/aliases/swap", post(admin::aliases::swap_aliases))
		.route("/api/aliases/{subdomain}", get(admin::aliases::get_alias))
		.route("/api/aliases/{subdomain}", put(admin::aliases::update_alias))
		.route("/api/aliases/{subdomain}", delete(admin::aliases::delete_alias))
		.route("/api/aliases/{subdomain}/reserve", post(admin::aliases::reserve_alias))
		.route("/api/aliases/{subdomain}/split", post(admin::aliases::split_alias))

		// --- Users ---
		.route("/api/users", get(admin::users::list_users))
		.route("/api/users/{id}", get(admin::users::get_user))
		.route("/api/users/{id}/role", put(admin::users::update_user_role))
		.route("/api/users/{id}", delete(admin::users::delete_user))

		// --- Invites ---
		.route("/api/invites", get(admin::invites::list_invites))
		.route("/api/invites", post(admin::invites::create_invite))
		.route("/api/invites/{code}", delete(admin::invites::delete_invite))

		// --- API keys ---
		.route("/api/api-keys", get(admin::api_keys::list_api_keys))
		.route("/api/api-keys", post(admin::api_keys::create_api_key))
		.route("/api/api-keys/{id}", delete(admin::api_keys::delete_api_key))

		// --- Egress allowlist ---
		.route("/api/egress", get(admin::egress::list_rules))
		.route("/api/egress", post(admin::egress::create_rule))
		.route("/api/egress/{id}", delete(admin::egress::delete_rule))

		// --- System ---
		.route("/api/system/config", get(admin::system::get_config))
		.route("/api/audit", get(admin::system::list_audit_events))
		.route("/api/cmd", post(admin::cmd::post_cmd))
}

/// Deploy wants its own gate: a session below admin cannot deploy, but an
/// API key with the deploy scope can, whatever its user's role.
fn init_deploy_routes() -> Router<App> {
	Router::new()
		.route("/api/deploy", post(admin::deploy::post_deploy))
		.route_layer(middleware::from_fn(require_auth))
}

// ============================================================================
// PUBLIC ROUTES - reachable without authentication on the admin host
// ============================================================================
fn init_public_routes() -> Router<App> {
	Router::new()
		// --- Authentication ---
		.route("/api/login", post(auth::post_login))
		.route("/api/logout", post(auth::post_logout))
		.route("/api/auth/status", get(auth::get_status))
		.route("/api/auth/me", get(auth::get_me))
		.route("/api/invite/redeem", post(auth::post_invite_redeem))
		.route("/api/auth/oauth/{provider}", get(auth::get_oauth_start))
		.route("/api/auth/oauth/{provider}/callback", get(auth::get_oauth_callback))

		// --- Tracking beacon ---
		.route("/api/t", post(analytics::post_beacon))

		// --- Health ---
		.route("/health", get(admin::system::get_health))

		// --- ACME HTTP-01 ---
		.route("/.well-known/acme-challenge/{token}", get(crate::core::acme::get_acme_challenge))
}

async fn api_not_found() -> Error {
	Error::NotFound
}

/// The admin host service. `admin_gate` is `require_admin` in production
/// and `require_auth` for the localhost developer convenience host.
fn init_admin_service(
	app: App,
	admin_gate: fn(Request<Body>, middleware::Next) -> futures::future::BoxFuture<'static, FzResult<Response>>,
) -> Router {
	let cors_layer = tower_http::cors::CorsLayer::very_permissive();

	let protected = init_protected_routes().route_layer(middleware::from_fn(admin_gate));

	init_public_routes()
		.merge(protected)
		.merge(init_deploy_routes())
		.fallback(api_not_found)
		.layer(SetResponseHeaderLayer::if_not_present(
			header::CACHE_CONTROL,
			HeaderValue::from_static("no-store, no-cache"),
		))
		.layer(cors_layer)
		.layer(middleware::from_fn_with_state(app.clone(), optional_auth))
		.layer(middleware::from_fn(request_id_middleware))
		.layer(CompressionLayer::new())
		.with_state(app)
}

// ============================================================================
// SITE SERVICE - VFS serving, serverless dispatch, per-site WebSocket
// ============================================================================

/// GET /_ws - upgrade when the site has a backing application
async fn get_site_ws(
	State(app): State<App>,
	site: SiteCtx,
	ws: WebSocketUpgrade,
) -> Response {
	let resolution = alias::resolve(&app, &site.site_id, "").await;
	match resolution {
		Resolution::App { .. } => {
			let site_id = site.site_id.clone();
			ws.on_upgrade(move |socket| ws_broadcast::handle_socket(app, site_id, socket))
		}
		_ => not_found_response(&app).await,
	}
}

/// Every non-WebSocket site request lands here
async fn site_entry(State(app): State<App>, request: Request<Body>) -> Response {
	let (parts, body) = request.into_parts();

	let Some(site) = parts.extensions.get::<SiteCtx>().cloned() else {
		return not_found_response(&app).await;
	};
	let auth = parts.extensions.get::<Auth>().cloned().map(|a| a.0);
	let request_id = parts
		.extensions
		.get::<RequestId>()
		.cloned()
		.unwrap_or_else(|| RequestId(uuid::Uuid::new_v4().to_string()));

	// Sticky split identifier: the cookie when present, a fresh random
	// value otherwise
	let cookie_split_id = cookie_value(&parts.headers, SPLIT_COOKIE).map(str::to_owned);
	let split_id = cookie_split_id.clone().unwrap_or_else(random_id);

	let resolution = alias::resolve(&app, &site.site_id, &split_id).await;

	let (backing_app, file_site, via_split) = match resolution {
		Resolution::Redirect(url) => {
			return Response::builder()
				.status(StatusCode::MOVED_PERMANENTLY)
				.header(header::LOCATION, url.as_ref())
				.body(Body::empty())
				.unwrap_or_else(|_| not_found_sync());
		}
		Resolution::Reserved => return not_found_response(&app).await,
		Resolution::App { app: record, site_id, via_split } => {
			(Some(record), site_id, via_split)
		}
		Resolution::Legacy => (None, site.site_id.clone(), false),
	};

	let path = parts.uri.path();
	let mut response = if path == "/api" || path.starts_with("/api/") {
		let body_bytes = match axum::body::to_bytes(body, 2 * 1024 * 1024).await {
			Ok(bytes) => bytes.to_vec(),
			Err(_) => return Error::ValidationError("request body too large".into()).into_response(),
		};
		serverless::dispatch(
			&app,
			serverless::DispatchRequest {
				site_id: &file_site,
				app: backing_app.as_ref(),
				method: &parts.method,
				uri: &parts.uri,
				headers: &parts.headers,
				body: body_bytes,
				auth,
				request_id: &request_id.0,
			},
		)
		.await
	} else {
		serve::serve(
			&app,
			ServeRequest {
				site_id: &file_site,
				app: backing_app.as_ref(),
				method: &parts.method,
				raw_path: parts.uri.path(),
				headers: &parts.headers,
				auth: auth.as_ref(),
				force_not_found: site.not_found,
			},
		)
		.await
	};

	// Pin split visitors to their variant
	if via_split && cookie_split_id.is_none() {
		let cookie = session_cookie(
			SPLIT_COOKIE,
			&split_id,
			app.opts.session_ttl,
			app.opts.listen_https.is_some(),
		);
		if let Ok(value) = HeaderValue::from_str(&cookie) {
			response.headers_mut().append(header::SET_COOKIE, value);
		}
	}

	response
}

fn not_found_sync() -> Response {
	let mut response = Response::new(Body::from("Not Found"));
	*response.status_mut() = StatusCode::NOT_FOUND;
	response
}

fn init_site_service(app: App) -> Router {
	Router::new()
		.route("/_ws", any(get_site_ws))
		.route(
			"/.well-known/acme-challenge/{token}",
			get(crate::core::acme::get_acme_challenge),
		)
		.fallback(site_entry)
		.layer(middleware::from_fn_with_state(app.clone(), optional_auth))
		.layer(middleware::from_fn(request_id_middleware))
		.with_state(app)
}

fn admin_gate_strict(
	req: Request<Body>,
	next: middleware::Next,
) -> futures::future::BoxFuture<'static, FzResult<Response>> {
	Box::pin(require_admin(req, next))
}

fn admin_gate_dev(
	req: Request<Body>,
	next: middleware::Next,
) -> futures::future::BoxFuture<'static, FzResult<Response>> {
	Box::pin(require_auth(req, next))
}

pub fn init(app: App) -> Routers {
	Routers {
		admin: init_admin_service(app.clone(), admin_gate_strict),
		dev: init_admin_service(app.clone(), admin_gate_dev),
		site: init_site_service(app),
	}
}

// vim: ts=4

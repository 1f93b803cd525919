//! Serverless executor tests: handler dispatch, KV scoping through the
//! host API, egress denial, failure mapping.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use tower::ServiceExt;

use common::{build_zip, create_owner, session_cookie_for, test_state};
use fazt_server::core::extract::SiteCtx;
use fazt_server::deploy::{deploy_site, DeployParams};
use fazt_server::routes;
use fazt_types::meta_adapter::{MetaAdapter, SourceInfo, ANON_USER};

async fn deploy_handler(app: &fazt_server::core::app::App, site: &str, script: &str) {
	let archive = build_zip(&[
		("index.html", b"<h1>app</h1>".as_slice()),
		("api/main.js", script.as_bytes()),
	]);
	deploy_site(
		app,
		DeployParams { site_name: site, source: SourceInfo::Deploy, actor: None },
		&archive,
	)
	.await
	.expect("deploy");
}

fn api_request(site: &str, path: &str, cookie: Option<&str>) -> Request<Body> {
	let mut builder = Request::builder().method("POST").uri(path);
	if let Some(cookie) = cookie {
		builder = builder.header(header::COOKIE, cookie.to_string());
	}
	let mut req = builder.body(Body::from("{}")).expect("request");
	req.extensions_mut().insert(SiteCtx {
		site_id: site.into(),
		not_found: false,
		local_tunnel: false,
	});
	common::with_conn(req)
}

async fn body_string(response: axum::response::Response) -> String {
	let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024).await.expect("body");
	String::from_utf8_lossy(&bytes).into_owned()
}

#[tokio::test(flavor = "multi_thread")]
async fn handler_returns_text_and_shaped_responses() {
	let (app, _tmp) = test_state().await;
	deploy_handler(
		&app,
		"demo",
		r#"
		function handler(request) {
			if (request.path === "/api/shaped") {
				return { status: 201, headers: { "x-from": "handler" }, json: { ok: true } };
			}
			return "plain text answer";
		}
		"#,
	)
	.await;

	let site = routes::init(app.clone()).site;

	let response = site.clone().oneshot(api_request("demo", "/api", None)).await.expect("response");
	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(
		response.headers().get(header::CONTENT_TYPE).unwrap(),
		"text/plain; charset=utf-8"
	);
	assert_eq!(body_string(response).await, "plain text answer");

	let response =
		site.clone().oneshot(api_request("demo", "/api/shaped", None)).await.expect("response");
	assert_eq!(response.status(), StatusCode::CREATED);
	assert_eq!(response.headers().get("x-from").unwrap(), "handler");
	assert!(body_string(response).await.contains("\"ok\":true"));
}

#[tokio::test(flavor = "multi_thread")]
async fn api_paths_without_handler_are_not_found() {
	let (app, _tmp) = test_state().await;
	let archive = build_zip(&[("index.html", b"static only".as_slice())]);
	deploy_site(
		&app,
		DeployParams { site_name: "plain", source: SourceInfo::Deploy, actor: None },
		&archive,
	)
	.await
	.expect("deploy");

	let site = routes::init(app.clone()).site;
	let response = site.oneshot(api_request("plain", "/api/x", None)).await.expect("response");
	assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread")]
async fn kv_is_scoped_to_the_dispatching_app() {
	let (app, _tmp) = test_state().await;

	let script = r#"
	function handler(request) {
		if (request.path === "/api/write") {
			fazt.kv.set("greeting", { msg: "hello" });
			return "written";
		}
		var value = fazt.kv.get("greeting");
		return { json: { value: value } };
	}
	"#;
	deploy_handler(&app, "alpha", script).await;
	deploy_handler(&app, "beta", script).await;

	let site = routes::init(app.clone()).site;

	let response =
		site.clone().oneshot(api_request("alpha", "/api/write", None)).await.expect("response");
	assert_eq!(response.status(), StatusCode::OK);

	// alpha reads its own value back
	let response =
		site.clone().oneshot(api_request("alpha", "/api/read", None)).await.expect("response");
	assert!(body_string(response).await.contains("hello"));

	// beta runs the same code but sees nothing: the app id comes from
	// dispatch, not from the handler
	let response =
		site.clone().oneshot(api_request("beta", "/api/read", None)).await.expect("response");
	assert!(body_string(response).await.contains("null"));

	// The substrate confirms which scope the row landed in
	let alpha_alias = app.meta_adapter.read_alias("alpha").await.expect("alias");
	if let fazt_types::meta_adapter::AliasTarget::App { app_id } = alpha_alias.target {
		let value = app.meta_adapter.kv_get(&app_id, ANON_USER, "greeting").await.expect("kv");
		assert!(value.is_some());
	} else {
		panic!("alpha should be an app alias");
	}
}

#[tokio::test(flavor = "multi_thread")]
async fn kv_rows_are_scoped_per_user_session() {
	let (app, _tmp) = test_state().await;
	let owner = create_owner(&app).await;
	let cookie = session_cookie_for(&app, &owner.user_id).await;

	let script = r#"
	function handler(request) {
		if (request.path === "/api/write") {
			fazt.kv.set("private-note", "mine");
			return "ok";
		}
		return { json: { value: fazt.kv.get("private-note") } };
	}
	"#;
	deploy_handler(&app, "notes", script).await;

	let site = routes::init(app.clone()).site;

	// Write as the authenticated user
	let response = site
		.clone()
		.oneshot(api_request("notes", "/api/write", Some(&cookie)))
		.await
		.expect("response");
	assert_eq!(response.status(), StatusCode::OK);

	// The same user reads it back
	let response = site
		.clone()
		.oneshot(api_request("notes", "/api/read", Some(&cookie)))
		.await
		.expect("response");
	assert!(body_string(response).await.contains("mine"));

	// An anonymous request is a different scope
	let response =
		site.clone().oneshot(api_request("notes", "/api/read", None)).await.expect("response");
	assert!(body_string(response).await.contains("null"));
}

#[tokio::test(flavor = "multi_thread")]
async fn require_login_maps_to_401() {
	let (app, _tmp) = test_state().await;
	let owner = create_owner(&app).await;
	let cookie = session_cookie_for(&app, &owner.user_id).await;

	deploy_handler(
		&app,
		"gated",
		r#"
		function handler(request) {
			var user = fazt.requireLogin();
			return { json: { email: user.email } };
		}
		"#,
	)
	.await;

	let site = routes::init(app.clone()).site;

	let response =
		site.clone().oneshot(api_request("gated", "/api", None)).await.expect("response");
	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

	let response = site
		.clone()
		.oneshot(api_request("gated", "/api", Some(&cookie)))
		.await
		.expect("response");
	assert_eq!(response.status(), StatusCode::OK);
	assert!(body_string(response).await.contains("owner@example.com"));
}

#[tokio::test(flavor = "multi_thread")]
async fn egress_without_allowlist_entry_is_denied() {
	let (app, _tmp) = test_state().await;
	deploy_handler(
		&app,
		"fetcher",
		r#"
		function handler(request) {
			fazt.fetch("http://evil.example/");
			return "should not get here";
		}
		"#,
	)
	.await;

	let site = routes::init(app.clone()).site;
	let response = site.oneshot(api_request("fetcher", "/api", None)).await.expect("response");

	// The denial surfaces as the handler's uncaught throw: 500, generic body
	assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
	let body = body_string(response).await;
	assert!(!body.contains("evil.example"), "error details must not leak to the client");
}

#[tokio::test(flavor = "multi_thread")]
async fn egress_pipeline_enforces_scheme_and_rate() {
	use fazt_server::serverless::egress::FetchOptions;
	use fazt_types::error::Error;
	use fazt_types::meta_adapter::CreateEgressRule;

	let (app, _tmp) = test_state().await;

	fn rule(domain: &str, allow_http: bool, rate: Option<u32>) -> CreateEgressRule<'_> {
		CreateEgressRule {
			domain,
			app_id: None,
			allow_http,
			rate_per_min: rate,
			burst: rate.map(|_| 1),
			timeout_ms: Some(1000),
			max_response_bytes: None,
			cache_ttl_secs: None,
			secret: None,
		}
	}

	// No allowlist entry at all: permission error before any connection
	let err = app
		.egress
		.fetch(&app.meta_adapter, "app_x", "https://nowhere.invalid/", &FetchOptions::default())
		.await
		.unwrap_err();
	assert!(matches!(err, Error::PermissionDenied));

	// HTTPS-only entry refuses a plaintext URL
	app.meta_adapter.create_egress_rule(&rule("secure.invalid", false, None)).await.unwrap();
	let err = app
		.egress
		.fetch(&app.meta_adapter, "app_x", "http://secure.invalid/", &FetchOptions::default())
		.await
		.unwrap_err();
	assert!(matches!(err, Error::PermissionDenied));

	// Non-HTTP schemes never pass the parser
	let err = app
		.egress
		.fetch(&app.meta_adapter, "app_x", "file:///etc/passwd", &FetchOptions::default())
		.await
		.unwrap_err();
	assert!(matches!(err, Error::ValidationError(_)));

	// Token bucket: the first call consumes the only token (the connection
	// itself is refused, which is fine), the second is throttled
	app.meta_adapter.create_egress_rule(&rule("127.0.0.1", true, Some(1))).await.unwrap();
	let first = app
		.egress
		.fetch(&app.meta_adapter, "app_x", "http://127.0.0.1:1/", &FetchOptions::default())
		.await;
	assert!(first.is_err());
	let second = app
		.egress
		.fetch(&app.meta_adapter, "app_x", "http://127.0.0.1:1/", &FetchOptions::default())
		.await
		.unwrap_err();
	assert!(matches!(second, Error::RateLimited));
}

#[tokio::test(flavor = "multi_thread")]
async fn handler_exceptions_become_generic_500s() {
	let (app, _tmp) = test_state().await;
	deploy_handler(
		&app,
		"crashy",
		r#"
		function handler(request) {
			throw new Error("database password is hunter2");
		}
		"#,
	)
	.await;

	let site = routes::init(app.clone()).site;
	let response = site.oneshot(api_request("crashy", "/api", None)).await.expect("response");
	assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
	assert!(!body_string(response).await.contains("hunter2"));
}

#[tokio::test(flavor = "multi_thread")]
async fn compile_errors_are_not_cached() {
	let (app, _tmp) = test_state().await;
	deploy_handler(&app, "broken", "this is not javascript {{{").await;

	let site = routes::init(app.clone()).site;
	let response =
		site.clone().oneshot(api_request("broken", "/api", None)).await.expect("response");
	assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

	// Redeploy with a working handler; the fixed script must run
	deploy_handler(&app, "broken", r#"function handler(r) { return "fixed"; }"#).await;
	let response =
		site.clone().oneshot(api_request("broken", "/api", None)).await.expect("response");
	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(body_string(response).await, "fixed");
}

// vim: ts=4

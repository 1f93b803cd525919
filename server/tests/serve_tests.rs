//! Static serving engine tests: resolution order, conditional GET, cache
//! classes, SPA fallback, private paths, alias swap visibility.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use tower::ServiceExt;

use common::{build_zip, create_owner, session_cookie_for, test_state, APEX};
use fazt_server::core::extract::SiteCtx;
use fazt_server::deploy::{deploy_site, DeployParams};
use fazt_server::routes;
use fazt_types::meta_adapter::{MetaAdapter, SourceInfo};

fn site_request(site: &str, path: &str) -> Request<Body> {
	site_request_with(site, path, |builder| builder)
}

fn site_request_with(
	site: &str,
	path: &str,
	customize: impl FnOnce(axum::http::request::Builder) -> axum::http::request::Builder,
) -> Request<Body> {
	let builder = Request::builder()
		.method("GET")
		.uri(path)
		.header(header::HOST, format!("{}.{}", site, APEX));
	let mut req = customize(builder).body(Body::empty()).expect("request");
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
async fn deploy_and_serve_html() {
	let (app, _tmp) = test_state().await;
	let archive = build_zip(&[
		("index.html", b"<html><body>Hello</body></html>".as_slice()),
		("css/s.css", b"body{}"),
	]);
	deploy_site(
		&app,
		DeployParams { site_name: "demo", source: SourceInfo::Deploy, actor: None },
		&archive,
	)
	.await
	.expect("deploy");

	let site = routes::init(app.clone()).site;

	let response = site.clone().oneshot(site_request("demo", "/")).await.expect("response");
	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(
		response.headers().get(header::CONTENT_TYPE).unwrap(),
		"text/html; charset=utf-8"
	);
	assert_eq!(response.headers().get(header::CACHE_CONTROL).unwrap(), "no-cache");
	let etag = response.headers().get(header::ETAG).expect("etag").clone();
	assert!(!etag.is_empty());
	let body = body_string(response).await;
	assert!(body.contains("Hello"));

	// Conditional GET round-trips to 304 with an empty body
	let response = site
		.clone()
		.oneshot(site_request_with("demo", "/", |b| {
			b.header(header::IF_NONE_MATCH, etag.clone())
		}))
		.await
		.expect("response");
	assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
	assert!(body_string(response).await.is_empty());

	// Non-HTML assets get the default shared cache class
	let response =
		site.clone().oneshot(site_request("demo", "/css/s.css")).await.expect("response");
	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(
		response.headers().get(header::CACHE_CONTROL).unwrap(),
		"public, max-age=300"
	);
}

#[tokio::test(flavor = "multi_thread")]
async fn html_responses_carry_the_beacon() {
	let (app, _tmp) = test_state().await;
	let archive = build_zip(&[("index.html", b"<html><body>Hi</body></html>".as_slice())]);
	deploy_site(
		&app,
		DeployParams { site_name: "demo", source: SourceInfo::Deploy, actor: None },
		&archive,
	)
	.await
	.expect("deploy");

	let site = routes::init(app.clone()).site;
	let response = site.oneshot(site_request("demo", "/")).await.expect("response");
	let body = body_string(response).await;
	assert!(body.contains("sendBeacon"), "beacon snippet must ride along in VFS HTML");
}

#[tokio::test(flavor = "multi_thread")]
async fn hashed_assets_are_immutable() {
	let (app, _tmp) = test_state().await;
	let archive = build_zip(&[
		("index.html", b"<h1>x</h1>".as_slice()),
		("assets/app.js", b"let x=1"),
		("js/app-3f9a01bc.js", b"let y=2"),
	]);
	deploy_site(
		&app,
		DeployParams { site_name: "demo", source: SourceInfo::Deploy, actor: None },
		&archive,
	)
	.await
	.expect("deploy");

	let site = routes::init(app.clone()).site;
	for path in ["/assets/app.js", "/js/app-3f9a01bc.js"] {
		let response = site.clone().oneshot(site_request("demo", path)).await.expect("response");
		assert_eq!(
			response.headers().get(header::CACHE_CONTROL).unwrap(),
			"public, max-age=31536000, immutable",
			"path {}",
			path
		);
	}
}

#[tokio::test(flavor = "multi_thread")]
async fn spa_fallback_serves_index_for_extensionless_misses() {
	let (app, _tmp) = test_state().await;
	let archive = build_zip(&[
		("index.html", b"<html><body>SPA Root</body></html>".as_slice()),
		("fazt.json", br#"{"name":"spa-app","spa":true}"#),
	]);
	deploy_site(
		&app,
		DeployParams { site_name: "spa-app", source: SourceInfo::Deploy, actor: None },
		&archive,
	)
	.await
	.expect("deploy");

	let site = routes::init(app.clone()).site;

	// Extensionless client route falls back to index.html with 200
	let response =
		site.clone().oneshot(site_request("spa-app", "/dashboard")).await.expect("response");
	assert_eq!(response.status(), StatusCode::OK);
	assert!(body_string(response).await.contains("SPA Root"));

	let response = site
		.clone()
		.oneshot(site_request("spa-app", "/dashboard/settings"))
		.await
		.expect("response");
	assert_eq!(response.status(), StatusCode::OK);

	// Asset extensions are excluded from the fallback
	let response =
		site.clone().oneshot(site_request("spa-app", "/missing.js")).await.expect("response");
	assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread")]
async fn trailing_slash_redirects_to_canonical_form() {
	let (app, _tmp) = test_state().await;
	let archive = build_zip(&[("docs/guide.txt", b"text".as_slice()), ("index.html", b"root")]);
	deploy_site(
		&app,
		DeployParams { site_name: "demo", source: SourceInfo::Deploy, actor: None },
		&archive,
	)
	.await
	.expect("deploy");

	let site = routes::init(app.clone()).site;
	let response =
		site.clone().oneshot(site_request("demo", "/docs/guide.txt/")).await.expect("response");
	assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
	assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/docs/guide.txt");
}

#[tokio::test(flavor = "multi_thread")]
async fn directory_index_resolution() {
	let (app, _tmp) = test_state().await;
	let archive = build_zip(&[
		("index.html", b"root".as_slice()),
		("docs/index.html", b"docs index"),
	]);
	deploy_site(
		&app,
		DeployParams { site_name: "demo", source: SourceInfo::Deploy, actor: None },
		&archive,
	)
	.await
	.expect("deploy");

	let site = routes::init(app.clone()).site;
	let response = site.clone().oneshot(site_request("demo", "/docs")).await.expect("response");
	assert_eq!(response.status(), StatusCode::OK);
	assert!(body_string(response).await.contains("docs index"));
}

#[tokio::test(flavor = "multi_thread")]
async fn traversal_paths_are_rejected() {
	let (app, _tmp) = test_state().await;
	let archive = build_zip(&[("index.html", b"x".as_slice())]);
	deploy_site(
		&app,
		DeployParams { site_name: "demo", source: SourceInfo::Deploy, actor: None },
		&archive,
	)
	.await
	.expect("deploy");

	let site = routes::init(app.clone()).site;
	let response = site
		.clone()
		.oneshot(site_request("demo", "/%2e%2e/secrets"))
		.await
		.expect("response");
	assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread")]
async fn private_prefix_requires_a_session() {
	let (app, _tmp) = test_state().await;
	let archive = build_zip(&[
		("index.html", b"public".as_slice()),
		("private/report.txt", b"secret report"),
	]);
	deploy_site(
		&app,
		DeployParams { site_name: "demo", source: SourceInfo::Deploy, actor: None },
		&archive,
	)
	.await
	.expect("deploy");

	let owner = create_owner(&app).await;
	let cookie = session_cookie_for(&app, &owner.user_id).await;

	let site = routes::init(app.clone()).site;

	// Anonymous: 401
	let response = site
		.clone()
		.oneshot(site_request("demo", "/private/report.txt"))
		.await
		.expect("response");
	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

	// With a session: 200
	let response = site
		.clone()
		.oneshot(site_request_with("demo", "/private/report.txt", |b| {
			b.header(header::COOKIE, cookie.clone())
		}))
		.await
		.expect("response");
	assert_eq!(response.status(), StatusCode::OK);
	assert!(body_string(response).await.contains("secret report"));

	// Public paths stay public
	let response = site.clone().oneshot(site_request("demo", "/")).await.expect("response");
	assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread")]
async fn alias_swap_switches_served_content() {
	let (app, _tmp) = test_state().await;

	let v1 = build_zip(&[("index.html", b"version one".as_slice())]);
	let v2 = build_zip(&[("index.html", b"version two".as_slice())]);
	deploy_site(
		&app,
		DeployParams { site_name: "tetris", source: SourceInfo::Deploy, actor: None },
		&v1,
	)
	.await
	.expect("deploy v1");
	deploy_site(
		&app,
		DeployParams { site_name: "tetris-next", source: SourceInfo::Deploy, actor: None },
		&v2,
	)
	.await
	.expect("deploy v2");

	app.meta_adapter.swap_aliases("tetris", "tetris-next").await.expect("swap");

	let site = routes::init(app.clone()).site;

	let response = site.clone().oneshot(site_request("tetris", "/")).await.expect("response");
	assert!(body_string(response).await.contains("version two"));

	let response =
		site.clone().oneshot(site_request("tetris-next", "/")).await.expect("response");
	assert!(body_string(response).await.contains("version one"));
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_site_is_not_found() {
	let (app, _tmp) = test_state().await;
	let site = routes::init(app.clone()).site;
	let response = site.oneshot(site_request("ghost", "/")).await.expect("response");
	assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// vim: ts=4

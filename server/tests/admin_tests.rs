//! Control-plane tests: login, role gates, role currency, invites, cmd
//! gateway, deploy endpoint, health.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use tower::ServiceExt;

use common::{build_zip, create_owner, session_cookie_for, test_state, with_conn};
use fazt_server::routes;
use fazt_types::auth_adapter::{AuthAdapter, CreateUser};
use fazt_types::types::Role;

async fn body_json(response: axum::response::Response) -> serde_json::Value {
	let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024).await.expect("body");
	serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
}

fn json_request(method: &str, path: &str, body: serde_json::Value) -> Request<Body> {
	with_conn(
		Request::builder()
			.method(method)
			.uri(path)
			.header(header::CONTENT_TYPE, "application/json")
			.body(Body::from(body.to_string()))
			.expect("request"),
	)
}

fn get_request(path: &str, cookie: Option<&str>) -> Request<Body> {
	let mut builder = Request::builder().method("GET").uri(path);
	if let Some(cookie) = cookie {
		builder = builder.header(header::COOKIE, cookie.to_string());
	}
	with_conn(builder.body(Body::empty()).expect("request"))
}

#[tokio::test(flavor = "multi_thread")]
async fn login_sets_cookie_and_rejects_bad_credentials() {
	let (app, _tmp) = test_state().await;
	create_owner(&app).await;

	let admin = routes::init(app.clone()).admin;

	let response = admin
		.clone()
		.oneshot(json_request(
			"POST",
			"/api/login",
			serde_json::json!({"username": "owner@example.com", "password": "hunter2hunter2"}),
		))
		.await
		.expect("response");
	assert_eq!(response.status(), StatusCode::OK);
	let set_cookie = response
		.headers()
		.get(header::SET_COOKIE)
		.expect("session cookie")
		.to_str()
		.expect("cookie str");
	assert!(set_cookie.starts_with("fazt_session="));
	assert!(set_cookie.contains("HttpOnly"));
	assert!(set_cookie.contains("SameSite=Lax"));

	let response = admin
		.clone()
		.oneshot(json_request(
			"POST",
			"/api/login",
			serde_json::json!({"username": "owner@example.com", "password": "wrong"}),
		))
		.await
		.expect("response");
	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test(flavor = "multi_thread")]
async fn login_throttles_after_repeated_failures() {
	let (app, _tmp) = test_state().await;
	create_owner(&app).await;
	let admin = routes::init(app.clone()).admin;

	let mut last_status = StatusCode::OK;
	for _ in 0..12 {
		let response = admin
			.clone()
			.oneshot(json_request(
				"POST",
				"/api/login",
				serde_json::json!({"username": "owner@example.com", "password": "nope"}),
			))
			.await
			.expect("response");
		last_status = response.status();
	}
	assert_eq!(last_status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test(flavor = "multi_thread")]
async fn admin_gate_distinguishes_401_and_403() {
	let (app, _tmp) = test_state().await;
	let owner = create_owner(&app).await;
	let user = app
		.auth_adapter
		.create_user(&CreateUser {
			email: "user@example.com",
			name: "User",
			avatar_url: None,
			provider: "local",
			role: Role::User,
			password: Some("password123"),
		})
		.await
		.expect("user");

	let owner_cookie = session_cookie_for(&app, &owner.user_id).await;
	let user_cookie = session_cookie_for(&app, &user.user_id).await;

	let admin = routes::init(app.clone()).admin;

	// No credential: 401
	let response = admin
		.clone()
		.oneshot(get_request("/api/system/config", None))
		.await
		.expect("response");
	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

	// Authenticated but below admin: 403
	let response = admin
		.clone()
		.oneshot(get_request("/api/system/config", Some(&user_cookie)))
		.await
		.expect("response");
	assert_eq!(response.status(), StatusCode::FORBIDDEN);

	// Owner: 200
	let response = admin
		.clone()
		.oneshot(get_request("/api/system/config", Some(&owner_cookie)))
		.await
		.expect("response");
	assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread")]
async fn demotion_takes_effect_on_the_next_request() {
	let (app, _tmp) = test_state().await;
	create_owner(&app).await;
	let admin_user = app
		.auth_adapter
		.create_user(&CreateUser {
			email: "admin@example.com",
			name: "Admin",
			avatar_url: None,
			provider: "local",
			role: Role::Admin,
			password: Some("password123"),
		})
		.await
		.expect("admin user");
	let cookie = session_cookie_for(&app, &admin_user.user_id).await;

	let admin = routes::init(app.clone()).admin;

	let response = admin
		.clone()
		.oneshot(get_request("/api/system/config", Some(&cookie)))
		.await
		.expect("response");
	assert_eq!(response.status(), StatusCode::OK);

	// Demote; the same session token must now be refused
	app.auth_adapter.update_user_role(&admin_user.user_id, Role::User).await.expect("demote");

	let response = admin
		.clone()
		.oneshot(get_request("/api/system/config", Some(&cookie)))
		.await
		.expect("response");
	assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test(flavor = "multi_thread")]
async fn invite_redeem_endpoint_reports_conflicts() {
	let (app, _tmp) = test_state().await;
	let owner = create_owner(&app).await;
	let owner_cookie = session_cookie_for(&app, &owner.user_id).await;

	let admin = routes::init(app.clone()).admin;

	// Create a single-use invite through the control plane
	let response = admin
		.clone()
		.oneshot({
			let mut req = json_request(
				"POST",
				"/api/invites",
				serde_json::json!({"role": "user", "max_uses": 1}),
			);
			req.headers_mut().insert(
				header::COOKIE,
				header::HeaderValue::from_str(&owner_cookie).expect("cookie"),
			);
			req
		})
		.await
		.expect("response");
	assert_eq!(response.status(), StatusCode::CREATED);
	let invite = body_json(response).await;
	let code = invite["data"]["code"].as_str().expect("code").to_string();

	// First redemption: 201
	let response = admin
		.clone()
		.oneshot(json_request(
			"POST",
			"/api/invite/redeem",
			serde_json::json!({"code": code, "email": "new@example.com", "name": "New"}),
		))
		.await
		.expect("response");
	assert_eq!(response.status(), StatusCode::CREATED);

	// Second redemption: 409
	let response = admin
		.clone()
		.oneshot(json_request(
			"POST",
			"/api/invite/redeem",
			serde_json::json!({"code": code, "email": "late@example.com", "name": "Late"}),
		))
		.await
		.expect("response");
	assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test(flavor = "multi_thread")]
async fn deploy_endpoint_requires_deploy_scope() {
	let (app, _tmp) = test_state().await;
	let owner = create_owner(&app).await;
	let owner_cookie = session_cookie_for(&app, &owner.user_id).await;

	let admin = routes::init(app.clone()).admin;
	let archive = build_zip(&[("index.html", b"deployed".as_slice())]);

	let boundary = "X-FAZT-TEST-BOUNDARY";
	let mut body = Vec::new();
	body.extend_from_slice(
		format!(
			"--{b}\r\ncontent-disposition: form-data; name=\"site_name\"\r\n\r\ndemo\r\n--{b}\r\ncontent-disposition: form-data; name=\"file\"; filename=\"site.zip\"\r\ncontent-type: application/zip\r\n\r\n",
			b = boundary
		)
		.as_bytes(),
	);
	body.extend_from_slice(&archive);
	body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

	let make_request = |cookie: Option<&str>| {
		let mut builder = Request::builder()
			.method("POST")
			.uri("/api/deploy")
			.header(
				header::CONTENT_TYPE,
				format!("multipart/form-data; boundary={}", boundary),
			);
		if let Some(cookie) = cookie {
			builder = builder.header(header::COOKIE, cookie.to_string());
		}
		with_conn(builder.body(Body::from(body.clone())).expect("request"))
	};

	// Anonymous: 401
	let response = admin.clone().oneshot(make_request(None)).await.expect("response");
	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

	// Owner session (no scope restriction): 201
	let response =
		admin.clone().oneshot(make_request(Some(&owner_cookie))).await.expect("response");
	assert_eq!(response.status(), StatusCode::CREATED);

	// The deployed site exists
	let files = app
		.meta_adapter
		.list_files("demo")
		.await
		.expect("files");
	assert_eq!(files.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn cmd_gateway_whitelists_commands() {
	let (app, _tmp) = test_state().await;
	let owner = create_owner(&app).await;
	let cookie = session_cookie_for(&app, &owner.user_id).await;

	let admin = routes::init(app.clone()).admin;

	let send = |command: &str| {
		let mut req = json_request(
			"POST",
			"/api/cmd",
			serde_json::json!({"command": command, "args": []}),
		);
		req.headers_mut().insert(
			header::COOKIE,
			header::HeaderValue::from_str(&cookie).expect("cookie"),
		);
		req
	};

	let response = admin.clone().oneshot(send("version")).await.expect("response");
	assert_eq!(response.status(), StatusCode::OK);
	let json = body_json(response).await;
	assert_eq!(json["success"], true);

	let response = admin.clone().oneshot(send("rm-rf-everything")).await.expect("response");
	let json = body_json(response).await;
	assert_eq!(json["success"], false);
	assert!(json["error"].as_str().expect("error").contains("unknown command"));
}

#[tokio::test(flavor = "multi_thread")]
async fn health_reports_storage_liveness() {
	let (app, _tmp) = test_state().await;
	let admin = routes::init(app.clone()).admin;

	let response = admin.clone().oneshot(get_request("/health", None)).await.expect("response");
	assert_eq!(response.status(), StatusCode::OK);

	// Closing the substrate flips health to 503
	app.auth_adapter.close().await;
	let response = admin.clone().oneshot(get_request("/health", None)).await.expect("response");
	assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test(flavor = "multi_thread")]
async fn dev_router_skips_the_role_gate() {
	let (app, _tmp) = test_state().await;
	create_owner(&app).await;
	let user = app
		.auth_adapter
		.create_user(&CreateUser {
			email: "dev@example.com",
			name: "Dev",
			avatar_url: None,
			provider: "local",
			role: Role::User,
			password: Some("password123"),
		})
		.await
		.expect("user");
	let cookie = session_cookie_for(&app, &user.user_id).await;

	let routers = routes::init(app.clone());

	// The strict router refuses a plain user
	let response = routers
		.admin
		.clone()
		.oneshot(get_request("/api/apps", Some(&cookie)))
		.await
		.expect("response");
	assert_eq!(response.status(), StatusCode::FORBIDDEN);

	// The localhost dev router only wants authentication
	let response = routers
		.dev
		.clone()
		.oneshot(get_request("/api/apps", Some(&cookie)))
		.await
		.expect("response");
	assert_eq!(response.status(), StatusCode::OK);

	// But still authentication
	let response =
		routers.dev.clone().oneshot(get_request("/api/apps", None)).await.expect("response");
	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// vim: ts=4

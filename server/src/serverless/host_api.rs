//! The `fazt` host API exposed to serverless handlers.
//!
//! The capability set is fixed: auth introspection, per-app/per-user KV,
//! allowlisted outbound HTTP, structured logging. Every operation is
//! scoped by the app id and user id captured at dispatch; nothing here
//! accepts a scope from handler arguments. Host calls that need the
//! async runtime block the worker thread on a runtime handle, the same
//! bridge the TLS cert resolver uses.

use boa_engine::{
	js_string,
	object::ObjectInitializer,
	property::Attribute,
	Context, JsNativeError, JsResult, JsValue, NativeFunction, Source,
};
use boa_gc::{empty_trace, Finalize, Trace};
use std::cell::RefCell;
use std::rc::Rc;

use crate::prelude::*;
use fazt_types::auth_adapter::AuthCtx;
use fazt_types::meta_adapter::ANON_USER;

use super::egress::FetchOptions;

/// Thrown by `fazt.requireLogin()`; the executor maps it to a 401
const LOGIN_REQUIRED: &str = "fazt:login-required";

/// Upper bound for `kv.find` results
const KV_FIND_LIMIT: u32 = 100;

#[derive(Debug)]
pub enum ScriptError {
	/// The script failed to evaluate; not cached
	Compile(String),
	/// The handler threw during this invocation
	Runtime(String),
	/// `requireLogin` on an anonymous request
	Unauthorized,
	/// The script evaluated but defines no callable `handler`
	NoHandler,
}

impl std::fmt::Display for ScriptError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			ScriptError::Compile(msg) => write!(f, "compile error: {}", msg),
			ScriptError::Runtime(msg) => write!(f, "runtime error: {}", msg),
			ScriptError::Unauthorized => write!(f, "login required"),
			ScriptError::NoHandler => write!(f, "no handler defined"),
		}
	}
}

pub struct ScriptOutcome {
	pub result: Result<serde_json::Value, ScriptError>,
	pub logs: Vec<String>,
}

/// Everything a handler invocation is allowed to reach
pub struct HostEnv {
	pub handle: tokio::runtime::Handle,
	pub app: App,
	pub app_id: Box<str>,
	pub user_id: Box<str>,
	pub user: Option<AuthCtx>,
}

struct HostInner {
	env: HostEnv,
	user_json: serde_json::Value,
	logs: RefCell<Vec<String>>,
}

/// Capture handed to native functions. Contains no GC pointers, so the
/// empty trace is sound.
#[derive(Clone)]
struct HostCtx {
	inner: Rc<HostInner>,
}

impl Finalize for HostCtx {}

#[allow(unsafe_code)]
// SAFETY: HostCtx holds no GC-managed values
unsafe impl Trace for HostCtx {
	empty_trace!();
}

/// Evaluate the script and invoke `handler(request)`. Runs on a worker
/// thread; the calling task enforces the wall-clock budget.
pub fn run_script(source: &str, request: &serde_json::Value, env: HostEnv) -> ScriptOutcome {
	let user_json = match &env.user {
		Some(auth) => serde_json::json!({
			"id": auth.user_id,
			"email": auth.email,
			"name": auth.name,
			"role": auth.role,
		}),
		None => serde_json::Value::Null,
	};

	let ctx = HostCtx {
		inner: Rc::new(HostInner { env, user_json, logs: RefCell::new(Vec::new()) }),
	};

	let mut context = Context::default();
	context.runtime_limits_mut().set_loop_iteration_limit(5_000_000);
	context.runtime_limits_mut().set_recursion_limit(256);

	let result = run_inner(source, request, &ctx, &mut context);
	let logs = ctx.inner.logs.borrow().clone();

	ScriptOutcome { result, logs }
}

fn run_inner(
	source: &str,
	request: &serde_json::Value,
	ctx: &HostCtx,
	context: &mut Context,
) -> Result<serde_json::Value, ScriptError> {
	register_host_api(ctx, context).map_err(|err| ScriptError::Compile(err.to_string()))?;

	context
		.eval(Source::from_bytes(source.as_bytes()))
		.map_err(|err| ScriptError::Compile(err.to_string()))?;

	let handler = context
		.global_object()
		.get(js_string!("handler"), context)
		.map_err(|err| ScriptError::Compile(err.to_string()))?;

	let Some(function) = handler.as_callable() else {
		return Err(ScriptError::NoHandler);
	};

	let request_value = JsValue::from_json(request, context)
		.map_err(|err| ScriptError::Runtime(err.to_string()))?;

	let result = function
		.call(&JsValue::undefined(), &[request_value], context)
		.map_err(|err| {
			let message = err.to_string();
			if message.contains(LOGIN_REQUIRED) {
				ScriptError::Unauthorized
			} else {
				ScriptError::Runtime(message)
			}
		})?;

	value_to_json(&result, context).map_err(|err| ScriptError::Runtime(err.to_string()))
}

fn value_to_json(value: &JsValue, context: &mut Context) -> JsResult<serde_json::Value> {
	if value.is_undefined() {
		return Ok(serde_json::Value::Null);
	}
	Ok(value.to_json(context)?.unwrap_or(serde_json::Value::Null))
}

fn js_error(message: impl Into<String>) -> boa_engine::JsError {
	JsNativeError::error().with_message(message.into()).into()
}

fn register_host_api(ctx: &HostCtx, context: &mut Context) -> JsResult<()> {
	let kv = build_kv_object(ctx, context);

	let fazt = ObjectInitializer::new(context)
		.function(
			NativeFunction::from_copy_closure_with_captures(
				|_this, _args, captures, context| {
					JsValue::from_json(&captures.inner.user_json, context)
				},
				ctx.clone(),
			),
			js_string!("getUser"),
			0,
		)
		.function(
			NativeFunction::from_copy_closure_with_captures(
				|_this, _args, captures, context| {
					if captures.inner.user_json.is_null() {
						return Err(js_error(LOGIN_REQUIRED));
					}
					JsValue::from_json(&captures.inner.user_json, context)
				},
				ctx.clone(),
			),
			js_string!("requireLogin"),
			0,
		)
		.function(
			NativeFunction::from_copy_closure_with_captures(host_fetch, ctx.clone()),
			js_string!("fetch"),
			2,
		)
		.function(
			NativeFunction::from_copy_closure_with_captures(host_log, ctx.clone()),
			js_string!("log"),
			1,
		)
		.property(js_string!("kv"), kv, Attribute::all())
		.build();

	context.register_global_property(js_string!("fazt"), fazt, Attribute::all())?;
	Ok(())
}

fn build_kv_object(ctx: &HostCtx, context: &mut Context) -> boa_engine::JsObject {
	ObjectInitializer::new(context)
		.function(
			NativeFunction::from_copy_closure_with_captures(kv_get, ctx.clone()),
			js_string!("get"),
			1,
		)
		.function(
			NativeFunction::from_copy_closure_with_captures(kv_set, ctx.clone()),
			js_string!("set"),
			2,
		)
		.function(
			NativeFunction::from_copy_closure_with_captures(kv_delete, ctx.clone()),
			js_string!("delete"),
			1,
		)
		.function(
			NativeFunction::from_copy_closure_with_captures(kv_find, ctx.clone()),
			js_string!("find"),
			2,
		)
		.build()
}

fn arg_string(args: &[JsValue], index: usize, context: &mut Context) -> JsResult<String> {
	let value = args.get(index).cloned().unwrap_or_default();
	Ok(value.to_string(context)?.to_std_string_escaped())
}

/// The `(app_id, user_id)` scope for every KV call comes from the capture,
/// which was filled at dispatch.
fn kv_scope(captures: &HostCtx) -> (&str, &str) {
	let inner = &captures.inner;
	let user_id: &str =
		if inner.env.user_id.is_empty() { ANON_USER } else { &inner.env.user_id };
	(&inner.env.app_id, user_id)
}

fn kv_get(
	_this: &JsValue,
	args: &[JsValue],
	captures: &HostCtx,
	context: &mut Context,
) -> JsResult<JsValue> {
	let key = arg_string(args, 0, context)?;
	let inner = &captures.inner;
	let (app_id, user_id) = kv_scope(captures);

	let value = inner
		.env
		.handle
		.block_on(inner.env.app.meta_adapter.kv_get(app_id, user_id, &key))
		.map_err(|err| js_error(format!("kv.get failed: {}", err)))?;

	match value {
		None => Ok(JsValue::null()),
		Some(raw) => match serde_json::from_str::<serde_json::Value>(&raw) {
			Ok(json) => JsValue::from_json(&json, context),
			Err(_) => Ok(JsValue::from(boa_engine::JsString::from(raw.as_ref()))),
		},
	}
}

fn kv_set(
	_this: &JsValue,
	args: &[JsValue],
	captures: &HostCtx,
	context: &mut Context,
) -> JsResult<JsValue> {
	let key = arg_string(args, 0, context)?;
	let value = args.get(1).cloned().unwrap_or_default();
	let json = value
		.to_json(context)?
		.ok_or_else(|| js_error("kv.set value must be JSON-serializable"))?;
	let serialized =
		serde_json::to_string(&json).map_err(|_| js_error("kv.set value must be JSON-serializable"))?;

	let inner = &captures.inner;
	let (app_id, user_id) = kv_scope(captures);

	inner
		.env
		.handle
		.block_on(inner.env.app.meta_adapter.kv_set(app_id, user_id, &key, &serialized))
		.map_err(|err| js_error(format!("kv.set failed: {}", err)))?;

	Ok(JsValue::undefined())
}

fn kv_delete(
	_this: &JsValue,
	args: &[JsValue],
	captures: &HostCtx,
	context: &mut Context,
) -> JsResult<JsValue> {
	let key = arg_string(args, 0, context)?;
	let inner = &captures.inner;
	let (app_id, user_id) = kv_scope(captures);

	let deleted = inner
		.env
		.handle
		.block_on(inner.env.app.meta_adapter.kv_delete(app_id, user_id, &key))
		.map_err(|err| js_error(format!("kv.delete failed: {}", err)))?;

	Ok(JsValue::from(deleted))
}

fn kv_find(
	_this: &JsValue,
	args: &[JsValue],
	captures: &HostCtx,
	context: &mut Context,
) -> JsResult<JsValue> {
	let prefix = if args.is_empty() { String::new() } else { arg_string(args, 0, context)? };
	let limit = args
		.get(1)
		.and_then(|v| v.as_number())
		.map(|n| n as u32)
		.unwrap_or(KV_FIND_LIMIT)
		.min(KV_FIND_LIMIT);

	let inner = &captures.inner;
	let (app_id, user_id) = kv_scope(captures);

	let rows = inner
		.env
		.handle
		.block_on(inner.env.app.meta_adapter.kv_find(app_id, user_id, &prefix, limit))
		.map_err(|err| js_error(format!("kv.find failed: {}", err)))?;

	let items: Vec<serde_json::Value> = rows
		.into_iter()
		.map(|(key, raw)| {
			let value = serde_json::from_str::<serde_json::Value>(&raw)
				.unwrap_or(serde_json::Value::String(raw.into()));
			serde_json::json!({ "key": key, "value": value })
		})
		.collect();

	JsValue::from_json(&serde_json::Value::Array(items), context)
}

fn host_fetch(
	_this: &JsValue,
	args: &[JsValue],
	captures: &HostCtx,
	context: &mut Context,
) -> JsResult<JsValue> {
	let url = arg_string(args, 0, context)?;

	let opts = match args.get(1) {
		None => FetchOptions::default(),
		Some(value) if value.is_undefined() || value.is_null() => FetchOptions::default(),
		Some(value) => {
			let json = value
				.to_json(context)?
				.ok_or_else(|| js_error("fetch options must be an object"))?;
			serde_json::from_value(json).map_err(|_| js_error("invalid fetch options"))?
		}
	};

	let inner = &captures.inner;
	let response = inner
		.env
		.handle
		.block_on(inner.env.app.egress.fetch(
			&inner.env.app.meta_adapter,
			&inner.env.app_id,
			&url,
			&opts,
		))
		.map_err(|err| match err {
			Error::PermissionDenied => js_error(format!("egress denied for {}", url)),
			Error::RateLimited => js_error("egress rate limit exceeded"),
			Error::Timeout => js_error("egress request timed out"),
			other => js_error(format!("egress failed: {}", other)),
		})?;

	let json = serde_json::to_value(&response).map_err(|_| js_error("egress response error"))?;
	JsValue::from_json(&json, context)
}

fn host_log(
	_this: &JsValue,
	args: &[JsValue],
	captures: &HostCtx,
	context: &mut Context,
) -> JsResult<JsValue> {
	let mut parts = Vec::with_capacity(args.len());
	for value in args {
		if let Some(text) = value.as_string() {
			parts.push(text.to_std_string_escaped());
		} else {
			match value.to_json(context) {
				Ok(Some(json)) => parts.push(json.to_string()),
				_ => parts.push(value.display().to_string()),
			}
		}
	}
	captures.inner.logs.borrow_mut().push(parts.join(" "));
	Ok(JsValue::undefined())
}

// vim: ts=4

//! Outbound HTTP for serverless handlers, gated by the egress allowlist.
//!
//! Pipeline per call: scheme check → allowlist match → HTTPS enforcement →
//! per-rule token bucket → response cache → secret injection → bounded
//! request. Secret material is injected here, after the handler has given
//! up control, and never flows back into handler-visible state.

use governor::{clock::DefaultClock, state::{InMemoryState, NotKeyed}, Quota, RateLimiter};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::{NonZeroU32, NonZeroUsize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

use crate::prelude::*;
use fazt_types::meta_adapter::{EgressRule, EgressSecretKind, MetaAdapter};

/// Default per-call timeout when the rule does not set one
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default response-size ceiling (2 MiB)
const DEFAULT_MAX_RESPONSE: u64 = 2 * 1024 * 1024;

const CACHE_ENTRIES: usize = 256;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FetchOptions {
	#[serde(default)]
	pub method: Option<String>,
	#[serde(default)]
	pub headers: HashMap<String, String>,
	#[serde(default)]
	pub body: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EgressResponse {
	pub status: u16,
	pub headers: HashMap<String, String>,
	pub body: String,
}

#[derive(Clone)]
struct CachedEntry {
	response: EgressResponse,
	expires_at: Instant,
}

pub struct EgressGateway {
	client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
	buckets: Mutex<HashMap<i64, Arc<DirectLimiter>>>,
	cache: Mutex<LruCache<Box<str>, CachedEntry>>,
}

impl std::fmt::Debug for EgressGateway {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EgressGateway").finish()
	}
}

impl EgressGateway {
	pub fn new() -> FzResult<Self> {
		let connector = HttpsConnectorBuilder::new()
			.with_native_roots()
			.map_err(|_| Error::ConfigError("no native root CA certificates found".into()))?
			.https_or_http()
			.enable_http1()
			.build();

		Ok(EgressGateway {
			client: Client::builder(TokioExecutor::new()).build(connector),
			buckets: Mutex::new(HashMap::new()),
			cache: Mutex::new(LruCache::new(
				NonZeroUsize::new(CACHE_ENTRIES).unwrap_or(NonZeroUsize::MIN),
			)),
		})
	}

	/// Perform an outbound request on behalf of `app_id`. The app id comes
	/// from the dispatch context, never from the handler.
	pub async fn fetch(
		&self,
		meta: &Arc<dyn MetaAdapter>,
		app_id: &str,
		url_str: &str,
		opts: &FetchOptions,
	) -> FzResult<EgressResponse> {
		let url = url::Url::parse(url_str)
			.map_err(|_| Error::ValidationError("invalid egress URL".into()))?;

		if url.scheme() != "http" && url.scheme() != "https" {
			return Err(Error::ValidationError("egress is limited to http(s) URLs".into()));
		}

		let host = url
			.host_str()
			.ok_or_else(|| Error::ValidationError("egress URL has no host".into()))?;

		let rules = meta.list_egress_rules().await?;
		let rule = find_rule(&rules, host, app_id)
			.ok_or_else(|| Error::PermissionDenied)?;

		if url.scheme() == "http" && !rule.allow_http {
			return Err(Error::PermissionDenied);
		}

		if let Some(rate) = rule.rate_per_min {
			let bucket = self.bucket_for(rule.rule_id, rate, rule.burst.unwrap_or(rate.max(1)));
			if bucket.check().is_err() {
				return Err(Error::RateLimited);
			}
		}

		let method = opts.method.as_deref().unwrap_or("GET").to_ascii_uppercase();
		let cache_ttl = rule.cache_ttl_secs.unwrap_or(0);
		let cache_key: Box<str> = format!(
			"{} {} accept:{}",
			method,
			url,
			opts.headers.get("accept").map(String::as_str).unwrap_or("")
		)
		.into();

		if method == "GET" && cache_ttl > 0 {
			let mut cache = self.cache.lock();
			if let Some(entry) = cache.get(&cache_key) {
				if entry.expires_at > Instant::now() {
					return Ok(entry.response.clone());
				}
				cache.pop(&cache_key);
			}
		}

		let response = self.transmit(&url, &method, opts, rule).await?;

		if method == "GET" && cache_ttl > 0 {
			self.cache.lock().put(
				cache_key,
				CachedEntry {
					response: response.clone(),
					expires_at: Instant::now() + Duration::from_secs(u64::from(cache_ttl)),
				},
			);
		}

		Ok(response)
	}

	async fn transmit(
		&self,
		url: &url::Url,
		method: &str,
		opts: &FetchOptions,
		rule: &EgressRule,
	) -> FzResult<EgressResponse> {
		// Secret injection happens here, just before transmission
		let mut url = url.clone();
		let mut builder = hyper::Request::builder().method(method).uri(url.as_str());

		for (name, value) in &opts.headers {
			builder = builder.header(name.as_str(), value.as_str());
		}

		if let Some(secret) = &rule.secret {
			match secret.kind {
				EgressSecretKind::Bearer => {
					builder =
						builder.header("authorization", format!("Bearer {}", secret.value));
				}
				EgressSecretKind::Header => {
					builder = builder.header(secret.name.as_ref(), secret.value.as_ref());
				}
				EgressSecretKind::Query => {
					url.query_pairs_mut().append_pair(&secret.name, &secret.value);
					builder = builder.uri(url.as_str());
				}
			}
		}

		let body = opts.body.clone().unwrap_or_default();
		let request = builder.body(Full::new(Bytes::from(body)))?;

		let call_timeout = rule
			.timeout_ms
			.map(|ms| Duration::from_millis(u64::from(ms)))
			.unwrap_or(DEFAULT_TIMEOUT);

		let response = timeout(call_timeout, self.client.request(request))
			.await
			.map_err(|_| Error::Timeout)?
			.map_err(|err| {
				warn!("egress request failed: {}", err);
				Error::NetworkError("egress request failed".into())
			})?;

		let status = response.status().as_u16();
		let mut headers = HashMap::new();
		for (name, value) in response.headers() {
			if let Ok(value) = value.to_str() {
				headers.insert(name.as_str().to_string(), value.to_string());
			}
		}

		let max_bytes = rule.max_response_bytes.unwrap_or(DEFAULT_MAX_RESPONSE);
		let collected = timeout(call_timeout, response.into_body().collect())
			.await
			.map_err(|_| Error::Timeout)?
			.map_err(|_| Error::NetworkError("egress body collection failed".into()))?
			.to_bytes();

		if collected.len() as u64 > max_bytes {
			return Err(Error::ValidationError("egress response exceeded the size ceiling".into()));
		}

		Ok(EgressResponse {
			status,
			headers,
			body: String::from_utf8_lossy(&collected).into_owned(),
		})
	}

	fn bucket_for(&self, rule_id: i64, rate_per_min: u32, burst: u32) -> Arc<DirectLimiter> {
		let mut buckets = self.buckets.lock();
		buckets
			.entry(rule_id)
			.or_insert_with(|| {
				let rate = NonZeroU32::new(rate_per_min.max(1)).unwrap_or(NonZeroU32::MIN);
				let burst = NonZeroU32::new(burst.max(1)).unwrap_or(NonZeroU32::MIN);
				Arc::new(RateLimiter::direct(Quota::per_minute(rate).allow_burst(burst)))
			})
			.clone()
	}
}

/// Match a rule for the host, preferring app-scoped rules over global ones
pub fn find_rule<'a>(rules: &'a [EgressRule], host: &str, app_id: &str) -> Option<&'a EgressRule> {
	let mut global: Option<&EgressRule> = None;
	for rule in rules {
		if !domain_matches(&rule.domain, host) {
			continue;
		}
		match &rule.app_id {
			Some(scope) if &**scope == app_id => return Some(rule),
			Some(_) => {}
			None => global = global.or(Some(rule)),
		}
	}
	global
}

/// Exact match, or a `*.` wildcard matching exactly one DNS label below it
pub fn domain_matches(rule_domain: &str, host: &str) -> bool {
	if let Some(suffix) = rule_domain.strip_prefix("*.") {
		match host.strip_suffix(suffix) {
			Some(label) => {
				let label = match label.strip_suffix('.') {
					Some(label) => label,
					None => return false,
				};
				!label.is_empty() && !label.contains('.')
			}
			None => false,
		}
	} else {
		rule_domain == host
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use fazt_types::meta_adapter::EgressRule;

	fn rule(domain: &str, app_id: Option<&str>) -> EgressRule {
		EgressRule {
			rule_id: 1,
			domain: domain.into(),
			app_id: app_id.map(Into::into),
			allow_http: false,
			rate_per_min: None,
			burst: None,
			timeout_ms: None,
			max_response_bytes: None,
			cache_ttl_secs: None,
			secret: None,
			created_at: Timestamp(0),
		}
	}

	#[test]
	fn wildcard_matches_exactly_one_label() {
		assert!(domain_matches("*.example.com", "api.example.com"));
		assert!(!domain_matches("*.example.com", "example.com"));
		assert!(!domain_matches("*.example.com", "a.b.example.com"));
		assert!(!domain_matches("*.example.com", "evilexample.com"));
	}

	#[test]
	fn exact_match_only() {
		assert!(domain_matches("api.example.com", "api.example.com"));
		assert!(!domain_matches("api.example.com", "api.example.com.evil"));
	}

	#[test]
	fn app_scoped_rules_win() {
		let rules = vec![rule("api.example.com", None), rule("api.example.com", Some("app_1"))];
		let found = find_rule(&rules, "api.example.com", "app_1").unwrap();
		assert_eq!(found.app_id.as_deref(), Some("app_1"));

		// Another app only sees the global rule
		let found = find_rule(&rules, "api.example.com", "app_2").unwrap();
		assert!(found.app_id.is_none());
	}

	#[test]
	fn foreign_scope_is_invisible() {
		let rules = vec![rule("api.example.com", Some("app_1"))];
		assert!(find_rule(&rules, "api.example.com", "app_2").is_none());
	}
}

// vim: ts=4

//! Small request-level helpers shared across the core

use axum::http::{header, HeaderMap};
use std::net::IpAddr;

/// Extract a cookie value from the request headers.
///
/// The FIRST occurrence across all `Cookie` headers wins. This matters:
/// with duplicate cookies of the same name, an attacker-planted first
/// cookie shadows a later valid one. The behavior is part of the platform
/// contract and must not be "fixed" by preferring a later match.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
	for header_value in headers.get_all(header::COOKIE) {
		let Ok(raw) = header_value.to_str() else { continue };
		for pair in raw.split(';') {
			let pair = pair.trim();
			if let Some((key, value)) = pair.split_once('=') {
				if key == name {
					return Some(value);
				}
			}
		}
	}
	None
}

/// The client IP used for throttling. The socket peer address is
/// authoritative; `X-Forwarded-For` is honored only when the peer is a
/// configured trusted proxy, and then only its last hop.
pub fn client_ip(peer: IpAddr, headers: &HeaderMap, trusted_proxies: &[IpAddr]) -> IpAddr {
	if !trusted_proxies.contains(&peer) {
		return peer;
	}

	headers
		.get("x-forwarded-for")
		.and_then(|v| v.to_str().ok())
		.and_then(|v| v.rsplit(',').next())
		.and_then(|v| v.trim().parse::<IpAddr>().ok())
		.unwrap_or(peer)
}

/// Build a `Set-Cookie` value for the session cookie
pub fn session_cookie(name: &str, value: &str, max_age: i64, secure: bool) -> String {
	let mut cookie =
		format!("{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}", name, value, max_age);
	if secure {
		cookie.push_str("; Secure");
	}
	cookie
}

/// `Set-Cookie` value that clears the named cookie
pub fn clear_cookie(name: &str) -> String {
	format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", name)
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::http::HeaderValue;

	fn headers_with_cookies(values: &[&str]) -> HeaderMap {
		let mut headers = HeaderMap::new();
		for value in values {
			headers.append(header::COOKIE, HeaderValue::from_str(value).unwrap());
		}
		headers
	}

	#[test]
	fn first_cookie_occurrence_wins() {
		let headers = headers_with_cookies(&["fazt_session=first; fazt_session=second"]);
		assert_eq!(cookie_value(&headers, "fazt_session"), Some("first"));

		// Also across separate Cookie headers
		let headers = headers_with_cookies(&["fazt_session=planted", "fazt_session=valid"]);
		assert_eq!(cookie_value(&headers, "fazt_session"), Some("planted"));
	}

	#[test]
	fn missing_cookie_is_none() {
		let headers = headers_with_cookies(&["other=x"]);
		assert_eq!(cookie_value(&headers, "fazt_session"), None);
	}

	#[test]
	fn forwarded_header_ignored_from_untrusted_peer() {
		let mut headers = HeaderMap::new();
		headers.insert("x-forwarded-for", HeaderValue::from_static("1.2.3.4"));
		let peer: IpAddr = "203.0.113.9".parse().unwrap();

		assert_eq!(client_ip(peer, &headers, &[]), peer);

		let proxy: IpAddr = "203.0.113.9".parse().unwrap();
		assert_eq!(client_ip(peer, &headers, &[proxy]), "1.2.3.4".parse::<IpAddr>().unwrap());
	}

	#[test]
	fn session_cookie_flags() {
		let cookie = session_cookie("fazt_session", "tok", 3600, true);
		assert!(cookie.contains("HttpOnly"));
		assert!(cookie.contains("SameSite=Lax"));
		assert!(cookie.contains("Secure"));
		assert!(cookie.starts_with("fazt_session=tok; Path=/"));

		let cookie = session_cookie("fazt_session", "tok", 3600, false);
		assert!(!cookie.contains("Secure"));
	}
}

// vim: ts=4

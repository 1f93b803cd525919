//! Host and path classification for the request router.
//!
//! Every inbound request is classified into exactly one route. Matching on
//! the configured apex is case-SENSITIVE: `ADMIN.example.com` and
//! `EXAMPLE.COM` fall through to the not-found page rather than reaching
//! the admin plane or a site. Lowercasing here would invite host-confusion
//! bugs between the TLS layer, the router and alias storage.

use std::net::IpAddr;

use fazt_types::meta_adapter::{NOT_FOUND_SITE, ROOT_SITE};
use fazt_types::utils::strip_host_port;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostRoute {
	/// The admin control plane. `dev` is the `localhost` convenience route,
	/// which authenticates but does not gate on role.
	Admin { dev: bool },
	/// Serve a site's VFS (and its serverless handler)
	Site { site_id: Box<str>, not_found: bool },
	/// No classification matched: the fallback 404 page
	Fallback,
}

pub fn classify_host(host_header: &str, apex: &str) -> HostRoute {
	let host = strip_host_port(host_header);

	if host == "localhost" {
		return HostRoute::Admin { dev: true };
	}

	if let Some(sub) = host.strip_suffix(apex).and_then(|h| h.strip_suffix('.')) {
		return match sub {
			"admin" => HostRoute::Admin { dev: false },
			"root" => HostRoute::Site { site_id: ROOT_SITE.into(), not_found: false },
			"404" => HostRoute::Site { site_id: NOT_FOUND_SITE.into(), not_found: true },
			// Exactly one label below the apex
			sub if !sub.is_empty() && !sub.contains('.') => {
				HostRoute::Site { site_id: sub.into(), not_found: false }
			}
			_ => HostRoute::Fallback,
		};
	}

	if host == apex {
		return HostRoute::Site { site_id: ROOT_SITE.into(), not_found: false };
	}

	HostRoute::Fallback
}

/// Parse the local-only direct app access path `/_app/<id>/rest`.
///
/// Returns the site id and the rewritten path (always starting with `/`).
pub fn parse_app_tunnel(path: &str) -> Option<(&str, String)> {
	let rest = path.strip_prefix("/_app/")?;
	let (site_id, tail) = match rest.split_once('/') {
		Some((site_id, tail)) => (site_id, format!("/{}", tail)),
		None => (rest, "/".to_string()),
	};
	if site_id.is_empty() {
		return None;
	}
	Some((site_id, tail))
}

/// Local/private peers only: loopback, RFC1918, link-local, unique-local.
pub fn is_local_peer(addr: IpAddr) -> bool {
	match addr {
		IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
		IpAddr::V6(v6) => {
			if v6.is_loopback() {
				return true;
			}
			let segments = v6.segments();
			// fc00::/7 unique local, fe80::/10 link local
			(segments[0] & 0xfe00) == 0xfc00 || (segments[0] & 0xffc0) == 0xfe80
		}
	}
}


// vim: ts=4

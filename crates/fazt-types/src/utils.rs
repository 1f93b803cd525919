//! Utility functions

use rand::Rng;
use sha2::{Digest, Sha256};

pub const ID_LENGTH: usize = 24;
pub const SAFE: [char; 62] = [
	'0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i',
	'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', 'A', 'B',
	'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S', 'T', 'U',
	'V', 'W', 'X', 'Y', 'Z',
];

pub fn random_id() -> String {
	random_id_len(ID_LENGTH)
}

pub fn random_id_len(len: usize) -> String {
	let mut rng = rand::rng();
	let mut result = String::with_capacity(len);

	for _ in 0..len {
		result.push(SAFE[rng.random_range(0..SAFE.len())]);
	}
	result
}

/// Lowercase hex SHA-256 digest of a byte slice
pub fn sha256_hex(data: &[u8]) -> String {
	let mut hasher = Sha256::new();
	hasher.update(data);
	let digest = hasher.finalize();
	let mut out = String::with_capacity(64);
	for b in digest {
		use std::fmt::Write;
		let _ = write!(out, "{:02x}", b);
	}
	out
}

/// First 8 bytes of the SHA-256 digest as a big-endian u64.
///
/// Used where a stable, portable 64-bit hash of an identifier is needed
/// (traffic-split selection). Not a substitute for a keyed MAC.
pub fn sha256_u64(data: &[u8]) -> u64 {
	let mut hasher = Sha256::new();
	hasher.update(data);
	let digest = hasher.finalize();
	let mut buf = [0u8; 8];
	buf.copy_from_slice(&digest[..8]);
	u64::from_be_bytes(buf)
}

/// Strip the port from a Host header value.
///
/// Handles the IPv6 bracket syntax: `[::1]:8080` → `[::1]`. A bare host
/// with no port is returned unchanged. No case folding happens here.
pub fn strip_host_port(host: &str) -> &str {
	if let Some(rest) = host.strip_prefix('[') {
		// IPv6 literal: the host ends at the closing bracket
		match rest.find(']') {
			Some(pos) => &host[..pos + 2],
			None => host,
		}
	} else {
		match host.rfind(':') {
			Some(pos) if host[pos + 1..].chars().all(|c| c.is_ascii_digit()) => &host[..pos],
			_ => host,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn random_ids_are_distinct() {
		let a = random_id();
		let b = random_id();
		assert_eq!(a.len(), ID_LENGTH);
		assert_ne!(a, b);
	}

	#[test]
	fn sha256_hex_known_vector() {
		assert_eq!(
			sha256_hex(b"abc"),
			"ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
		);
	}

	#[test]
	fn sha256_u64_is_stable() {
		assert_eq!(sha256_u64(b"abc"), sha256_u64(b"abc"));
		assert_ne!(sha256_u64(b"abc"), sha256_u64(b"abd"));
	}

	#[test]
	fn strip_port_variants() {
		assert_eq!(strip_host_port("example.com"), "example.com");
		assert_eq!(strip_host_port("example.com:8080"), "example.com");
		assert_eq!(strip_host_port("[::1]:8080"), "[::1]");
		assert_eq!(strip_host_port("[::1]"), "[::1]");
		// A colon followed by non-digits is not a port separator
		assert_eq!(strip_host_port("weird:host"), "weird:host");
	}

	#[test]
	fn strip_port_preserves_case() {
		assert_eq!(strip_host_port("ADMIN.Example.COM:443"), "ADMIN.Example.COM");
	}
}

// vim: ts=4

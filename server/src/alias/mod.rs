//! Alias resolution: subdomain → routing decision

use crate::prelude::*;
use fazt_types::meta_adapter::{AliasTarget, AppRecord, SplitTarget};
use fazt_types::utils::sha256_u64;

/// Sticky traffic-split cookie; holds an opaque request identifier
pub const SPLIT_COOKIE: &str = "fazt_split";

#[derive(Debug)]
pub enum Resolution {
	/// Serve this application; `site_id` is where its files live.
	/// `via_split` marks a weighted selection, so the caller can pin the
	/// visitor with the sticky cookie.
	App { app: AppRecord, site_id: Box<str>, via_split: bool },
	/// 301 to the target URL
	Redirect(Box<str>),
	/// Reserved name: plain 404
	Reserved,
	/// No alias: the subdomain itself is the site identifier (legacy
	/// direct-site lookup), with no backing application record
	Legacy,
}

/// Resolve a subdomain. `split_id` is the sticky identifier used for
/// weighted selection. Lookup failures are "no alias", never a 5xx.
pub async fn resolve(app_state: &App, subdomain: &str, split_id: &str) -> Resolution {
	let alias = match app_state.meta_adapter.read_alias(subdomain).await {
		Ok(alias) => alias,
		Err(_) => return Resolution::Legacy,
	};

	match alias.target {
		AliasTarget::App { app_id } => resolve_app(app_state, subdomain, &app_id, false).await,
		AliasTarget::Redirect { url } => Resolution::Redirect(url),
		AliasTarget::Reserved => Resolution::Reserved,
		AliasTarget::Split { targets } => match pick_split(&targets, split_id) {
			Some(target) => resolve_app(app_state, subdomain, &target.app_id, true).await,
			None => Resolution::Legacy,
		},
	}
}

async fn resolve_app(
	app_state: &App,
	subdomain: &str,
	app_id: &str,
	via_split: bool,
) -> Resolution {
	let Ok(app) = app_state.meta_adapter.read_app(app_id).await else {
		return Resolution::Legacy;
	};
	let site_id = match app_state.meta_adapter.read_app_site(app_id).await {
		Ok(site_id) => site_id,
		Err(_) => subdomain.into(),
	};
	Resolution::App { app, site_id, via_split }
}

/// Deterministic weighted selection: hash the identifier to 64 bits,
/// reduce modulo the weight sum, take the first cumulative bucket. A fixed
/// identifier always lands on the same variant.
pub fn pick_split<'a>(targets: &'a [SplitTarget], split_id: &str) -> Option<&'a SplitTarget> {
	let sum: u64 = targets.iter().map(|t| u64::from(t.weight)).sum();
	if sum == 0 {
		return None;
	}

	let mut point = sha256_u64(split_id.as_bytes()) % sum;
	for target in targets {
		let weight = u64::from(target.weight);
		if point < weight {
			return Some(target);
		}
		point -= weight;
	}
	None
}

#[cfg(test)]
mod tests {
	use super::*;

	fn targets(weights: &[(&str, u32)]) -> Vec<SplitTarget> {
		weights
			.iter()
			.map(|(id, weight)| SplitTarget { app_id: (*id).into(), weight: *weight })
			.collect()
	}

	#[test]
	fn selection_is_stable_per_identifier() {
		let split = targets(&[("app_a", 1), ("app_b", 3)]);
		for i in 0..50 {
			let id = format!("visitor-{}", i);
			let first = pick_split(&split, &id).unwrap().app_id.clone();
			for _ in 0..5 {
				assert_eq!(pick_split(&split, &id).unwrap().app_id, first);
			}
		}
	}

	#[test]
	fn selection_follows_weights() {
		let split = targets(&[("app_a", 1), ("app_b", 3)]);
		let n = 4000;
		let mut a_count = 0usize;
		for i in 0..n {
			let id = format!("visitor-{}", i);
			if &*pick_split(&split, &id).unwrap().app_id == "app_a" {
				a_count += 1;
			}
		}
		let ratio = a_count as f64 / n as f64;
		// Expected 0.25; generous tolerance for hash variance
		assert!((0.20..=0.30).contains(&ratio), "ratio was {}", ratio);
	}

	#[test]
	fn zero_weight_targets_are_skipped() {
		let split = targets(&[("app_a", 0), ("app_b", 1)]);
		for i in 0..20 {
			let id = format!("v{}", i);
			assert_eq!(&*pick_split(&split, &id).unwrap().app_id, "app_b");
		}
	}

	#[test]
	fn all_zero_weights_pick_nothing() {
		let split = targets(&[("app_a", 0)]);
		assert!(pick_split(&split, "x").is_none());
	}
}

// vim: ts=4

//! Login throttling: failed attempts per client IP in a sliding window.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::time::{Duration, Instant};

use crate::prelude::*;

const WINDOW: Duration = Duration::from_secs(15 * 60);
const MAX_FAILURES: usize = 10;

#[derive(Debug, Default)]
pub struct LoginThrottle {
	attempts: Mutex<HashMap<IpAddr, VecDeque<Instant>>>,
}

impl LoginThrottle {
	/// Reject with RateLimited once the window holds too many failures
	pub fn check(&self, ip: IpAddr) -> FzResult<()> {
		let mut attempts = self.attempts.lock();
		let Some(window) = attempts.get_mut(&ip) else { return Ok(()) };

		let cutoff = Instant::now() - WINDOW;
		while window.front().is_some_and(|t| *t < cutoff) {
			window.pop_front();
		}

		if window.len() >= MAX_FAILURES {
			warn!("login throttled for {}", ip);
			return Err(Error::RateLimited);
		}
		Ok(())
	}

	pub fn record_failure(&self, ip: IpAddr) {
		let mut attempts = self.attempts.lock();
		attempts.entry(ip).or_default().push_back(Instant::now());
	}

	/// A successful login clears the IP's window
	pub fn record_success(&self, ip: IpAddr) {
		self.attempts.lock().remove(&ip);
	}

	/// Drop empty/stale windows; called from the scheduler
	pub fn prune(&self) {
		let cutoff = Instant::now() - WINDOW;
		let mut attempts = self.attempts.lock();
		attempts.retain(|_, window| {
			while window.front().is_some_and(|t| *t < cutoff) {
				window.pop_front();
			}
			!window.is_empty()
		});
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn throttles_after_repeated_failures() {
		let throttle = LoginThrottle::default();
		let ip: IpAddr = "203.0.113.7".parse().unwrap();

		for _ in 0..MAX_FAILURES {
			assert!(throttle.check(ip).is_ok());
			throttle.record_failure(ip);
		}
		assert!(matches!(throttle.check(ip), Err(Error::RateLimited)));

		// Other IPs are unaffected
		let other: IpAddr = "203.0.113.8".parse().unwrap();
		assert!(throttle.check(other).is_ok());
	}

	#[test]
	fn success_clears_the_window() {
		let throttle = LoginThrottle::default();
		let ip: IpAddr = "203.0.113.7".parse().unwrap();

		for _ in 0..MAX_FAILURES {
			throttle.record_failure(ip);
		}
		assert!(throttle.check(ip).is_err());

		throttle.record_success(ip);
		assert!(throttle.check(ip).is_ok());
	}
}

// vim: ts=4

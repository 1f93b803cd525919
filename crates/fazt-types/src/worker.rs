//! Worker pool for CPU-bound work, with two lanes.
//!
//! The platform has exactly two kinds of blocking work: credential
//! hashing (bcrypt on the login path, latency-sensitive) and serverless
//! script execution (can take its whole budget). They get separate lanes
//! so a burst of slow handlers cannot queue behind every login check:
//! `High` is for credential work, `Normal` for script runs. Dedicated
//! threads serve only the high lane; shared threads drain high before
//! picking up normal work.

use flume::{Receiver, Sender};
use futures::channel::oneshot;
use std::{sync::Arc, thread};

use crate::prelude::*;

type Job = Box<dyn FnOnce() + Send>;

#[derive(Clone, Copy, Debug)]
pub enum Priority {
	/// Credential checks and other short, latency-sensitive work
	High,
	/// Serverless handler runs and anything that may use its full budget
	Normal,
}

#[derive(Debug)]
pub struct WorkerPool {
	high: Sender<Job>,
	normal: Sender<Job>,
}

impl WorkerPool {
	/// `dedicated` threads serve only the high lane; `shared` threads
	/// serve both. At least one shared thread is always started, since
	/// normal-lane work would otherwise never run.
	pub fn new(dedicated: usize, shared: usize) -> Self {
		let (high, rx_high) = flume::unbounded();
		let (normal, rx_normal) = flume::unbounded();

		let rx_high = Arc::new(rx_high);
		let rx_normal = Arc::new(rx_normal);

		for _ in 0..dedicated {
			let rx_high = Arc::clone(&rx_high);
			thread::spawn(move || dedicated_loop(&rx_high));
		}

		for _ in 0..shared.max(1) {
			let rx_high = Arc::clone(&rx_high);
			let rx_normal = Arc::clone(&rx_normal);
			thread::spawn(move || shared_loop(&rx_high, &rx_normal));
		}

		Self { high, normal }
	}

	/// Submit a closure → returns a Future for the result
	pub fn spawn<F, T>(
		&self,
		priority: Priority,
		f: F,
	) -> impl std::future::Future<Output = FzResult<T>>
	where
		F: FnOnce() -> T + Send + 'static,
		T: Send + 'static,
	{
		let (res_tx, res_rx) = oneshot::channel();

		let job = Box::new(move || {
			let result = f();
			let _ignore = res_tx.send(result);
		});

		let queue = match priority {
			Priority::High => &self.high,
			Priority::Normal => &self.normal,
		};
		if queue.send(job).is_err() {
			error!("Failed to send job to {:?} lane", priority);
		}

		async move {
			res_rx.await.map_err(|_| {
				error!("Worker dropped result channel (task may have panicked)");
				Error::Internal("worker task failed".into())
			})
		}
	}

	pub fn run<F, T>(&self, f: F) -> impl std::future::Future<Output = FzResult<T>>
	where
		F: FnOnce() -> T + Send + 'static,
		T: Send + 'static,
	{
		self.spawn(Priority::Normal, f)
	}

	pub fn run_immed<F, T>(&self, f: F) -> impl std::future::Future<Output = FzResult<T>>
	where
		F: FnOnce() -> T + Send + 'static,
		T: Send + 'static,
	{
		self.spawn(Priority::High, f)
	}

	/// Like `run`, but flattens `FzResult<FzResult<T>>` into `FzResult<T>`.
	/// Use when the closure itself returns `FzResult<T>`.
	pub fn try_run<F, T>(&self, f: F) -> impl std::future::Future<Output = FzResult<T>>
	where
		F: FnOnce() -> FzResult<T> + Send + 'static,
		T: Send + 'static,
	{
		let fut = self.run(f);
		async move { fut.await? }
	}

	/// Like `run_immed`, but flattens `FzResult<FzResult<T>>` into `FzResult<T>`.
	pub fn try_run_immed<F, T>(&self, f: F) -> impl std::future::Future<Output = FzResult<T>>
	where
		F: FnOnce() -> FzResult<T> + Send + 'static,
		T: Send + 'static,
	{
		let fut = self.run_immed(f);
		async move { fut.await? }
	}
}

/// Run one job, surviving its panics. A crashed bcrypt call or script
/// marshalling bug must not take a lane thread down with it; the caller
/// sees the dropped result channel as an internal error.
fn run_job(job: Job) {
	if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job)) {
		error!("Worker thread caught panic: {:?}", e);
	}
}

/// A dedicated thread blocks on the high lane alone
fn dedicated_loop(high: &Receiver<Job>) {
	while let Ok(job) = high.recv() {
		run_job(job);
	}
}

/// A shared thread empties the high lane before taking normal work, so
/// queued script runs never delay a credential check by more than one job
fn shared_loop(high: &Receiver<Job>, normal: &Receiver<Job>) {
	loop {
		if let Ok(job) = high.try_recv() {
			run_job(job);
			continue;
		}

		let job = flume::Selector::new()
			.recv(high, |res| res)
			.recv(normal, |res| res)
			.wait();
		match job {
			Ok(job) => run_job(job),
			// Both senders dropped: the pool is gone
			Err(flume::RecvError::Disconnected) => return,
		}
	}
}


// vim: ts=4

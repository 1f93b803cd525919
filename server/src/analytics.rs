//! Page-view beacon buffer.
//!
//! Beacons land in memory and are flushed to the substrate on a schedule
//! and at shutdown, keeping the hot serving path free of writer traffic.

use axum::{extract::State, http::StatusCode, Json};
use parking_lot::Mutex;

use crate::prelude::*;
use fazt_types::meta_adapter::PageView;

/// Buffer cap; beyond it the oldest views are dropped rather than blocking
const BUFFER_CAP: usize = 4096;

#[derive(Debug, Default)]
pub struct AnalyticsBuffer {
	queue: Mutex<Vec<PageView>>,
}

impl AnalyticsBuffer {
	pub fn push(&self, mut view: PageView) {
		view.created_at = Timestamp::now();
		let mut queue = self.queue.lock();
		if queue.len() >= BUFFER_CAP {
			queue.remove(0);
		}
		queue.push(view);
	}

	/// Drain and persist; called from the scheduler and from teardown
	pub async fn flush(&self, app: &App) {
		let views = {
			let mut queue = self.queue.lock();
			std::mem::take(&mut *queue)
		};
		if views.is_empty() {
			return;
		}

		if let Err(err) = app.meta_adapter.record_page_views(&views).await {
			warn!("analytics flush failed ({} views dropped): {}", views.len(), err);
		} else {
			debug!("flushed {} page views", views.len());
		}
	}
}

/// POST /api/t - public tracking beacon
pub async fn post_beacon(
	State(app): State<App>,
	Json(view): Json<PageView>,
) -> StatusCode {
	app.analytics.push(view);
	StatusCode::NO_CONTENT
}

// vim: ts=4

//! Per-site WebSocket fan-out.
//!
//! Each site that opts in gets a broadcast channel; every message a client
//! sends is relayed to the site's other connected clients.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::broadcast;

use crate::prelude::*;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Default)]
pub struct SiteBroadcast {
	channels: Mutex<HashMap<Box<str>, broadcast::Sender<String>>>,
}

impl SiteBroadcast {
	pub fn sender(&self, site_id: &str) -> broadcast::Sender<String> {
		let mut channels = self.channels.lock();
		channels
			.entry(site_id.into())
			.or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
			.clone()
	}
}

/// Drive one `/_ws` connection: relay the site channel to the socket and
/// the socket's text frames to the site channel.
pub async fn handle_socket(app: App, site_id: Box<str>, socket: WebSocket) {
	let sender = app.broadcast.sender(&site_id);
	let mut receiver = sender.subscribe();
	let (mut ws_tx, mut ws_rx) = socket.split();

	let mut relay_out = tokio::spawn(async move {
		while let Ok(message) = receiver.recv().await {
			if ws_tx.send(Message::Text(message.into())).await.is_err() {
				break;
			}
		}
	});

	loop {
		tokio::select! {
			message = ws_rx.next() => match message {
				Some(Ok(Message::Text(text))) => {
					let _ = sender.send(text.to_string());
				}
				Some(Ok(Message::Close(_))) | None => break,
				Some(Ok(_)) => {}
				Some(Err(_)) => break,
			},
			_ = &mut relay_out => break,
		}
	}

	relay_out.abort();
	debug!("ws connection closed for site {}", site_id);
}

// vim: ts=4

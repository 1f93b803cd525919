//! Admin control plane handlers.
//!
//! Every mutating operation here runs through the storage writer and
//! records an audit event whose weight reflects its sensitivity (9 for
//! credential and role changes).

pub mod aliases;
pub mod api_keys;
pub mod apps;
pub mod cmd;
pub mod deploy;
pub mod egress;
pub mod invites;
pub mod system;
pub mod users;

use crate::prelude::*;
use fazt_types::auth_adapter::{AuditEvent, AuthCtx};

pub(crate) async fn audit(
	app: &App,
	actor: Option<&AuthCtx>,
	action: &str,
	weight: u8,
	detail: serde_json::Value,
) {
	let result = app
		.auth_adapter
		.create_audit_event(&AuditEvent {
			actor: actor.map(|ctx| &*ctx.user_id),
			action,
			weight,
			detail: Some(detail),
		})
		.await;
	if let Err(err) = result {
		warn!("audit write failed for '{}': {}", action, err);
	}
}

// vim: ts=4

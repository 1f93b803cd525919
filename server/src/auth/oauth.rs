//! OAuth callback contract.
//!
//! Provider integrations live outside the core; this module defines the
//! trait they implement and the state round-trip the core guarantees:
//! a state token is minted before the redirect and consumed exactly once
//! on callback.

use async_trait::async_trait;

use crate::prelude::*;

/// A user profile as reported by an identity provider
#[derive(Debug, Clone)]
pub struct ProviderUser {
	pub email: Box<str>,
	pub name: Box<str>,
	pub avatar_url: Option<Box<str>>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
	fn name(&self) -> &str;
	/// Where to send the browser, with our state token embedded
	fn authorize_url(&self, state: &str) -> String;
	/// Exchange the callback code for the provider's user profile
	async fn exchange_code(&self, code: &str) -> FzResult<ProviderUser>;
}


// vim: ts=4

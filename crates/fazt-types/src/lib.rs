//! Shared types, adapter traits, and core utilities for the fazt platform.
//!
//! This crate contains the foundational types that are shared between the
//! server crate and the storage adapter. Extracting these into a separate
//! crate allows the adapter to compile in parallel with the server's
//! feature modules.

pub mod auth_adapter;
pub mod error;
pub mod meta_adapter;
pub mod prelude;
pub mod types;
pub mod utils;
pub mod worker;

// vim: ts=4

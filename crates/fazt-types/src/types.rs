//! Common types used throughout the fazt platform.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

// Timestamp //
//***********//
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub i64);

impl Timestamp {
	pub fn now() -> Timestamp {
		let res = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default();
		Timestamp(res.as_secs().cast_signed())
	}

	pub fn from_now(delta: i64) -> Timestamp {
		Timestamp(Self::now().0 + delta)
	}

	/// Add seconds to this timestamp
	pub fn add_seconds(&self, seconds: i64) -> Timestamp {
		Timestamp(self.0 + seconds)
	}

	pub fn is_past(&self) -> bool {
		*self < Timestamp::now()
	}
}

impl std::fmt::Display for Timestamp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl Serialize for Timestamp {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		serializer.serialize_i64(self.0)
	}
}

impl<'de> Deserialize<'de> for Timestamp {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		Ok(Timestamp(i64::deserialize(deserializer)?))
	}
}

// Role //
//******//
/// User role. Totally ordered: `User < Admin < Owner`.
///
/// Exactly one user holds `Owner`; the owner cannot be demoted or deleted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	User,
	Admin,
	Owner,
}

impl Role {
	pub fn as_str(&self) -> &'static str {
		match self {
			Role::User => "user",
			Role::Admin => "admin",
			Role::Owner => "owner",
		}
	}

	pub fn parse(s: &str) -> Option<Role> {
		match s {
			"user" => Some(Role::User),
			"admin" => Some(Role::Admin),
			"owner" => Some(Role::Owner),
			_ => None,
		}
	}

	pub fn is_admin(&self) -> bool {
		*self >= Role::Admin
	}
}

impl std::fmt::Display for Role {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

// Patch<T> - For PATCH semantics //
//**********************************//
/// Represents a field in a PATCH request with three states:
/// - `Undefined`: Field not present in JSON - don't change existing value
/// - `Null`: Field present with null value - set to NULL in database
/// - `Value(T)`: Field present with value - update to this value
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Patch<T> {
	#[default]
	Undefined,
	Null,
	Value(T),
}

impl<T> Patch<T> {
	pub fn is_undefined(&self) -> bool {
		matches!(self, Patch::Undefined)
	}

	pub fn is_null(&self) -> bool {
		matches!(self, Patch::Null)
	}

	pub fn value(&self) -> Option<&T> {
		match self {
			Patch::Value(v) => Some(v),
			_ => None,
		}
	}

	pub fn into_value(self) -> Option<T> {
		match self {
			Patch::Value(v) => Some(v),
			_ => None,
		}
	}
}

impl<'de, T> Deserialize<'de> for Patch<T>
where
	T: Deserialize<'de>,
{
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		Option::<T>::deserialize(deserializer).map(|opt| match opt {
			Some(v) => Patch::Value(v),
			None => Patch::Null,
		})
	}
}

// ApiResponse //
//*************//
/// Standard success envelope for control-plane responses
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
	pub data: T,
}

impl<T> ApiResponse<T> {
	pub fn new(data: T) -> Self {
		ApiResponse { data }
	}
}


// vim: ts=4

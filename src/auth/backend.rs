//! The pluggable backend trait every concrete auth method implements.

use std::collections::HashMap;

use strum::Display;

use crate::{client::Client, error::ConfigError};

/// The result of a single backend operation, returned by
/// [`AuthBackend::authenticate_client`] and the user-management hooks.
///
/// This mirrors the original's `auth_result` enum: a deliberately flat set
/// of outcomes rather than a `Result<(), E>`, because `NoMatch` is not a
/// failure (it means "try the next authenticator in the stack") while
/// `Failed` and `Forbidden` are.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
pub enum AuthResult {
	/// Authentication succeeded; the caller installs the authenticator's ACL
	/// and role onto the client.
	Ok,
	/// Authentication was attempted and failed (bad credentials, backend
	/// error, etc).
	Failed,
	/// This authenticator does not apply to the request; the stack should
	/// advance to the next node.
	NoMatch,
	/// The request is understood but not permitted.
	Forbidden,
	/// An async release (logout) completed.
	Released,
	/// A user-management `adduser` call succeeded.
	UserAdded,
	/// A user-management `adduser` call found the user already present.
	UserExists,
	/// A user-management `deleteuser` call succeeded.
	UserDeleted,
	/// The backend has no opinion; treated like `Failed` by callers but kept
	/// distinct for logging, mirroring the original's `AUTH_UNDEFINED`.
	Undefined,
}

/// A single plugged-in authentication method.
///
/// Concrete implementations live under [`crate::auth::backends`]. A backend
/// is free to hold its own state (an HTTP client, an open password file, an
/// in-memory user table) behind interior mutability, since `add_client` may
/// call `authenticate_client` from a worker thread while user-management
/// hooks are called from whatever thread owns the config/admin path.
pub trait AuthBackend: std::fmt::Debug + Send + Sync {
	/// Construct this backend from a config entry's arbitrary `options` map,
	/// named `role` and `management_url` already resolved by the caller.
	///
	/// # Errors
	/// Returns [`ConfigError`] if a required option is missing or malformed.
	fn from_options(options: &HashMap<String, String>) -> Result<Self, ConfigError>
	where
		Self: Sized;

	/// Authenticate `client` against this backend. Called on the
	/// authenticator's worker thread (or inline, if the authenticator is
	/// `immediate`).
	fn authenticate_client(&self, client: &mut Client) -> AuthResult;

	/// Whether this backend wants [`super::Authenticator::release_client`]
	/// to enqueue an asynchronous `release_client` work item rather than
	/// dropping the client's ACL synchronously. Backends whose logout is a
	/// pure in-memory operation (or that have no logout concept at all —
	/// the default) should leave this `false`.
	fn has_release_hook(&self) -> bool {
		false
	}

	/// Optional asynchronous logout hook, called only when
	/// [`AuthBackend::has_release_hook`] returns `true`.
	fn release_client(&self, _client: &mut Client) -> AuthResult {
		AuthResult::Released
	}

	/// Add a user with the given password, if this backend supports user
	/// management. The default implementation reports `Undefined`.
	fn adduser(&self, _username: &str, _password: &str) -> AuthResult {
		AuthResult::Undefined
	}

	/// Delete a user, if this backend supports user management.
	fn deleteuser(&self, _username: &str) -> AuthResult {
		AuthResult::Undefined
	}

	/// List configured users, if this backend supports user management.
	fn listuser(&self) -> Vec<String> {
		Vec::new()
	}
}

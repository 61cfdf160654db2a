//! Crate-wide error types, one enum per failure domain.
//!
//! Each domain gets its own [`thiserror::Error`] enum rather than a single
//! catch-all, so callers can match on the specific failure instead of
//! string-sniffing a message.

use thiserror::Error;

use crate::auth::AuthResult;

/// Errors raised while turning configuration data into live authenticators,
/// stacks, or listeners.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// The `type` attribute named an authenticator backend this crate does
	/// not recognize.
	#[error("unknown authenticator type: {0}")]
	UnknownAuthType(String),
	/// A required attribute was missing from a config element.
	#[error("missing required attribute: {0}")]
	MissingAttribute(&'static str),
	/// The `method` attribute contained a token that isn't a known HTTP
	/// method name and isn't `*`.
	#[error("invalid method name: {0}")]
	InvalidMethod(String),
	/// A listener descriptor didn't specify a port.
	#[error("listener is missing a port")]
	MissingPort,
}

/// Errors raised by [`crate::auth::Authenticator::add_client`] and friends.
#[derive(Debug, Error)]
pub enum AuthError {
	/// The authenticator's pending work queue is at its admission bound
	/// (100 items); the caller should serve the client an `AUTH_BUSY`
	/// response instead of enqueueing.
	#[error("authenticator queue is full")]
	QueueFull,
	/// The backend returned a non-[`AuthResult::Ok`] result.
	#[error("authenticator backend returned {0}")]
	BackendFailed(AuthResult),
}

/// Errors raised by the listen-socket container and individual listen
/// sockets.
#[derive(Debug, Error)]
pub enum ListenerError {
	/// Binding, listening on, or configuring the OS socket failed.
	#[error("socket operation failed")]
	Io(#[from] std::io::Error),
	/// An update was applied whose bind-address identity doesn't match the
	/// listen-socket it was applied to.
	#[error("listener identity mismatch: expected {expected}, got {got}")]
	IdentityMismatch {
		/// The listen-socket's existing identity, formatted as `addr:port`.
		expected: String,
		/// The update's identity, formatted as `addr:port`.
		got: String,
	},
	/// No sockets are currently bound; there is nothing to poll.
	#[error("no sockets available to poll")]
	NoSockets,
}

/// Errors raised by the client lifecycle.
#[derive(Debug, Error)]
pub enum ClientError {
	/// The global client count has reached the configured limit. Not fatal:
	/// the client is still created so it can carry an error response back.
	#[error("server client limit reached")]
	LimitReached,
	/// A read or write on the client's connection failed.
	#[error("transport error")]
	Transport(#[from] std::io::Error),
	/// The client could not be allocated.
	#[error("client allocation failed")]
	Alloc,
}

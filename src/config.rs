//! Configuration ingestion: turning an already-materialized config tree
//! (XML parsing is an external collaborator, out of scope here) into the
//! typed values the rest of the crate builds authenticators and listeners
//! from.
//!
//! Mirrors the teacher's `config::{Partial, Config}` split in spirit: one
//! small, `serde`-friendly struct per config element (here, `AuthConfig` and
//! `ListenerConfig`), converted with a fallible `TryFrom` that surfaces
//! [`ConfigError`] the same way the teacher's `IntoListenAddressError` and
//! `IntoPartialError` do, rather than panicking on bad input.

use std::{collections::HashMap, str::FromStr};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::warn;

use crate::{auth::AuthType, error::ConfigError, method::MethodMask};

/// One `<authentication>` config element, not yet turned into a live
/// [`crate::auth::Authenticator`] (that still needs a constructed backend
/// and an `Arc`, which this crate-internal type deliberately doesn't own).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
	/// The `type` attribute, required, carried as the raw string from the
	/// config tree until [`ResolvedAuthConfig::try_from`] validates it — an
	/// unrecognized value is a configuration error, not a panic (§6/§7:
	/// "Unknown type values fail construction with a logged error").
	pub auth_type: String,
	/// The `name` attribute: the role string copied onto a client on a
	/// successful match. Defaults to the auth type's name when absent.
	pub role: Option<String>,
	/// The `method` attribute: comma-separated method names or `*`.
	/// Absent means "every method", matching [`MethodMask::default`].
	pub method: Option<String>,
	/// The optional mount-path label.
	pub mount: Option<String>,
	/// The `management-url` attribute. Defaults to `/auth/{id}` at
	/// authenticator construction time when absent.
	pub management_url: Option<String>,
	/// Whether this authenticator processes work inline on the calling
	/// thread rather than via a dedicated worker. Backends with no
	/// blocking I/O (anonymous, static) typically set this.
	#[serde(default)]
	pub immediate: bool,
	/// `<option name="…" value="…"/>` children, passed verbatim to the
	/// backend's [`crate::auth::AuthBackend::from_options`].
	#[serde(default)]
	pub options: HashMap<String, String>,
}

/// The outcome of validating an [`AuthConfig`]: everything an
/// [`crate::auth::Authenticator::new`] caller needs, with the method mask
/// already parsed and the role already defaulted.
#[derive(Clone, Debug)]
pub struct ResolvedAuthConfig {
	/// The authenticator backend kind.
	pub auth_type: AuthType,
	/// The role string, defaulted from `auth_type`'s name if not given.
	pub role: String,
	/// The parsed method mask.
	pub methods: MethodMask,
	/// The mount-path label, if any.
	pub mount: Option<String>,
	/// The explicit management URL, if any (authenticator construction
	/// defaults this from `id` when `None`).
	pub management_url: Option<String>,
	/// Whether to run this authenticator's backend inline.
	pub immediate: bool,
	/// Options to hand to the backend.
	pub options: HashMap<String, String>,
}

impl TryFrom<AuthConfig> for ResolvedAuthConfig {
	type Error = ConfigError;

	/// Validate and resolve an [`AuthConfig`]: parse its `method` attribute
	/// (§6/§7), defaulting to "all methods" on an absent or empty value,
	/// and default an absent role to the auth type's name.
	///
	/// # Errors
	/// Returns [`ConfigError::UnknownAuthType`] if `auth_type` doesn't name a
	/// recognized backend, and [`ConfigError::InvalidMethod`] if `method`
	/// names a token that isn't a known HTTP method and isn't `*`.
	fn try_from(raw: AuthConfig) -> Result<Self, Self::Error> {
		let auth_type = AuthType::from_str(&raw.auth_type).map_err(|_| {
			warn!(auth_type = %raw.auth_type, "unrecognized authentication type; refusing this element");
			ConfigError::UnknownAuthType(raw.auth_type.clone())
		})?;

		let methods = match raw.method {
			Some(spec) => MethodMask::parse(&spec).map_err(ConfigError::InvalidMethod)?,
			None => MethodMask::all(),
		};

		let role = raw.role.unwrap_or_else(|| auth_type.to_string());

		Ok(Self {
			auth_type,
			role,
			methods,
			mount: raw.mount,
			management_url: raw.management_url,
			immediate: raw.immediate,
			options: raw.options,
		})
	}
}

/// Whether a listener binds a real OS socket.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ListenerType {
	/// Binds an OS socket and accepts real connections.
	#[default]
	Normal,
	/// Exists in config for internal routing purposes only; never binds an
	/// OS socket (§3/§4.3's "virtual listener").
	Virtual,
	/// A sentinel entry used to report a configuration error without
	/// crashing the rest of the listener set.
	Error,
}

impl ListenerType {
	/// Whether [`crate::listener::ListenSocketContainer::setup`] should
	/// bind an OS socket for a listener of this type.
	#[must_use]
	pub fn binds_socket(self) -> bool {
		matches!(self, Self::Normal)
	}
}

/// The TLS posture of a listener.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum TlsMode {
	/// No TLS on this listener; plain HTTP only.
	#[default]
	Disabled,
	/// Accept either plain HTTP or a TLS handshake on the same socket,
	/// detected per-connection.
	Auto,
	/// Like `Auto`, but refuses plain HTTP once a TLS handshake has been
	/// observed (the original's "no going back to plaintext" mode).
	AutoNoPlain,
	/// Upgrade via an explicit protocol command (RFC 2817-style
	/// `Upgrade:`).
	Rfc2817,
	/// Always TLS from the first byte (RFC 2818-style, i.e. plain HTTPS).
	Rfc2818,
}

/// One listener descriptor: a `(bind_address, port)` identity plus
/// attributes that may freely change across a [`ListenerConfig`] update
/// without affecting that identity (§4.3's "identity rule").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ListenerConfig {
	/// The port to listen on.
	pub port: u16,
	/// The bind address, or `None` to listen on every address.
	pub bind_address: Option<String>,
	/// Whether this listener binds a real OS socket.
	#[serde(default)]
	pub listener_type: ListenerType,
	/// This listener's TLS posture.
	#[serde(default)]
	pub tls_mode: TlsMode,
	/// The socket send-buffer size to install once bound, in bytes.
	pub send_buffer_size: Option<usize>,
}

impl ListenerConfig {
	/// The `(bind_address, port)` identity pair used by
	/// [`crate::listener::ListenSocketContainer::configure`]'s preservation
	/// rule: two descriptors identify the same listen-socket iff this pair
	/// is equal. Non-identity attributes (buffer size, TLS mode, type) are
	/// free to differ across an update.
	#[must_use]
	pub fn identity(&self) -> (Option<&str>, u16) {
		(self.bind_address.as_deref(), self.port)
	}
}

/// The set of listeners a [`crate::listener::ListenSocketContainer`] should
/// converge to, as produced by config ingestion.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ListenerSetConfig {
	/// The configured listeners, in the order they were declared. Order has
	/// no behavioral significance beyond iteration order in logs.
	pub listeners: Vec<ListenerConfig>,
}

impl ListenerSetConfig {
	/// A config with a single listener on `port`, bound to every address.
	#[must_use]
	pub fn single(port: u16) -> Self {
		Self {
			listeners: vec![ListenerConfig {
				port,
				bind_address: None,
				listener_type: ListenerType::Normal,
				tls_mode: TlsMode::Disabled,
				send_buffer_size: None,
			}],
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn resolved_defaults_role_from_auth_type() {
		let raw = AuthConfig {
			auth_type: "anonymous".to_string(),
			role: None,
			method: None,
			mount: None,
			management_url: None,
			immediate: true,
			options: HashMap::new(),
		};
		let resolved = ResolvedAuthConfig::try_from(raw).unwrap();
		assert_eq!(resolved.role, "anonymous");
		assert!(resolved.methods.admits(crate::method::HttpMethod::Get));
	}

	#[test]
	fn resolved_rejects_unknown_method() {
		let raw = AuthConfig {
			auth_type: "htpasswd".to_string(),
			role: Some("viewer".to_string()),
			method: Some("GET,BOGUS".to_string()),
			mount: None,
			management_url: None,
			immediate: false,
			options: HashMap::new(),
		};
		assert!(matches!(
			ResolvedAuthConfig::try_from(raw),
			Err(ConfigError::InvalidMethod(_))
		));
	}

	#[test]
	fn resolved_rejects_unknown_auth_type() {
		let raw = AuthConfig {
			auth_type: "carrier-pigeon".to_string(),
			role: None,
			method: None,
			mount: None,
			management_url: None,
			immediate: true,
			options: HashMap::new(),
		};
		assert!(matches!(
			ResolvedAuthConfig::try_from(raw),
			Err(ConfigError::UnknownAuthType(t)) if t == "carrier-pigeon"
		));
	}

	#[test]
	fn resolved_accepts_legacy_password_alias() {
		let raw = AuthConfig {
			auth_type: "legacy-password".to_string(),
			role: None,
			method: None,
			mount: None,
			management_url: None,
			immediate: true,
			options: HashMap::new(),
		};
		let resolved = ResolvedAuthConfig::try_from(raw).unwrap();
		assert_eq!(resolved.auth_type, AuthType::LegacyPassword);
	}

	#[test]
	fn listener_identity_ignores_non_identity_fields() {
		let a = ListenerConfig {
			port: 8443,
			bind_address: None,
			listener_type: ListenerType::Normal,
			tls_mode: TlsMode::Disabled,
			send_buffer_size: Some(4096),
		};
		let b = ListenerConfig {
			port: 8443,
			bind_address: None,
			listener_type: ListenerType::Virtual,
			tls_mode: TlsMode::Rfc2818,
			send_buffer_size: Some(65536),
		};
		assert_eq!(a.identity(), b.identity());
	}
}

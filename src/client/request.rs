//! The minimal shape of an HTTP/1 request this crate needs. Parsing the
//! request line and headers off the wire is an external collaborator's job
//! (see crate-level docs); this module only models what's left once that's
//! done.

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

use crate::method::HttpMethod;

/// A parsed HTTP/1 request, down to the fields the auth/listener core
/// actually consumes: method, headers, and (derived) Basic-auth
/// credentials.
#[derive(Clone, Debug)]
pub struct Request {
	method: HttpMethod,
	/// Header names are stored lowercase; lookups normalize to match.
	headers: HashMap<String, String>,
}

impl Request {
	/// Build a request from its method and header map. Header names are
	/// lowercased on the way in so lookups are case-insensitive.
	#[must_use]
	pub fn new(method: HttpMethod, headers: HashMap<String, String>) -> Self {
		let headers = headers
			.into_iter()
			.map(|(name, value)| (name.to_ascii_lowercase(), value))
			.collect();
		Self { method, headers }
	}

	/// This request's method.
	#[must_use]
	pub fn method(&self) -> HttpMethod {
		self.method
	}

	/// Look up a header by name, case-insensitively.
	#[must_use]
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
	}

	/// Decode this request's `Authorization: Basic <base64>` header into a
	/// `(username, password)` pair, split on the first `:`.
	///
	/// Returns `None` for a missing header, a non-`Basic` scheme, malformed
	/// base64, or a payload with no `:` separator — all of which are
	/// protocol violations per the spec, logged here and treated as "no
	/// credentials supplied" rather than a hard error.
	#[must_use]
	pub fn basic_auth(&self) -> Option<(String, String)> {
		let header = self.header("authorization")?;
		let payload = header.strip_prefix("Basic ").or_else(|| header.strip_prefix("basic "))?;

		let decoded = match STANDARD.decode(payload.trim()) {
			Ok(bytes) => bytes,
			Err(err) => {
				debug!("malformed Basic auth payload: {err}");
				return None;
			}
		};

		let decoded = match String::from_utf8(decoded) {
			Ok(s) => s,
			Err(err) => {
				debug!("non-UTF8 Basic auth payload: {err}");
				return None;
			}
		};

		match decoded.split_once(':') {
			Some((user, pass)) => Some((user.to_string(), pass.to_string())),
			None => {
				debug!("Basic auth payload has no ':' separator");
				None
			}
		}
	}

	/// The `Accept` header's preference between `text/plain` and
	/// `text/html`, used to pick an error body's content type. Defaults to
	/// `text/html` absent an `Accept` header or an unrecognized one,
	/// matching the original's fallback.
	#[must_use]
	pub fn prefers_plain_text(&self) -> bool {
		match self.header("accept") {
			Some(accept) => {
				let accept = accept.to_ascii_lowercase();
				let plain_pos = accept.find("text/plain");
				let html_pos = accept.find("text/html");
				match (plain_pos, html_pos) {
					(Some(p), Some(h)) => p < h,
					(Some(_), None) => true,
					_ => false,
				}
			}
			None => false,
		}
	}

	/// The port named in the `Host` header, if any — a workaround for
	/// clients that omit the port, per spec §7: `Host` is only honored when
	/// it carries an explicit port.
	#[must_use]
	pub fn host_port(&self) -> Option<u16> {
		let host = self.header("host")?;
		let (_, port) = host.rsplit_once(':')?;
		port.parse().ok()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
		pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
	}

	#[test]
	fn basic_auth_round_trips() {
		let req = Request::new(
			HttpMethod::Get,
			headers(&[("Authorization", "Basic dXNlcjpwYXNz")]),
		);
		assert_eq!(req.basic_auth(), Some(("user".to_string(), "pass".to_string())));
	}

	#[test]
	fn basic_auth_rejects_non_basic_scheme() {
		let req = Request::new(HttpMethod::Get, headers(&[("Authorization", "Bearer abc")]));
		assert_eq!(req.basic_auth(), None);
	}

	#[test]
	fn basic_auth_rejects_missing_separator() {
		let payload = STANDARD.encode("nocolon");
		let req = Request::new(
			HttpMethod::Get,
			headers(&[("Authorization", &format!("Basic {payload}"))]),
		);
		assert_eq!(req.basic_auth(), None);
	}

	#[test]
	fn header_lookup_is_case_insensitive() {
		let req = Request::new(HttpMethod::Get, headers(&[("Host", "example.com:8080")]));
		assert_eq!(req.header("HOST"), Some("example.com:8080"));
		assert_eq!(req.host_port(), Some(8080));
	}

	#[test]
	fn host_without_port_is_not_honored() {
		let req = Request::new(HttpMethod::Get, headers(&[("Host", "example.com")]));
		assert_eq!(req.host_port(), None);
	}

	#[test]
	fn accept_prefers_whichever_appears_first() {
		let req = Request::new(HttpMethod::Get, headers(&[("Accept", "text/html, text/plain")]));
		assert!(!req.prefers_plain_text());

		let req = Request::new(HttpMethod::Get, headers(&[("Accept", "text/plain, text/html")]));
		assert!(req.prefers_plain_text());
	}
}

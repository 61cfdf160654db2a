//! Canned response builders: 101 Switching Protocols, 204 No Content, 426
//! Upgrade Required, a resilient 500, and the templated error-by-ID page.

use uuid::Uuid;

use super::request::Request;

/// An HTTP response this crate knows how to build wholesale, serialized as
/// raw bytes ready to hand to [`super::Connection::send`].
#[derive(Clone, Debug)]
pub struct Response {
	status: u16,
	reason: &'static str,
	headers: Vec<(String, String)>,
	body: Vec<u8>,
}

impl Response {
	fn new(status: u16, reason: &'static str) -> Self {
		Self {
			status,
			reason,
			headers: Vec::new(),
			body: Vec::new(),
		}
	}

	fn with_body(mut self, content_type: &str, body: Vec<u8>) -> Self {
		self.headers.push(("Content-Type".to_string(), content_type.to_string()));
		self.headers.push(("Content-Length".to_string(), body.len().to_string()));
		self.body = body;
		self
	}

	fn with_header(mut self, name: &str, value: &str) -> Self {
		self.headers.push((name.to_string(), value.to_string()));
		self
	}

	/// This response's numeric status code.
	#[must_use]
	pub fn status(&self) -> u16 {
		self.status
	}

	/// Serialize this response as raw HTTP/1.1 bytes: status line, headers
	/// (`Content-Length` always present on a generated body), a blank line,
	/// and the body.
	#[must_use]
	pub fn to_bytes(&self) -> Vec<u8> {
		let mut out = format!("HTTP/1.1 {} {}\r\n", self.status, self.reason).into_bytes();
		for (name, value) in &self.headers {
			out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
		}
		out.extend_from_slice(b"\r\n");
		out.extend_from_slice(&self.body);
		out
	}
}

/// Build a `101 Switching Protocols` response advertising the TLS upgrade,
/// per §7: `Upgrade: TLS/1.0, HTTP/1.0` is emitted alongside 101 and 426.
#[must_use]
pub fn switching_protocols() -> Response {
	Response::new(101, "Switching Protocols")
		.with_header("Upgrade", "TLS/1.0, HTTP/1.0")
		.with_header("Connection", "Upgrade")
}

/// Build a `204 No Content` response.
#[must_use]
pub fn no_content() -> Response {
	Response::new(204, "No Content")
}

/// Build a `426 Upgrade Required` response, telling the client to retry
/// over TLS.
#[must_use]
pub fn upgrade_required() -> Response {
	Response::new(426, "Upgrade Required")
		.with_header("Upgrade", "TLS/1.0, HTTP/1.0")
		.with_body(
			"text/plain",
			b"This resource requires a secure connection.".to_vec(),
		)
}

/// A 500 response that does not touch any client state beyond what's
/// passed in — safe to call even on a partially constructed client, per
/// §5.4's "a 500 builder is resilient" requirement.
#[must_use]
pub fn internal_error() -> Response {
	Response::new(500, "Internal Server Error")
		.with_body("text/plain", b"Internal server error.".to_vec())
}

/// A named, templated error condition: a numeric status, a human message,
/// and a freshly generated opaque UUID quoted in the body so an operator
/// can correlate a client-visible error with server-side logs.
#[derive(Copy, Clone, Debug)]
pub struct ErrorId {
	status: u16,
	reason: &'static str,
	message: &'static str,
}

impl ErrorId {
	/// The authenticator's pending queue is full (§5.1's 100-item admission
	/// bound).
	pub const AUTH_BUSY: Self = Self {
		status: 503,
		reason: "Service Unavailable",
		message: "This server is currently busy processing authentication requests, please try again later.",
	};
	/// The backend authenticator returned `Forbidden`.
	pub const FORBIDDEN: Self = Self {
		status: 403,
		reason: "Forbidden",
		message: "You are not permitted to perform this action.",
	};
	/// No authenticator in the stack matched and none granted access.
	pub const UNAUTHORIZED: Self = Self {
		status: 401,
		reason: "Unauthorized",
		message: "Valid authentication credentials are required for this resource.",
	};
	/// The global client-count limit has been reached.
	pub const CLIENT_LIMIT: Self = Self {
		status: 503,
		reason: "Service Unavailable",
		message: "This server has reached its maximum number of concurrent clients.",
	};

	/// Build the response for this error, negotiating `text/plain` vs
	/// `text/html` against the request's `Accept` header (defaulting to
	/// HTML, matching [`Request::prefers_plain_text`]'s fallback).
	#[must_use]
	pub fn build(self, request: Option<&Request>) -> Response {
		let uuid = Uuid::new_v4();
		let plain = request.is_some_and(Request::prefers_plain_text);

		let (content_type, body) = if plain {
			(
				"text/plain",
				format!("{} {}\n{}\nError reference: {uuid}\n", self.status, self.reason, self.message),
			)
		} else {
			(
				"text/html",
				format!(
					"<html><head><title>{status} {reason}</title></head><body>\
					<h1>{status} {reason}</h1><p>{message}</p>\
					<p><small>Error reference: {uuid}</small></p></body></html>",
					status = self.status,
					reason = self.reason,
					message = self.message,
				),
			)
		};

		Response::new(self.status, self.reason).with_body(content_type, body.into_bytes())
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use super::*;
	use crate::method::HttpMethod;

	#[test]
	fn error_response_sets_content_length() {
		let resp = ErrorId::AUTH_BUSY.build(None);
		let bytes = resp.to_bytes();
		let text = String::from_utf8_lossy(&bytes);
		assert!(text.contains("HTTP/1.1 503 Service Unavailable"));
		assert!(text.contains("Content-Length:"));
	}

	#[test]
	fn error_response_honors_plain_text_preference() {
		let headers: HashMap<String, String> =
			[("Accept".to_string(), "text/plain".to_string())].into();
		let request = Request::new(HttpMethod::Get, headers);
		let resp = ErrorId::FORBIDDEN.build(Some(&request));
		assert_eq!(resp.status(), 403);
		let bytes = resp.to_bytes();
		assert!(String::from_utf8_lossy(&bytes).contains("Content-Type: text/plain"));
	}

	#[test]
	fn switching_protocols_carries_upgrade_header() {
		let bytes = switching_protocols().to_bytes();
		let text = String::from_utf8_lossy(&bytes);
		assert!(text.contains("101 Switching Protocols"));
		assert!(text.contains("Upgrade: TLS/1.0, HTTP/1.0"));
	}

	#[test]
	fn internal_error_does_not_require_a_request() {
		let bytes = internal_error().to_bytes();
		assert!(String::from_utf8_lossy(&bytes).starts_with("HTTP/1.1 500"));
	}
}

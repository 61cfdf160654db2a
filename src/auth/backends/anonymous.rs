//! The `anonymous` backend: admits every client without looking at
//! credentials. Grounded in the original's `auth_get_anonymous_auth`, which
//! wires a single static `AUTH_OK` responder with no options of its own.

use std::collections::HashMap;

use crate::{auth::AuthResult, client::Client, error::ConfigError};

use super::super::backend::AuthBackend;

/// Always accepts. Typically the last node of a stack, with a restrictive
/// method mask (e.g. only `GET`) so it only covers listener access and
/// falls through for everything else.
#[derive(Debug, Default)]
pub struct AnonymousBackend;

impl AuthBackend for AnonymousBackend {
	fn from_options(_options: &HashMap<String, String>) -> Result<Self, ConfigError> {
		Ok(Self)
	}

	fn authenticate_client(&self, _client: &mut Client) -> AuthResult {
		AuthResult::Ok
	}
}

#[cfg(test)]
mod tests {
	use std::{collections::HashMap as Map, net::SocketAddr};

	use socket2::{Domain, Socket, Type};

	use super::*;
	use crate::{client::ClientCreate, client::ClientRegistry, client::Connection, client::Request, method::HttpMethod};

	#[test]
	fn always_accepts() {
		let backend = AnonymousBackend::from_options(&Map::new()).unwrap();
		let socket = Socket::new(Domain::IPV4, Type::STREAM, None).unwrap();
		let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
		let connection = Connection::new(socket, addr);
		let request = Request::new(HttpMethod::Get, Map::new());
		let registry = ClientRegistry::new(10);
		let mut client = match Client::create(connection, request, &registry) {
			ClientCreate::Created(c) | ClientCreate::CapExceeded(c) => c,
		};
		assert_eq!(backend.authenticate_client(&mut client), AuthResult::Ok);
	}
}

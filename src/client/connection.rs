//! The live network connection underneath a [`super::Client`], and the
//! opaque TLS session handle that can be transplanted across a reuse
//! boundary.

use std::{
	any::Any,
	io::{self, Read, Write},
	net::SocketAddr,
};

use socket2::Socket;

/// An opaque TLS session handle. The core never inspects this — it only
/// moves it between [`Connection`]s across a keep-alive / TLS-upgrade
/// reuse boundary (§5.4). The concrete session type (e.g. an `rustls`
/// `ServerConnection`) is supplied by whatever collaborator terminates TLS.
pub struct TlsSession(Box<dyn Any + Send>);

impl TlsSession {
	/// Wrap a concrete session value.
	pub fn new(session: impl Any + Send) -> Self {
		Self(Box::new(session))
	}

	/// Downcast back to the concrete session type.
	#[must_use]
	pub fn downcast<T: Any>(self) -> Result<Box<T>, Self> {
		if self.0.is::<T>() {
			Ok(self.0.downcast().expect("is::<T> just checked"))
		} else {
			Err(self)
		}
	}
}

impl std::fmt::Debug for TlsSession {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str("TlsSession(..)")
	}
}

/// A live connection: the accepted OS socket plus whatever TLS session sits
/// on top of it.
///
/// `Connection` is the unit that [`super::Client::reuse`] transplants across
/// a destroy/recreate boundary: the new connection steals the old one's
/// socket descriptor (and, for a TLS upgrade, its session handle), and the
/// old connection is left with nothing to operate on.
#[derive(Debug)]
pub struct Connection {
	socket: Option<Socket>,
	peer: SocketAddr,
	tls: Option<TlsSession>,
	uses_tls: bool,
	errored: bool,
}

impl Connection {
	/// Wrap a freshly accepted socket.
	#[must_use]
	pub fn new(socket: Socket, peer: SocketAddr) -> Self {
		Self {
			socket: Some(socket),
			peer,
			tls: None,
			uses_tls: false,
			errored: false,
		}
	}

	/// The peer address this connection was accepted from.
	#[must_use]
	pub fn peer_addr(&self) -> SocketAddr {
		self.peer
	}

	/// Whether this connection is marked as speaking TLS, whether or not it
	/// yet carries a session handle (see [`Connection::mark_uses_tls`]).
	#[must_use]
	pub fn is_tls(&self) -> bool {
		self.uses_tls || self.tls.is_some()
	}

	/// Install a TLS session onto this connection, marking it as using TLS.
	pub fn set_tls(&mut self, session: TlsSession) {
		self.tls = Some(session);
		self.uses_tls = true;
	}

	/// Mark this connection as speaking TLS without installing a session
	/// handle, mirroring the original's `connection_uses_tls`. Used for a
	/// fresh STARTTLS-upgraded connection, which has no prior session to
	/// carry over — only the fact that the next bytes off the wire are a TLS
	/// handshake.
	pub fn mark_uses_tls(&mut self) {
		self.uses_tls = true;
	}

	/// Whether a prior read or write observed an I/O error. A client whose
	/// connection has errored is destroyed at the next opportunity rather
	/// than reused.
	#[must_use]
	pub fn is_errored(&self) -> bool {
		self.errored
	}

	/// A placeholder connection carrying no socket, used when a reuse
	/// request had nothing to steal from (the original connection was
	/// already socket-less). Reports itself errored so the caller destroys
	/// it again immediately rather than trying to serve anything on it.
	pub(crate) fn disconnected(peer: SocketAddr) -> Self {
		Self {
			socket: None,
			peer,
			tls: None,
			uses_tls: false,
			errored: true,
		}
	}

	/// Steal this connection's socket descriptor and TLS session, leaving
	/// `self` with neither. Used by the keep-alive / TLS-upgrade reuse path
	/// to hand the live socket to a freshly created `Connection` while the
	/// old `Client` is destroyed.
	///
	/// Exactly one `Connection` owns the socket at a time: after this call,
	/// `self` can no longer perform I/O (`send`/`recv` return `NotConnected`).
	pub fn steal(&mut self) -> (Option<Socket>, Option<TlsSession>) {
		(self.socket.take(), self.tls.take())
	}

	/// Write `buf` to the underlying socket, recording an error on failure.
	pub fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
		let result = match &mut self.socket {
			Some(socket) => socket.write(buf),
			None => Err(io::Error::from(io::ErrorKind::NotConnected)),
		};
		if result.is_err() {
			self.errored = true;
		}
		result
	}

	/// Read from the underlying socket into `buf`, recording an error on
	/// failure.
	pub fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		let result = match &mut self.socket {
			Some(socket) => socket.read(buf),
			None => Err(io::Error::from(io::ErrorKind::NotConnected)),
		};
		if result.is_err() {
			self.errored = true;
		}
		result
	}
}

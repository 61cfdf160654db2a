//! A single listen-socket: a `(bind_address, port)` identity, a possibly
//! unbound OS socket, and the listener-config snapshot that socket was
//! bound from.
//!
//! Grounded in the teacher's `server::Listener::new` (the `socket2`
//! bind/listen/nonblocking dance: `set_reuse_address`, `set_only_v6`,
//! `set_nonblocking`, `bind`, `listen`) and, for the config-snapshot half,
//! on `CertificateResolver`'s swap-under-a-lock pattern — here a
//! `parking_lot::RwLock<ListenerConfig>` instead of an `ArcSwap`, since the
//! snapshot is a small `Clone` struct rather than something worth sharing by
//! `Arc`.

use std::{
	net::SocketAddr,
	ops::Deref,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
};

use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use socket2::{Domain, Protocol as SocketProtocol, SockAddr, Socket, Type};
use tracing::debug;

use crate::{
	config::{ListenerConfig, ListenerType},
	error::ListenerError,
};

/// Backlog size passed to `listen(2)`, matching the teacher's
/// `LISTENER_TCP_BACKLOG_SIZE`.
const LISTEN_BACKLOG: i32 = 1024;

/// A read guard over a listen-socket's current [`ListenerConfig`] snapshot.
///
/// Per §5/§9's deadlock-avoidance note, `get_listener` intentionally
/// returns while still holding the listener's read lock; the matching
/// `release_listener` is enforced here by the type system (this guard's
/// `Drop`) rather than by a manual lock/unlock pair a caller could forget.
pub struct ListenerGuard<'a> {
	inner: RwLockReadGuard<'a, ListenerConfig>,
}

impl Deref for ListenerGuard<'_> {
	type Target = ListenerConfig;

	fn deref(&self) -> &Self::Target {
		&self.inner
	}
}

/// One entry in a [`super::container::ListenSocketContainer`]: a config
/// identity, the listener-config snapshot it was last updated with, and
/// (for a `Normal` listener) the bound OS socket.
///
/// Structural lifetime is `Arc`-backed, matching the rest of the crate
/// (e.g. [`crate::auth::Authenticator`], [`crate::auth::stack::AuthStack`]
/// node); the "OS-socket ref" the distilled spec calls out separately
/// collapses here into whether `socket` is `Some` — a listen-socket either
/// currently holds a bound OS socket or it doesn't, so a second counter
/// alongside an `Option` would just be able to disagree with it.
#[derive(Debug)]
pub struct ListenSocket {
	config: RwLock<ListenerConfig>,
	socket: Mutex<Option<Socket>>,
	errored: AtomicBool,
}

impl ListenSocket {
	/// A fresh, unbound listen-socket carrying `config`.
	#[must_use]
	pub fn new(config: ListenerConfig) -> Arc<Self> {
		Arc::new(Self {
			config: RwLock::new(config),
			socket: Mutex::new(None),
			errored: AtomicBool::new(false),
		})
	}

	/// This listen-socket's `(bind_address, port)` identity.
	#[must_use]
	pub fn identity(&self) -> (Option<String>, u16) {
		let config = self.config.read();
		(config.bind_address.clone(), config.port)
	}

	/// A snapshot of the current listener config.
	#[must_use]
	pub fn config(&self) -> ListenerConfig {
		self.config.read().clone()
	}

	/// Take and hold the listener-config read lock. See [`ListenerGuard`]
	/// for why this is a guard rather than a plain snapshot copy.
	#[must_use]
	pub fn get_listener(&self) -> ListenerGuard<'_> {
		ListenerGuard { inner: self.config.read() }
	}

	/// Replace this listen-socket's config, refusing an update whose
	/// identity doesn't match the existing one (§4.3's immutable-identity
	/// invariant). Non-identity attributes (buffer size, TLS mode, type)
	/// are free to change.
	///
	/// # Errors
	/// Returns [`ListenerError::IdentityMismatch`] if `new`'s
	/// `(bind_address, port)` differs from this listen-socket's current
	/// identity.
	pub fn update_config(&self, new: ListenerConfig) -> Result<(), ListenerError> {
		let mut current = self.config.write();
		if current.identity() != new.identity() {
			return Err(ListenerError::IdentityMismatch {
				expected: format!("{:?}:{}", current.bind_address, current.port),
				got: format!("{:?}:{}", new.bind_address, new.port),
			});
		}
		*current = new;
		Ok(())
	}

	/// Whether this listen-socket currently holds a bound OS socket.
	#[must_use]
	pub fn is_bound(&self) -> bool {
		self.socket.lock().is_some()
	}

	/// Whether a prior accept attempt observed a fatal error on this
	/// socket. A container drops such a listen-socket from its next
	/// accept pass rather than retrying it every poll.
	#[must_use]
	pub fn is_errored(&self) -> bool {
		self.errored.load(Ordering::Acquire)
	}

	/// Bind and `listen` this listen-socket's OS socket per its current
	/// config, installing the send-buffer size and non-blocking mode. A
	/// no-op if already bound.
	///
	/// # Errors
	/// Returns [`ListenerError::Io`] if any socket syscall fails.
	pub fn bind(&self) -> Result<(), ListenerError> {
		if self.is_bound() {
			return Ok(());
		}

		let config = self.config();
		let addr = bind_socket_addr(&config);

		let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(SocketProtocol::TCP))?;
		socket.set_reuse_address(cfg!(unix))?;
		if addr.is_ipv6() {
			socket.set_only_v6(config.bind_address.is_some())?;
		}
		socket.set_nonblocking(true)?;
		if let Some(size) = config.send_buffer_size {
			socket.set_send_buffer_size(size)?;
		}

		socket.bind(&SockAddr::from(addr))?;
		socket.listen(LISTEN_BACKLOG)?;

		debug!(port = config.port, bind_address = ?config.bind_address, "listen socket bound");
		*self.socket.lock() = Some(socket);
		self.errored.store(false, Ordering::Release);
		Ok(())
	}

	/// Drop the OS socket, if any (`setup`'s virtual-listener unref path,
	/// or a forced unref after an accept-time error).
	pub fn unbind(&self) {
		*self.socket.lock() = None;
	}

	/// Accept one pending connection, if any is ready, without blocking.
	///
	/// Returns `Ok(None)` for `WouldBlock` (nothing pending); any other
	/// error marks this listen-socket errored (the caller is expected to
	/// `unbind` it) rather than returning it to a connection handler.
	///
	/// # Errors
	/// Returns the underlying I/O error for anything other than
	/// `WouldBlock`.
	pub fn accept_one(&self) -> std::io::Result<Option<(Socket, SocketAddr)>> {
		let guard = self.socket.lock();
		let Some(socket) = guard.as_ref() else {
			return Ok(None);
		};

		match socket.accept() {
			Ok((accepted, addr)) => Ok(Some((accepted, addr.as_socket().unwrap_or(bind_socket_addr(&self.config()))))),
			Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
			Err(err) => {
				self.errored.store(true, Ordering::Release);
				Err(err)
			}
		}
	}

	/// The raw file descriptor of the bound OS socket, used by the
	/// container to register this listen-socket with `mio` for readiness
	/// polling. `None` if unbound.
	#[cfg(unix)]
	#[must_use]
	pub fn raw_fd(&self) -> Option<std::os::unix::io::RawFd> {
		use std::os::unix::io::AsRawFd;
		self.socket.lock().as_ref().map(Socket::as_raw_fd)
	}
}

/// Resolve a [`ListenerConfig`]'s bind address: an explicit address, or "any
/// address" (IPv6 unspecified, matching the teacher's dual-stack-by-default
/// choice — see [`ListenSocket::bind`]'s `set_only_v6` call for the caveat
/// about platforms without dual-stack support).
fn bind_socket_addr(config: &ListenerConfig) -> SocketAddr {
	let addr = match &config.bind_address {
		Some(addr) => addr.parse().unwrap_or(std::net::IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)),
		None => std::net::IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED),
	};
	SocketAddr::new(addr, config.port)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn config(port: u16) -> ListenerConfig {
		ListenerConfig {
			port,
			bind_address: Some("127.0.0.1".to_string()),
			listener_type: ListenerType::Normal,
			tls_mode: crate::config::TlsMode::Disabled,
			send_buffer_size: None,
		}
	}

	#[test]
	fn bind_then_unbind_toggles_is_bound() {
		let listener = ListenSocket::new(config(0));
		assert!(!listener.is_bound());
		listener.bind().unwrap();
		assert!(listener.is_bound());
		listener.unbind();
		assert!(!listener.is_bound());
	}

	#[test]
	fn update_config_rejects_identity_change() {
		let listener = ListenSocket::new(config(8000));
		let mut other = config(9000);
		other.bind_address = config(8000).bind_address;
		assert!(matches!(listener.update_config(other), Err(ListenerError::IdentityMismatch { .. })));
	}

	#[test]
	fn update_config_allows_non_identity_change() {
		let listener = ListenSocket::new(config(8000));
		let mut same_identity = config(8000);
		same_identity.send_buffer_size = Some(65536);
		listener.update_config(same_identity).unwrap();
		assert_eq!(listener.config().send_buffer_size, Some(65536));
	}

	#[test]
	fn accept_one_on_unbound_socket_is_none() {
		let listener = ListenSocket::new(config(0));
		assert!(listener.accept_one().unwrap().is_none());
	}
}

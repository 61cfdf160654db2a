//! Client creation, auth binding, keep-alive / TLS-upgrade reuse, and
//! destruction.

pub mod connection;
pub mod refbuf;
pub mod request;
pub mod response;

use std::sync::{
	atomic::{AtomicUsize, Ordering},
	Arc,
};

use tracing::{debug, info, instrument, warn};

use crate::{
	acl::Acl,
	auth::{stack::StackCursor, Authenticator, ReleaseOutcome},
};
pub use connection::Connection;
pub use refbuf::Refbuf;
pub use request::Request;

/// The protocol a client's connection is speaking. The original tracks this
/// to distinguish plain HTTP from (eventually) other source protocols; this
/// crate only ever sees HTTP, but the field is kept so downstream
/// collaborators can extend it.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Protocol {
	#[default]
	Http,
}

/// An admin command a client's request may be carrying, consumed by the
/// (external) admin-command handler. Defaults to `Error`, matching the
/// original's `client_create` default.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum AdminCommand {
	#[default]
	Error,
	Stats,
	Metadata,
	ListMounts,
	Fallbacks,
	Killsource,
	KillClient,
}

/// The client's post-response directive, decided by the format handler that
/// served the request and consumed by [`Client::destroy`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ReuseDisposition {
	/// Close the connection for good.
	#[default]
	Close,
	/// Keep the TCP connection open for another HTTP/1.1 request.
	Keepalive,
	/// Re-accept the same socket as a TLS connection (STARTTLS-style
	/// upgrade).
	UpgradeTls,
}

/// Shared, process-wide bookkeeping for the client count cap. Every
/// [`Client::create`] call increments this; every terminal [`Client::destroy`]
/// decrements it.
#[derive(Debug)]
pub struct ClientRegistry {
	count: AtomicUsize,
	limit: usize,
}

impl ClientRegistry {
	/// Build a registry enforcing `limit` concurrent clients.
	#[must_use]
	pub fn new(limit: usize) -> Self {
		Self {
			count: AtomicUsize::new(0),
			limit,
		}
	}

	/// The current number of live clients.
	#[must_use]
	pub fn count(&self) -> usize {
		self.count.load(Ordering::Acquire)
	}

	fn increment(&self) -> usize {
		self.count.fetch_add(1, Ordering::AcqRel) + 1
	}

	fn decrement(&self) {
		self.count.fetch_sub(1, Ordering::AcqRel);
	}
}

/// The outcome of [`Client::create`]: creation always succeeds (the client
/// is needed to carry an error response back even when the server is over
/// its limit), but the caller needs to know which case it is so it can
/// refuse to actually serve the request.
#[derive(Debug)]
pub enum ClientCreate {
	/// The client was created and the server is under its limit.
	Created(Client),
	/// The client was created, but the global client count now exceeds
	/// [`ClientRegistry`]'s configured limit. The caller should serve an
	/// error response (see [`response::ErrorId::CLIENT_LIMIT`]) and destroy
	/// the client rather than proceed.
	CapExceeded(Client),
}

/// A single accepted, (possibly) authenticated connection.
///
/// Mutated by exactly one thread at a time: the accept/request thread up
/// until it's hung off an authenticator's queue, then that authenticator's
/// worker thread, then back to the owning thread once a result callback
/// fires.
#[derive(Debug)]
pub struct Client {
	connection: Connection,
	request: Request,
	refbuf: Option<Refbuf>,
	username: Option<String>,
	password: Option<String>,
	role: Option<String>,
	acl: Option<Arc<Acl>>,
	auth: Option<Arc<Authenticator>>,
	stack: Option<StackCursor>,
	response_code: Option<u16>,
	protocol: Protocol,
	reuse: ReuseDisposition,
	admin_command: AdminCommand,
}

impl Client {
	/// Create a client wrapping `connection` and `request`, registering it
	/// with `registry`. Always succeeds, even past `registry`'s limit — see
	/// [`ClientCreate`].
	#[instrument(skip(connection, request, registry))]
	#[must_use]
	pub fn create(connection: Connection, request: Request, registry: &ClientRegistry) -> ClientCreate {
		let client = Self {
			connection,
			request,
			refbuf: Some(Refbuf::new(4096)),
			username: None,
			password: None,
			role: None,
			acl: None,
			auth: None,
			stack: None,
			response_code: None,
			protocol: Protocol::default(),
			reuse: ReuseDisposition::default(),
			admin_command: AdminCommand::default(),
		};

		if registry.increment() > registry.limit {
			warn!("server client limit reached; creating client anyway to carry an error response");
			ClientCreate::CapExceeded(client)
		} else {
			ClientCreate::Created(client)
		}
	}

	/// The parsed request this client is serving.
	#[must_use]
	pub fn request(&self) -> &Request {
		&self.request
	}

	/// This client's connection.
	pub fn connection(&mut self) -> &mut Connection {
		&mut self.connection
	}

	/// Pre-set or ingested username, if any.
	#[must_use]
	pub fn username(&self) -> Option<&str> {
		self.username.as_deref()
	}

	/// Pre-set or ingested password, if any.
	#[must_use]
	pub fn password(&self) -> Option<&str> {
		self.password.as_deref()
	}

	/// Whether credentials have already been set on this client (used by
	/// auth header ingestion to avoid overwriting pre-set credentials).
	#[must_use]
	pub fn has_credentials(&self) -> bool {
		self.username.is_some() || self.password.is_some()
	}

	/// Set the client's credentials, e.g. from `Authorization: Basic`
	/// ingestion or a caller that already extracted them another way.
	pub fn set_credentials(&mut self, username: impl Into<String>, password: impl Into<String>) {
		self.username = Some(username.into());
		self.password = Some(password.into());
	}

	/// This client's currently assigned role, if authenticated.
	#[must_use]
	pub fn role(&self) -> Option<&str> {
		self.role.as_deref()
	}

	/// Assign a role, mirroring the original's `client->role` strdup.
	pub fn set_role(&mut self, role: impl Into<String>) {
		self.role = Some(role.into());
	}

	/// Clear the client's assigned role, e.g. as part of an auth release.
	pub fn clear_role(&mut self) {
		self.role = None;
	}

	/// This client's currently assigned ACL, if any.
	#[must_use]
	pub fn acl(&self) -> Option<&Arc<Acl>> {
		self.acl.as_ref()
	}

	/// Install a new ACL, releasing (dropping the `Arc` to) any previous
	/// one. Invariant 5 (§8): an ACL is only ever installed alongside a
	/// successful auth match.
	pub fn set_acl(&mut self, acl: Option<Arc<Acl>>) {
		self.acl = acl;
	}

	/// The authenticator currently bound to this client (the one it's
	/// enqueued on or was last matched by).
	#[must_use]
	pub fn bound_auth(&self) -> Option<&Arc<Authenticator>> {
		self.auth.as_ref()
	}

	/// Bind (or unbind) this client's current authenticator.
	pub fn set_auth(&mut self, auth: Option<Arc<Authenticator>>) {
		self.auth = auth;
	}

	/// This client's current position in the authenticator stack it's
	/// walking (set at the start of a walk, advanced as it proceeds).
	#[must_use]
	pub fn stack(&self) -> Option<&StackCursor> {
		self.stack.as_ref()
	}

	/// Bind this client to a stack position, typically at the start of a
	/// walk.
	pub fn set_stack(&mut self, stack: Option<StackCursor>) {
		self.stack = stack;
	}

	/// The HTTP status code this client's response was (or will be) served
	/// with, used for access logging on destroy.
	#[must_use]
	pub fn response_code(&self) -> Option<u16> {
		self.response_code
	}

	/// Record the response code this client was served, for access logging.
	pub fn set_response_code(&mut self, code: u16) {
		self.response_code = Some(code);
	}

	/// This client's reuse disposition, decided by whatever format handler
	/// served the request.
	#[must_use]
	pub fn reuse(&self) -> ReuseDisposition {
		self.reuse
	}

	/// Set this client's reuse disposition.
	pub fn set_reuse(&mut self, reuse: ReuseDisposition) {
		self.reuse = reuse;
	}

	/// This client's admin command, if its request was an admin request.
	#[must_use]
	pub fn admin_command(&self) -> AdminCommand {
		self.admin_command
	}

	/// Set this client's admin command.
	pub fn set_admin_command(&mut self, command: AdminCommand) {
		self.admin_command = command;
	}

	/// This client's connection protocol marker.
	#[must_use]
	pub fn protocol(&self) -> Protocol {
		self.protocol
	}

	/// The port to treat this request as arriving on: the `Host` header's
	/// port if present, else `None` (caller falls back to the listen
	/// socket's own port). See [`Request::host_port`].
	#[must_use]
	pub fn effective_port(&self) -> Option<u16> {
		self.request.host_port()
	}

	/// Whether this client's underlying connection is still alive. Per the
	/// spec's own open question (§9/§10), there is no real socket-activity
	/// probe yet: this only reflects whether a prior read or write already
	/// observed an I/O error, not genuine liveness (a connection that has
	/// gone quiet without erroring still reports connected). The policy
	/// point exists so a future, real probe (and the decision of what to do
	/// with a dead client sitting in an auth queue) has somewhere to plug
	/// in.
	#[must_use]
	pub fn is_connected(&self) -> bool {
		!self.connection.is_errored()
	}

	/// Read up to `out.len()` bytes, preferring any residue left in the
	/// staging buffer before touching the connection, mirroring the
	/// original's `client_read_bytes`.
	pub fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
		if let Some(refbuf) = &self.refbuf {
			if !refbuf.is_empty() {
				return Ok(refbuf.read_into(out));
			}
		}
		self.connection.recv(out)
	}

	/// Write `buf` via the connection's send path.
	pub fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
		self.connection.send(buf)
	}

	/// Send a fully built [`response::Response`] and record its status code
	/// for access logging.
	pub fn send_response(&mut self, response: &response::Response) -> std::io::Result<usize> {
		self.set_response_code(response.status());
		self.write(&response.to_bytes())
	}

	/// Destroy this client.
	///
	/// If [`ReuseDisposition`] is not `Close`, steals the live socket (and,
	/// for a TLS upgrade, the TLS session) into a fresh [`Connection`] for
	/// the caller to re-inject into the accept pipeline, then recursively
	/// destroys `self` — now a terminal, `Close`-disposition destroy, per
	/// §5.4's "reuse path" — so the global client count is released exactly
	/// as it would be for any other destroy. Otherwise runs the auth
	/// release path directly; if that reports
	/// [`ReleaseOutcome::Deferred`], teardown is finished by the auth
	/// worker instead and this call returns `None` immediately, the client
	/// having passed entirely into the queued work item's ownership.
	#[instrument(skip(self, registry))]
	pub fn destroy(mut self, registry: &Arc<ClientRegistry>) -> Option<Connection> {
		if self.reuse != ReuseDisposition::Close {
			let fresh = self.steal_reused_connection();
			self.reuse = ReuseDisposition::Close;
			self.destroy(registry);
			return Some(fresh);
		}

		self.refbuf = None;

		if let Some(auth) = self.auth.take() {
			return match auth.release_client(self, Arc::clone(registry)) {
				ReleaseOutcome::Handled(mut client) => {
					client.finish_destroy(registry);
					None
				}
				ReleaseOutcome::Deferred => {
					debug!("auth release in progress; deferring final teardown to the auth worker");
					None
				}
			};
		}

		self.finish_destroy(registry);
		None
	}

	/// Finish tearing down a client whose auth release has already settled:
	/// log the access record, drop auth state, and release the slot in
	/// `registry`. Called either directly from [`Client::destroy`] or, for a
	/// deferred release, from the auth worker once it completes.
	pub(crate) fn finish_destroy(&mut self, registry: &ClientRegistry) {
		if let Some(code) = self.response_code {
			info!(
				peer = %self.connection.peer_addr(),
				status = code,
				"client destroyed",
			);
		}
		self.acl = None;
		self.role = None;
		self.username = None;
		self.password = None;
		registry.decrement();
	}

	/// Steal the live socket (and any TLS session) out of this client's
	/// connection into a fresh one. Leaves `self.reuse` untouched; the
	/// caller ([`Client::destroy`]) is responsible for flipping it to
	/// `Close` and finishing teardown.
	///
	/// The TLS session transfers whenever the old connection carried one,
	/// regardless of reuse disposition — a `Keepalive` on an existing HTTPS
	/// connection must keep talking TLS, exactly like the original's
	/// `client_reuseconnection` (`if (client->con->tls)`). `UpgradeTls`
	/// additionally marks the fresh connection as using TLS even when there
	/// was no prior session to carry over (a real STARTTLS upgrade starts
	/// from a plain connection), mirroring its `connection_uses_tls` call.
	fn steal_reused_connection(&mut self) -> Connection {
		let (socket, tls) = self.connection.steal();
		let peer = self.connection.peer_addr();

		let mut fresh = match socket {
			Some(socket) => Connection::new(socket, peer),
			None => {
				warn!("reuse requested but connection has no socket to steal");
				Connection::disconnected(peer)
			}
		};

		if let Some(session) = tls {
			fresh.set_tls(session);
		}

		if self.reuse == ReuseDisposition::UpgradeTls {
			fresh.mark_uses_tls();
		}

		fresh
	}
}

#[cfg(test)]
mod tests {
	use std::{collections::HashMap, net::SocketAddr};

	use socket2::{Domain, Socket, Type};

	use super::*;
	use crate::method::HttpMethod;

	fn fresh_connection() -> Connection {
		let socket = Socket::new(Domain::IPV4, Type::STREAM, None).unwrap();
		let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
		Connection::new(socket, addr)
	}

	fn request() -> Request {
		Request::new(HttpMethod::Get, HashMap::new())
	}

	#[test]
	fn create_under_limit_is_created() {
		let registry = ClientRegistry::new(10);
		match Client::create(fresh_connection(), request(), &registry) {
			ClientCreate::Created(_) => {}
			ClientCreate::CapExceeded(_) => panic!("expected Created"),
		}
		assert_eq!(registry.count(), 1);
	}

	#[test]
	fn create_past_limit_is_cap_exceeded_but_still_created() {
		let registry = ClientRegistry::new(0);
		match Client::create(fresh_connection(), request(), &registry) {
			ClientCreate::CapExceeded(_) => {}
			ClientCreate::Created(_) => panic!("expected CapExceeded"),
		}
	}

	#[test]
	fn destroy_decrements_global_count() {
		let registry = Arc::new(ClientRegistry::new(10));
		let client = match Client::create(fresh_connection(), request(), &registry) {
			ClientCreate::Created(c) => c,
			ClientCreate::CapExceeded(c) => c,
		};
		assert_eq!(registry.count(), 1);
		client.destroy(&registry);
		assert_eq!(registry.count(), 0);
	}

	#[test]
	fn acl_is_only_ever_set_alongside_role() {
		let registry = ClientRegistry::new(10);
		let mut client = match Client::create(fresh_connection(), request(), &registry) {
			ClientCreate::Created(c) => c,
			ClientCreate::CapExceeded(c) => c,
		};
		assert!(client.acl().is_none());
		client.set_acl(Some(Acl::permissive("anonymous")));
		client.set_role("anonymous");
		assert_eq!(client.role(), Some("anonymous"));
		assert!(client.acl().is_some());
	}
}

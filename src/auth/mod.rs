//! A single plugged-in auth method with its own optional worker thread and
//! bounded FIFO, and the ordered stack built from them.

pub mod backend;
pub mod backends;
pub mod stack;
mod worker;

use std::{
	fmt,
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc,
	},
};

pub use backend::{AuthBackend, AuthResult};
use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::Mutex;
use strum::{Display, EnumString};
use tracing::debug;
use worker::Worker;

use crate::{
	acl::Acl,
	client::{response::ErrorId, Client, ClientRegistry},
	method::MethodMask,
};

/// The admission bound on an authenticator's pending queue (§3.1/§5.1): the
/// 101st concurrently pending item is refused with `AUTH_BUSY` rather than
/// queued.
const QUEUE_CAPACITY: usize = 100;

/// A callback invoked with the client and the terminal (or per-node)
/// [`AuthResult`] of a stack walk step.
///
/// Modeled as `Arc<dyn Fn>` rather than `Box<dyn FnOnce>` so the stack
/// walker ([`stack::walk`]) can freely build it before knowing whether this
/// node will actually need it — only one of the possible outcomes ever
/// invokes it.
pub type ResultCallback = Arc<dyn Fn(Client, AuthResult) + Send + Sync>;

/// The recognized authenticator backend kinds, corresponding to the `type`
/// attribute on an `<authentication>` config element (§6/§7).
#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumString, Display, serde::Serialize, serde::Deserialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum AuthType {
	Url,
	Htpasswd,
	Anonymous,
	Static,
	/// Alias of `Static`, matching the original's `legacy-password`.
	#[strum(serialize = "legacy-password")]
	LegacyPassword,
}

impl AuthType {
	/// Whether this is the `anonymous` backend, used by
	/// [`stack::AuthStack::get_anonymous_acl`].
	#[must_use]
	pub fn is_anonymous(self) -> bool {
		matches!(self, Self::Anonymous)
	}
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A single queued unit of work, dispatched on an authenticator's worker
/// thread (or inline, for an `immediate` authenticator's release path).
enum WorkItem {
	/// A pending `authenticate_client` call; `continuation` receives the
	/// result.
	Authenticate { client: Client, continuation: ResultCallback },
	/// A pending async logout; finishing it hands `client` back to
	/// `registry` for final teardown (access log, count decrement).
	Release { client: Client, registry: Arc<ClientRegistry> },
}

/// The outcome of [`Authenticator::add_client`].
pub enum AddOutcome {
	/// The client's HTTP method isn't in this authenticator's capability
	/// mask; it was never bound or enqueued.
	NoMatch(Client),
	/// An `immediate` authenticator ran its backend inline.
	Processed(Client, AuthResult),
	/// A non-`immediate` authenticator's work item was queued; its result
	/// will reach the supplied continuation from the worker thread.
	Enqueued,
	/// The queue was at its 100-item capacity; an `AUTH_BUSY` response was
	/// already sent to the client.
	QueueFull(Client),
}

/// The outcome of [`Authenticator::release_client`].
pub enum ReleaseOutcome {
	/// Release completed (or was a no-op); the client is handed back.
	Handled(Client),
	/// An async release work item now owns the client. The caller must not
	/// touch it again — the worker finishes teardown itself.
	Deferred,
}

/// A single configured authentication method.
///
/// Owns an optional worker thread (absent when `immediate`) and a bounded
/// FIFO implemented directly as a `crossbeam_channel`: the channel's own
/// length is the pending count (§3.1 invariant 1), and `try_send` returning
/// `Full` directly implements the 100-item admission bound.
pub struct Authenticator {
	id: u64,
	role: String,
	auth_type: AuthType,
	mount: Option<String>,
	management_url: String,
	methods: MethodMask,
	acl: Arc<Acl>,
	backend: Box<dyn AuthBackend>,
	immediate: bool,
	sender: Option<Sender<WorkItem>>,
	worker: Mutex<Option<Worker>>,
}

impl fmt::Debug for Authenticator {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Authenticator")
			.field("id", &self.id)
			.field("role", &self.role)
			.field("auth_type", &self.auth_type)
			.field("immediate", &self.immediate)
			.finish_non_exhaustive()
	}
}

impl Authenticator {
	/// Construct a new authenticator around `backend`, with a dedicated
	/// worker thread unless `immediate` is set. `management_url` defaults
	/// to `/auth/{id}` when `None`, per §3.1. The authenticator's ACL (what
	/// gets installed onto a client on a successful match) admits exactly
	/// `methods`.
	#[must_use]
	pub fn new(
		auth_type: AuthType,
		role: impl Into<String>,
		methods: MethodMask,
		mount: Option<String>,
		management_url: Option<String>,
		backend: Box<dyn AuthBackend>,
		immediate: bool,
	) -> Arc<Self> {
		let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
		let management_url = management_url.unwrap_or_else(|| format!("/auth/{id}"));
		let role = role.into();
		let acl = Acl::new(methods, role.clone());

		let (sender, receiver) = if immediate {
			(None, None)
		} else {
			let (tx, rx) = bounded(QUEUE_CAPACITY);
			(Some(tx), Some(rx))
		};

		let this = Arc::new(Self {
			id,
			role,
			auth_type,
			mount,
			management_url,
			methods,
			acl,
			backend,
			immediate,
			sender,
			worker: Mutex::new(None),
		});

		if let Some(receiver) = receiver {
			let name = format!("auth-worker-{id}");
			let worker = Worker::spawn(name, receiver, {
				let this = Arc::clone(&this);
				move |item| this.run_work_item(item)
			});
			*this.worker.lock() = Some(worker);
		}

		this
	}

	/// Construct a live authenticator from a resolved config entry,
	/// dispatching on `config.auth_type` to build the matching backend —
	/// the direct analogue of the original's `auth_get_authenticator` type
	/// dispatch (§6). `Static` and `LegacyPassword` share one backend, per
	/// the original's "`legacy-password` is an alias of `static`".
	///
	/// # Errors
	/// Returns whatever [`crate::error::ConfigError`] the chosen backend's
	/// [`AuthBackend::from_options`] raises (e.g. a missing required
	/// option).
	pub fn from_config(config: crate::config::ResolvedAuthConfig) -> Result<Arc<Self>, crate::error::ConfigError> {
		use backends::{AnonymousBackend, HtpasswdBackend, StaticBackend, UrlBackend};

		let backend: Box<dyn AuthBackend> = match config.auth_type {
			AuthType::Url => Box::new(UrlBackend::from_options(&config.options)?),
			AuthType::Htpasswd => Box::new(HtpasswdBackend::from_options(&config.options)?),
			AuthType::Anonymous => Box::new(AnonymousBackend::from_options(&config.options)?),
			AuthType::Static | AuthType::LegacyPassword => Box::new(StaticBackend::from_options(&config.options)?),
		};

		Ok(Self::new(
			config.auth_type,
			config.role,
			config.methods,
			config.mount,
			config.management_url,
			backend,
			config.immediate,
		))
	}

	/// This authenticator's process-unique id.
	#[must_use]
	pub fn id(&self) -> u64 {
		self.id
	}

	/// This authenticator's configured role name.
	#[must_use]
	pub fn role(&self) -> &str {
		&self.role
	}

	/// This authenticator's backend type.
	#[must_use]
	pub fn auth_type(&self) -> AuthType {
		self.auth_type
	}

	/// The mount-path label this authenticator was configured with, if any.
	#[must_use]
	pub fn mount(&self) -> Option<&str> {
		self.mount.as_deref()
	}

	/// This authenticator's management URL (explicit, or defaulted from its
	/// id).
	#[must_use]
	pub fn management_url(&self) -> &str {
		&self.management_url
	}

	/// This authenticator's capability mask.
	#[must_use]
	pub fn methods(&self) -> MethodMask {
		self.methods
	}

	/// This authenticator's ACL, installed onto a client on a successful
	/// match.
	#[must_use]
	pub fn acl(&self) -> &Arc<Acl> {
		&self.acl
	}

	/// Attempt authentication of `client` against this authenticator.
	///
	/// `continuation` is only consumed (moved into a queued work item) when
	/// this authenticator is non-`immediate` and admission succeeds; in
	/// every other case it's simply dropped unused and the caller gets the
	/// client (and, where applicable, the result) back directly.
	pub fn add_client(self: &Arc<Self>, mut client: Client, continuation: ResultCallback) -> AddOutcome {
		if !self.methods.admits(client.request().method()) {
			return AddOutcome::NoMatch(client);
		}

		client.set_auth(Some(Arc::clone(self)));
		self.ingest_authorization(&mut client);

		if self.immediate {
			let result = self.process(&mut client);
			return AddOutcome::Processed(client, result);
		}

		let sender = self.sender.as_ref().expect("non-immediate authenticator always has a sender");
		match sender.try_send(WorkItem::Authenticate { client, continuation }) {
			Ok(()) => AddOutcome::Enqueued,
			Err(TrySendError::Full(WorkItem::Authenticate { mut client, .. })) => {
				let response = ErrorId::AUTH_BUSY.build(Some(client.request()));
				let _ = client.send_response(&response);
				AddOutcome::QueueFull(client)
			}
			Err(TrySendError::Disconnected(WorkItem::Authenticate { client, .. })) => AddOutcome::QueueFull(client),
			Err(_) => unreachable!("try_send only ever rejects the item it was given"),
		}
	}

	/// Asymmetric logout path. If `client` has no ACL, this is a no-op: the
	/// client is handed straight back (the "idempotent release" law in
	/// §8). Otherwise the client is detached from this authenticator and
	/// either released synchronously or, if the backend declared a release
	/// hook, handed off to the worker for an async logout callout.
	pub fn release_client(self: &Arc<Self>, mut client: Client, registry: Arc<ClientRegistry>) -> ReleaseOutcome {
		if client.acl().is_none() {
			return ReleaseOutcome::Handled(client);
		}

		client.set_auth(None);

		if self.backend.has_release_hook() {
			if self.immediate {
				self.backend.release_client(&mut client);
			} else {
				let sender = self.sender.as_ref().expect("non-immediate authenticator always has a sender");
				match sender.try_send(WorkItem::Release { client, registry }) {
					Ok(()) => return ReleaseOutcome::Deferred,
					Err(TrySendError::Full(WorkItem::Release { mut client, .. }))
					| Err(TrySendError::Disconnected(WorkItem::Release { mut client, .. })) => {
						self.backend.release_client(&mut client);
						client.set_acl(None);
						client.clear_role();
						return ReleaseOutcome::Handled(client);
					}
					Err(_) => unreachable!("try_send only ever rejects the item it was given"),
				}
			}
		}

		client.set_acl(None);
		client.clear_role();
		ReleaseOutcome::Handled(client)
	}

	/// Whether this authenticator processes work inline rather than via a
	/// worker thread.
	#[must_use]
	pub fn is_immediate(&self) -> bool {
		self.immediate
	}

	/// The number of items currently pending in this authenticator's queue.
	/// `0` for an `immediate` authenticator. Invariant 1 (§8): this equals
	/// the number of items enqueued but not yet drained.
	#[must_use]
	pub fn pending_count(&self) -> usize {
		self.sender.as_ref().map_or(0, crossbeam_channel::Sender::len)
	}

	fn run_work_item(&self, item: WorkItem) {
		match item {
			WorkItem::Authenticate { mut client, continuation } => {
				if !client.is_connected() {
					debug!(auth_id = self.id, "processing work item for a disconnected client");
				}
				let result = self.process(&mut client);
				continuation(client, result);
			}
			WorkItem::Release { mut client, registry } => {
				self.backend.release_client(&mut client);
				client.set_acl(None);
				client.clear_role();
				client.finish_destroy(&registry);
			}
		}
	}

	/// Run the backend against `client` on the calling thread, installing
	/// this authenticator's ACL and role on success. A non-`Ok`,
	/// non-`NoMatch` result releases and clears the bound authenticator,
	/// per §5.1's failure semantics.
	fn process(&self, client: &mut Client) -> AuthResult {
		let result = self.backend.authenticate_client(client);

		match result {
			AuthResult::Ok => {
				client.set_acl(Some(Arc::clone(&self.acl)));
				client.set_role(self.role.clone());
			}
			AuthResult::NoMatch => {}
			_ => {
				client.set_auth(None);
				client.set_acl(None);
			}
		}

		result
	}

	/// On first enqueue, if the client has no pre-set credentials and
	/// carries an `Authorization: Basic …` header, decode and install them.
	/// Malformed or non-Basic headers are logged and ignored (a
	/// protocol-violation per §8, not a hard failure).
	fn ingest_authorization(&self, client: &mut Client) {
		if client.has_credentials() {
			return;
		}

		match client.request().basic_auth() {
			Some((username, password)) => client.set_credentials(username, password),
			None => {
				if client.request().header("authorization").is_some() {
					debug!(auth_id = self.id, "ignoring malformed Authorization header");
				}
			}
		}
	}
}

impl Drop for Authenticator {
	fn drop(&mut self) {
		// Joining the worker here (via `Worker`'s own `Drop`) guarantees
		// invariant 2 (§8): the thread has stopped before `self.backend` is
		// dropped below.
		*self.worker.lock() = None;
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use super::*;
	use crate::config::ResolvedAuthConfig;

	fn config(auth_type: AuthType, options: HashMap<String, String>) -> ResolvedAuthConfig {
		ResolvedAuthConfig {
			auth_type,
			role: auth_type.to_string(),
			methods: MethodMask::all(),
			mount: None,
			management_url: None,
			immediate: true,
			options,
		}
	}

	#[test]
	fn from_config_builds_anonymous_backend() {
		let auth = Authenticator::from_config(config(AuthType::Anonymous, HashMap::new())).unwrap();
		assert_eq!(auth.auth_type(), AuthType::Anonymous);
		assert_eq!(auth.role(), "anonymous");
	}

	#[test]
	fn from_config_aliases_legacy_password_to_static_backend() {
		let options: HashMap<String, String> =
			[("username".to_string(), "alice".to_string()), ("password".to_string(), "hunter2".to_string())].into();
		let auth = Authenticator::from_config(config(AuthType::LegacyPassword, options)).unwrap();
		assert_eq!(auth.auth_type(), AuthType::LegacyPassword);
	}

	#[test]
	fn from_config_propagates_backend_option_errors() {
		let err = Authenticator::from_config(config(AuthType::Htpasswd, HashMap::new())).unwrap_err();
		assert!(matches!(err, crate::error::ConfigError::MissingAttribute("filename")));
	}

	#[test]
	fn management_url_defaults_from_id() {
		let auth = Authenticator::from_config(config(AuthType::Anonymous, HashMap::new())).unwrap();
		assert_eq!(auth.management_url(), format!("/auth/{}", auth.id()));
	}
}

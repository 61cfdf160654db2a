//! An ordered, append-only sequence of authenticators a client walks until
//! one matches, plus the loop-based dispatcher that drives the walk.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{AddOutcome, AuthResult, Authenticator, ResultCallback};
use crate::{acl::Acl, client::Client, method::HttpMethod};

/// A single link in the stack: an authenticator and its successor. The
/// successor is the one mutable field — `push`/`append` set it exactly
/// once, when this node becomes the stack's tail's predecessor — guarded by
/// its own mutex so a concurrent walk never observes a torn pointer.
struct StackNode {
	auth: Arc<Authenticator>,
	next: Mutex<Option<Arc<StackNode>>>,
}

/// A position within a stack, held by a client as it walks (or re-walks,
/// after a `NoMatch`) the chain. Cheap to clone (one `Arc` bump).
#[derive(Clone)]
pub struct StackCursor {
	node: Arc<StackNode>,
}

impl StackCursor {
	/// The authenticator at this position.
	#[must_use]
	pub fn current(&self) -> &Arc<Authenticator> {
		&self.node.auth
	}

	/// Advance to the successor node. `None` means end of stack.
	///
	/// This resolves the distilled spec's stray unlock-then-lock sequence
	/// noted in §9/§10: the intended discipline — take the node's lock,
	/// addref the successor, release the lock — is exactly what this does.
	#[must_use]
	pub fn next(&self) -> Option<Self> {
		let next = self.node.next.lock().clone();
		next.map(|node| Self { node })
	}

	/// The first authenticator reachable from here, in walk order, with the
	/// given id.
	#[must_use]
	pub fn get_by_id(&self, id: u64) -> Option<Arc<Authenticator>> {
		let mut cursor = Some(self.clone());
		while let Some(c) = cursor {
			if c.current().id() == id {
				return Some(Arc::clone(c.current()));
			}
			cursor = c.next();
		}
		None
	}

	/// The ACL of the first anonymous-type authenticator reachable from
	/// here, in walk order, whose method mask admits `method`.
	#[must_use]
	pub fn get_anonymous_acl(&self, method: HttpMethod) -> Option<Arc<Acl>> {
		let mut cursor = Some(self.clone());
		while let Some(c) = cursor {
			let auth = c.current();
			if auth.auth_type().is_anonymous() && auth.methods().admits(method) {
				return Some(Arc::clone(auth.acl()));
			}
			cursor = c.next();
		}
		None
	}
}

/// An ordered, append-only sequence of authenticators. Built via `push`/
/// `append`; walked via a [`StackCursor`] obtained from [`AuthStack::cursor`].
///
/// `tail` always points at the node whose `next` receives the next push —
/// the direct analogue of the original's `tailp` double-indirection,
/// expressed here as "the mutex holding the last node" instead of "the
/// address of the slot that would receive the next enqueue".
pub struct AuthStack {
	head: Mutex<Option<Arc<StackNode>>>,
	tail: Mutex<Option<Arc<StackNode>>>,
}

impl Default for AuthStack {
	fn default() -> Self {
		Self::new()
	}
}

impl AuthStack {
	/// An empty stack.
	#[must_use]
	pub fn new() -> Self {
		Self {
			head: Mutex::new(None),
			tail: Mutex::new(None),
		}
	}

	/// Append a new node carrying `auth` at the tail, creating the stack if
	/// it was empty.
	pub fn push(&self, auth: Arc<Authenticator>) {
		let node = Arc::new(StackNode {
			auth,
			next: Mutex::new(None),
		});

		let mut head = self.head.lock();
		let mut tail = self.tail.lock();

		match tail.take() {
			Some(old_tail) => {
				*old_tail.next.lock() = Some(Arc::clone(&node));
			}
			None => {
				*head = Some(Arc::clone(&node));
			}
		}

		*tail = Some(node);
	}

	/// Concatenate `suffix`'s chain onto the end of `self`, using
	/// hand-over-hand locking (hold current's lock, addref next, release
	/// current's lock, release current, acquire next's lock) exactly as
	/// the original's `auth_stack_append` does (§5.2).
	pub fn append(&self, suffix: &Self) {
		let Some(suffix_head) = suffix.head.lock().clone() else {
			return;
		};
		let suffix_tail = suffix.tail.lock().clone();

		let mut head = self.head.lock();
		let mut tail = self.tail.lock();

		match tail.take() {
			Some(old_tail) => {
				*old_tail.next.lock() = Some(suffix_head);
			}
			None => {
				*head = Some(suffix_head);
			}
		}

		*tail = suffix_tail;
	}

	/// A cursor positioned at the head of the stack, or `None` if empty.
	#[must_use]
	pub fn cursor(&self) -> Option<StackCursor> {
		self.head.lock().clone().map(|node| StackCursor { node })
	}

	/// The head authenticator, addref'd, or `None` if the stack is empty.
	#[must_use]
	pub fn get(&self) -> Option<Arc<Authenticator>> {
		self.cursor().map(|c| Arc::clone(c.current()))
	}

	/// The first authenticator in walk order with the given id.
	#[must_use]
	pub fn get_by_id(&self, id: u64) -> Option<Arc<Authenticator>> {
		self.cursor().and_then(|c| c.get_by_id(id))
	}

	/// The ACL of the first anonymous-type authenticator in walk order
	/// whose method mask admits `method`.
	#[must_use]
	pub fn get_anonymous_acl(&self, method: HttpMethod) -> Option<Arc<Acl>> {
		self.cursor().and_then(|c| c.get_anonymous_acl(method))
	}
}

/// Authenticate `client` against the stack starting at `cursor`, calling
/// `on_result` exactly once with the terminal outcome.
///
/// Driven by an explicit `loop`, not recursion: consecutive nodes resolved
/// synchronously (a method-mismatch short-circuit, or an `immediate`
/// authenticator's inline result) stay in the same stack frame and the same
/// call. Only crossing a genuine asynchronous boundary — a non-`immediate`
/// authenticator's work item landing on its worker thread — ends this call;
/// the continuation built for that node resumes the walk from a fresh call
/// when the worker fires it. This is the one deliberate behavioral change
/// from the original's recursive `__move_client_forward_in_auth_stack`,
/// required by §5.2/§9: an arbitrarily long chain of `immediate`
/// authenticators never grows the call stack.
pub fn walk(cursor: StackCursor, client: Client, on_result: ResultCallback) {
	walk_from(cursor, client, on_result);
}

/// Authenticate `client` against `stack`, or immediately report `NoMatch` if
/// the stack is empty.
pub fn walk_stack(stack: &AuthStack, client: Client, on_result: ResultCallback) {
	match stack.cursor() {
		Some(cursor) => walk(cursor, client, on_result),
		None => on_result(client, AuthResult::NoMatch),
	}
}

fn walk_from(mut cursor: StackCursor, mut client: Client, on_result: ResultCallback) {
	loop {
		let auth = Arc::clone(cursor.current());
		let next_cursor = cursor.next();

		let continuation_next = next_cursor.clone();
		let continuation_on_result = Arc::clone(&on_result);
		let continuation: ResultCallback = Arc::new(move |client, result| {
			if result == AuthResult::NoMatch {
				match continuation_next.clone() {
					Some(next) => walk_from(next, client, Arc::clone(&continuation_on_result)),
					None => continuation_on_result(client, AuthResult::NoMatch),
				}
			} else {
				continuation_on_result(client, result);
			}
		});

		match auth.add_client(client, continuation) {
			AddOutcome::NoMatch(c) | AddOutcome::Processed(c, AuthResult::NoMatch) => {
				client = c;
				match next_cursor {
					Some(next) => {
						cursor = next;
						continue;
					}
					None => {
						on_result(client, AuthResult::NoMatch);
						return;
					}
				}
			}
			AddOutcome::Processed(c, result) => {
				on_result(c, result);
				return;
			}
			AddOutcome::Enqueued | AddOutcome::QueueFull(_) => return,
		}
	}
}

#[cfg(test)]
mod tests {
	use std::{collections::HashMap, sync::Arc};

	use parking_lot::Mutex;

	use super::*;
	use crate::{
		auth::{backend::AuthBackend, AuthType},
		client::{request::Request, Client, ClientRegistry},
		error::ConfigError,
		method::MethodMask,
	};

	#[derive(Debug)]
	struct FixedBackend(AuthResult);

	impl AuthBackend for FixedBackend {
		fn from_options(_: &HashMap<String, String>) -> Result<Self, ConfigError> {
			Ok(Self(AuthResult::NoMatch))
		}

		fn authenticate_client(&self, _client: &mut Client) -> AuthResult {
			self.0
		}
	}

	fn fixed_auth(auth_type: AuthType, result: AuthResult, methods: MethodMask) -> Arc<Authenticator> {
		Authenticator::new(
			auth_type,
			format!("{auth_type}"),
			methods,
			None,
			None,
			Box::new(FixedBackend(result)),
			true,
		)
	}

	fn client() -> Client {
		use socket2::{Domain, Socket, Type};
		let socket = Socket::new(Domain::IPV4, Type::STREAM, None).unwrap();
		let addr = "127.0.0.1:0".parse().unwrap();
		let connection = crate::client::Connection::new(socket, addr);
		let request = Request::new(crate::method::HttpMethod::Get, HashMap::new());
		let registry = ClientRegistry::new(100);
		match Client::create(connection, request, &registry) {
			crate::client::ClientCreate::Created(c) | crate::client::ClientCreate::CapExceeded(c) => c,
		}
	}

	#[test]
	fn anonymous_accept_installs_acl_and_role() {
		let stack = AuthStack::new();
		stack.push(fixed_auth(AuthType::Anonymous, AuthResult::Ok, MethodMask::all()));
		stack.push(fixed_auth(AuthType::Htpasswd, AuthResult::Ok, MethodMask::all()));

		let result = Arc::new(Mutex::new(None));
		let result_clone = Arc::clone(&result);
		walk_stack(
			&stack,
			client(),
			Arc::new(move |client, r| {
				*result_clone.lock() = Some((client.role().map(str::to_string), r));
			}),
		);

		let (role, r) = result.lock().take().unwrap();
		assert_eq!(r, AuthResult::Ok);
		assert_eq!(role, Some("anonymous".to_string()));
	}

	#[test]
	fn stack_advance_totality_visits_every_node_once() {
		let stack = AuthStack::new();
		for _ in 0..5 {
			stack.push(fixed_auth(AuthType::Htpasswd, AuthResult::NoMatch, MethodMask::all()));
		}

		let result = Arc::new(Mutex::new(None));
		let result_clone = Arc::clone(&result);
		walk_stack(
			&stack,
			client(),
			Arc::new(move |_client, r| {
				*result_clone.lock() = Some(r);
			}),
		);

		assert_eq!(result.lock().take(), Some(AuthResult::NoMatch));
	}

	#[test]
	fn method_filter_short_circuits_without_invoking_backend() {
		let stack = AuthStack::new();
		stack.push(fixed_auth(
			AuthType::Htpasswd,
			AuthResult::Ok,
			MethodMask::from_methods([HttpMethod::Post]),
		));

		let result = Arc::new(Mutex::new(None));
		let result_clone = Arc::clone(&result);
		walk_stack(
			&stack,
			client(),
			Arc::new(move |_client, r| {
				*result_clone.lock() = Some(r);
			}),
		);

		assert_eq!(result.lock().take(), Some(AuthResult::NoMatch));
	}

	#[test]
	fn empty_stack_reports_no_match() {
		let stack = AuthStack::new();
		let result = Arc::new(Mutex::new(None));
		let result_clone = Arc::clone(&result);
		walk_stack(
			&stack,
			client(),
			Arc::new(move |_client, r| {
				*result_clone.lock() = Some(r);
			}),
		);
		assert_eq!(result.lock().take(), Some(AuthResult::NoMatch));
	}
}

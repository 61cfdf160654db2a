//! Access-control lists.
//!
//! An [`Acl`] is an external collaborator in the sense that its contents
//! (which resources a bearer may use) are defined by the wider server this
//! crate is a part of. The core here only needs its refcounting contract and
//! a method-admission query, so this module models exactly that and nothing
//! more.

use std::sync::Arc;

use crate::method::{HttpMethod, MethodMask};

/// A refcounted access-control-list object describing which HTTP methods
/// (and, by extension, which operations) its bearer may use.
///
/// `Acl` is cheap to clone (it's an `Arc` internally via callers holding
/// `Arc<Acl>`) and is otherwise immutable once constructed: the core never
/// mutates an ACL in place, only swaps which `Arc<Acl>` a client points at.
#[derive(Debug)]
pub struct Acl {
	methods: MethodMask,
	role: String,
}

impl Acl {
	/// Construct a new ACL admitting the given methods, attributed to
	/// `role`.
	#[must_use]
	pub fn new(methods: MethodMask, role: impl Into<String>) -> Arc<Self> {
		Arc::new(Self {
			methods,
			role: role.into(),
		})
	}

	/// An ACL that admits every method, used by anonymous-type
	/// authenticators unless configured otherwise.
	#[must_use]
	pub fn permissive(role: impl Into<String>) -> Arc<Self> {
		Self::new(MethodMask::all(), role)
	}

	/// Whether this ACL's bearer may perform `method`.
	#[must_use]
	pub fn admits(&self, method: HttpMethod) -> bool {
		self.methods.admits(method)
	}

	/// The role string this ACL was constructed with.
	#[must_use]
	pub fn role(&self) -> &str {
		&self.role
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn permissive_admits_everything() {
		let acl = Acl::permissive("anonymous");
		assert!(acl.admits(HttpMethod::Get));
		assert!(acl.admits(HttpMethod::Source));
		assert_eq!(acl.role(), "anonymous");
	}

	#[test]
	fn restricted_admits_only_configured_methods() {
		let acl = Acl::new(MethodMask::from_methods([HttpMethod::Get]), "viewer");
		assert!(acl.admits(HttpMethod::Get));
		assert!(!acl.admits(HttpMethod::Post));
	}
}

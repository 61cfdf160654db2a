//! HTTP method ordinals and the fixed-size capability bitset authenticators
//! use to decide whether they apply to a given request.

use std::str::FromStr;

use strum::{Display, EnumIter, EnumString};

/// The HTTP methods a request can carry. This is the method vocabulary the
/// rest of the crate reasons about; a method outside this set is treated as
/// [`HttpMethod::Get`]'s opposite, i.e. matched by nothing unless the
/// authenticator's mask is wildcarded.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, EnumString, EnumIter, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum HttpMethod {
	Get,
	Post,
	Put,
	Delete,
	Head,
	Options,
	Source,
	Stats,
	Propfind,
}

impl HttpMethod {
	const COUNT: usize = 9;

	const fn ordinal(self) -> usize {
		match self {
			Self::Get => 0,
			Self::Post => 1,
			Self::Put => 2,
			Self::Delete => 3,
			Self::Head => 4,
			Self::Options => 5,
			Self::Source => 6,
			Self::Stats => 7,
			Self::Propfind => 8,
		}
	}
}

/// A fixed-size boolean mapping from [`HttpMethod`] ordinal to "applies /
/// does not apply", used by an authenticator to decide whether it should
/// even be consulted for a given request.
///
/// An authenticator configured with the wildcard token `*`, or with no
/// method list at all, gets a mask where every bit is set.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MethodMask([bool; HttpMethod::COUNT]);

impl MethodMask {
	/// A mask that matches no methods.
	#[must_use]
	pub const fn none() -> Self {
		Self([false; HttpMethod::COUNT])
	}

	/// A mask that matches every method. This is the default for an
	/// authenticator configured with `*` or no `method` attribute at all.
	#[must_use]
	pub const fn all() -> Self {
		Self([true; HttpMethod::COUNT])
	}

	/// Build a mask from an iterator of methods, setting only those bits.
	pub fn from_methods(methods: impl IntoIterator<Item = HttpMethod>) -> Self {
		let mut mask = Self::none();
		for method in methods {
			mask.set(method);
		}
		mask
	}

	/// Parse a comma-separated list of method names, or the wildcard `*`.
	/// An empty string is treated the same as `*`: every method matches.
	///
	/// # Errors
	/// Returns the first token that isn't a recognized method name and
	/// isn't `*`.
	pub fn parse(spec: &str) -> Result<Self, String> {
		let spec = spec.trim();

		if spec.is_empty() || spec == "*" {
			return Ok(Self::all());
		}

		let mut mask = Self::none();
		for token in spec.split(',') {
			let token = token.trim();
			let method = HttpMethod::from_str(token).map_err(|_| token.to_string())?;
			mask.set(method);
		}
		Ok(mask)
	}

	/// Set the bit for `method`.
	pub fn set(&mut self, method: HttpMethod) {
		self.0[method.ordinal()] = true;
	}

	/// Whether this mask admits `method`.
	#[must_use]
	pub fn admits(&self, method: HttpMethod) -> bool {
		self.0[method.ordinal()]
	}
}

impl Default for MethodMask {
	/// An authenticator with no method configuration applies to everything.
	fn default() -> Self {
		Self::all()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn wildcard_admits_everything() {
		let mask = MethodMask::parse("*").unwrap();
		assert!(mask.admits(HttpMethod::Get));
		assert!(mask.admits(HttpMethod::Source));
	}

	#[test]
	fn empty_admits_everything() {
		let mask = MethodMask::parse("").unwrap();
		assert!(mask.admits(HttpMethod::Propfind));
	}

	#[test]
	fn explicit_list_is_exclusive() {
		let mask = MethodMask::parse("GET, POST").unwrap();
		assert!(mask.admits(HttpMethod::Get));
		assert!(mask.admits(HttpMethod::Post));
		assert!(!mask.admits(HttpMethod::Put));
	}

	#[test]
	fn unknown_method_is_rejected() {
		assert!(MethodMask::parse("GET,BOGUS").is_err());
	}
}

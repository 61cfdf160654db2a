//! The `static` (alias `legacy-password`) backend: an in-memory username to
//! password table, seeded from config and mutable via the user-management
//! hooks. Grounded in the original's single fixed-credential source auth,
//! generalized here to a small table so `adduser`/`deleteuser`/`listuser`
//! have somewhere real to operate.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::{auth::AuthResult, client::Client, error::ConfigError};

use super::super::backend::AuthBackend;

/// A fixed, in-memory credential table. Seeded from the `username`/
/// `password` config options (both required); further users can be added or
/// removed at runtime through the user-management hooks.
#[derive(Debug)]
pub struct StaticBackend {
	users: RwLock<HashMap<String, String>>,
}

impl AuthBackend for StaticBackend {
	fn from_options(options: &HashMap<String, String>) -> Result<Self, ConfigError> {
		let username = options.get("username").ok_or(ConfigError::MissingAttribute("username"))?;
		let password = options.get("password").ok_or(ConfigError::MissingAttribute("password"))?;

		let mut users = HashMap::new();
		users.insert(username.clone(), password.clone());

		Ok(Self {
			users: RwLock::new(users),
		})
	}

	fn authenticate_client(&self, client: &mut Client) -> AuthResult {
		let (Some(username), Some(password)) = (client.username(), client.password()) else {
			return AuthResult::Failed;
		};

		match self.users.read().get(username) {
			Some(expected) if expected == password => AuthResult::Ok,
			_ => AuthResult::Failed,
		}
	}

	fn adduser(&self, username: &str, password: &str) -> AuthResult {
		let mut users = self.users.write();
		if users.contains_key(username) {
			return AuthResult::UserExists;
		}
		users.insert(username.to_string(), password.to_string());
		AuthResult::UserAdded
	}

	fn deleteuser(&self, username: &str) -> AuthResult {
		match self.users.write().remove(username) {
			Some(_) => AuthResult::UserDeleted,
			None => AuthResult::Undefined,
		}
	}

	fn listuser(&self) -> Vec<String> {
		let mut names: Vec<String> = self.users.read().keys().cloned().collect();
		names.sort();
		names
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap as Map;

	use super::*;

	fn options() -> Map<String, String> {
		[("username".to_string(), "alice".to_string()), ("password".to_string(), "hunter2".to_string())].into()
	}

	#[test]
	fn missing_required_option_is_rejected() {
		assert!(matches!(StaticBackend::from_options(&Map::new()), Err(ConfigError::MissingAttribute("username"))));
	}

	#[test]
	fn adduser_then_listuser_reports_both() {
		let backend = StaticBackend::from_options(&options()).unwrap();
		assert_eq!(backend.adduser("bob", "swordfish"), AuthResult::UserAdded);
		assert_eq!(backend.listuser(), vec!["alice".to_string(), "bob".to_string()]);
	}

	#[test]
	fn adduser_twice_reports_user_exists() {
		let backend = StaticBackend::from_options(&options()).unwrap();
		assert_eq!(backend.adduser("alice", "whatever"), AuthResult::UserExists);
	}

	#[test]
	fn deleteuser_removes_a_present_user() {
		let backend = StaticBackend::from_options(&options()).unwrap();
		assert_eq!(backend.deleteuser("alice"), AuthResult::UserDeleted);
		assert!(backend.listuser().is_empty());
	}
}

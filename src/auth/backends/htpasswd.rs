//! The `htpasswd` backend: a `username:password-hash` flat file, loaded
//! once at construction and kept in memory, mutated (and persisted back to
//! disk) through the user-management hooks.
//!
//! Grounded in `auth_htpasswd.h`'s `auth_get_htpasswd_auth` entry point.
//! The original compares against a libc `crypt(3)` hash; this backend
//! stores a hex SHA-256 digest instead (division of labor: `sha2` does the
//! hashing, this module does the file format and lookup), which is noted
//! as a deliberate behavioral change in the accompanying design notes.

use std::{
	collections::HashMap,
	fs,
	path::PathBuf,
};

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::{auth::AuthResult, client::Client, error::ConfigError};

use super::super::backend::AuthBackend;

fn hash(password: &str) -> String {
	let digest = Sha256::digest(password.as_bytes());
	digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// A password file backend. The `filename` option names the file, parsed
/// as one `username:hash` pair per line (`#`-prefixed lines and blank lines
/// ignored).
#[derive(Debug)]
pub struct HtpasswdBackend {
	path: PathBuf,
	entries: RwLock<HashMap<String, String>>,
}

fn parse(contents: &str) -> HashMap<String, String> {
	let mut entries = HashMap::new();
	for line in contents.lines() {
		let line = line.trim();
		if line.is_empty() || line.starts_with('#') {
			continue;
		}
		if let Some((user, hash)) = line.split_once(':') {
			entries.insert(user.to_string(), hash.to_string());
		}
	}
	entries
}

fn serialize(entries: &HashMap<String, String>) -> String {
	let mut lines: Vec<String> = entries.iter().map(|(user, hash)| format!("{user}:{hash}")).collect();
	lines.sort();
	lines.join("\n") + "\n"
}

impl HtpasswdBackend {
	fn persist(&self) {
		let contents = serialize(&self.entries.read());
		if let Err(error) = fs::write(&self.path, contents) {
			warn!(path = %self.path.display(), %error, "failed to persist htpasswd file");
		}
	}
}

impl AuthBackend for HtpasswdBackend {
	fn from_options(options: &HashMap<String, String>) -> Result<Self, ConfigError> {
		let filename = options.get("filename").ok_or(ConfigError::MissingAttribute("filename"))?;
		let path = PathBuf::from(filename);
		let contents = fs::read_to_string(&path).unwrap_or_default();

		Ok(Self {
			path,
			entries: RwLock::new(parse(&contents)),
		})
	}

	fn authenticate_client(&self, client: &mut Client) -> AuthResult {
		let (Some(username), Some(password)) = (client.username(), client.password()) else {
			return AuthResult::Failed;
		};

		match self.entries.read().get(username) {
			Some(expected) if *expected == hash(password) => AuthResult::Ok,
			_ => AuthResult::Failed,
		}
	}

	fn adduser(&self, username: &str, password: &str) -> AuthResult {
		{
			let mut entries = self.entries.write();
			if entries.contains_key(username) {
				return AuthResult::UserExists;
			}
			entries.insert(username.to_string(), hash(password));
		}
		self.persist();
		AuthResult::UserAdded
	}

	fn deleteuser(&self, username: &str) -> AuthResult {
		let removed = self.entries.write().remove(username).is_some();
		if removed {
			self.persist();
			AuthResult::UserDeleted
		} else {
			AuthResult::Undefined
		}
	}

	fn listuser(&self) -> Vec<String> {
		let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
		names.sort();
		names
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap as Map;

	use super::*;

	fn temp_file(contents: &str) -> PathBuf {
		let mut path = std::env::temp_dir();
		path.push(format!("icecore-htpasswd-test-{}", uuid::Uuid::new_v4()));
		fs::write(&path, contents).unwrap();
		path
	}

	#[test]
	fn authenticates_against_existing_hash() {
		let path = temp_file(&format!("alice:{}\n", hash("hunter2")));
		let options: Map<String, String> = [("filename".to_string(), path.to_string_lossy().to_string())].into();
		let backend = HtpasswdBackend::from_options(&options).unwrap();
		assert_eq!(backend.listuser(), vec!["alice".to_string()]);
		let _ = fs::remove_file(&path);
	}

	#[test]
	fn missing_filename_is_rejected() {
		assert!(matches!(HtpasswdBackend::from_options(&Map::new()), Err(ConfigError::MissingAttribute("filename"))));
	}

	#[test]
	fn adduser_persists_to_disk() {
		let path = temp_file("");
		let options: Map<String, String> = [("filename".to_string(), path.to_string_lossy().to_string())].into();
		let backend = HtpasswdBackend::from_options(&options).unwrap();
		assert_eq!(backend.adduser("bob", "swordfish"), AuthResult::UserAdded);

		let reloaded = HtpasswdBackend::from_options(&options).unwrap();
		assert_eq!(reloaded.listuser(), vec!["bob".to_string()]);
		let _ = fs::remove_file(&path);
	}
}

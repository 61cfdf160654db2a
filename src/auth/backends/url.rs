//! The `url` backend: delegates auth/release/user-management decisions to
//! an HTTP endpoint, POSTing the client's credentials and an `action`
//! parameter and mapping the response status to an [`AuthResult`].
//!
//! Grounded in the original's `auth_url.c` callout contract as described by
//! `auth.c`'s `get_authenticator` dispatch (action=`auth`/`adduser`/
//! `deleteuser`/`remove`), reworked around a blocking HTTP client instead of
//! curl callbacks since this backend always runs off its own worker thread.

use std::{collections::HashMap, time::Duration};

use reqwest::blocking::Client as HttpClient;
use tracing::warn;

use crate::{auth::AuthResult, client::Client, error::ConfigError};

use super::super::backend::AuthBackend;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Delegates to a remote HTTP endpoint. `auth_url` is required; `add_url`/
/// `remove_url`/`delete_url` default to `auth_url` when unset, matching the
/// original's "one endpoint handles every action by default" convention.
#[derive(Debug)]
pub struct UrlBackend {
	auth_url: String,
	add_url: String,
	remove_url: String,
	delete_url: String,
	http: HttpClient,
}

impl UrlBackend {
	fn post(&self, url: &str, form: &[(&str, &str)]) -> Option<u16> {
		match self.http.post(url).form(form).send() {
			Ok(response) => Some(response.status().as_u16()),
			Err(error) => {
				warn!(%url, %error, "auth url callout failed");
				None
			}
		}
	}
}

impl AuthBackend for UrlBackend {
	fn from_options(options: &HashMap<String, String>) -> Result<Self, ConfigError> {
		let auth_url = options.get("auth_url").ok_or(ConfigError::MissingAttribute("auth_url"))?.clone();
		let add_url = options.get("add_url").cloned().unwrap_or_else(|| auth_url.clone());
		let remove_url = options.get("remove_url").cloned().unwrap_or_else(|| auth_url.clone());
		let delete_url = options.get("delete_url").cloned().unwrap_or_else(|| auth_url.clone());

		let http = HttpClient::builder()
			.timeout(DEFAULT_TIMEOUT)
			.build()
			.map_err(|_| ConfigError::MissingAttribute("auth_url"))?;

		Ok(Self {
			auth_url,
			add_url,
			remove_url,
			delete_url,
			http,
		})
	}

	fn authenticate_client(&self, client: &mut Client) -> AuthResult {
		let username = client.username().unwrap_or_default().to_string();
		let password = client.password().unwrap_or_default().to_string();

		match self.post(&self.auth_url, &[("action", "auth"), ("username", &username), ("password", &password)]) {
			Some(200) => AuthResult::Ok,
			Some(403) => AuthResult::Forbidden,
			Some(_) => AuthResult::Failed,
			None => AuthResult::Failed,
		}
	}

	fn has_release_hook(&self) -> bool {
		true
	}

	fn release_client(&self, client: &mut Client) -> AuthResult {
		let username = client.username().unwrap_or_default().to_string();

		match self.post(&self.remove_url, &[("action", "remove"), ("username", &username)]) {
			Some(200) => AuthResult::Released,
			_ => AuthResult::Released,
		}
	}

	fn adduser(&self, username: &str, password: &str) -> AuthResult {
		match self.post(&self.add_url, &[("action", "adduser"), ("username", username), ("password", password)]) {
			Some(200) => AuthResult::UserAdded,
			Some(409) => AuthResult::UserExists,
			_ => AuthResult::Undefined,
		}
	}

	fn deleteuser(&self, username: &str) -> AuthResult {
		match self.post(&self.delete_url, &[("action", "deleteuser"), ("username", username)]) {
			Some(200) => AuthResult::UserDeleted,
			_ => AuthResult::Undefined,
		}
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap as Map;

	use super::*;

	#[test]
	fn missing_auth_url_is_rejected() {
		assert!(matches!(UrlBackend::from_options(&Map::new()), Err(ConfigError::MissingAttribute("auth_url"))));
	}

	#[test]
	fn unset_action_urls_default_to_auth_url() {
		let options: Map<String, String> = [("auth_url".to_string(), "https://example.test/auth".to_string())].into();
		let backend = UrlBackend::from_options(&options).unwrap();
		assert_eq!(backend.add_url, "https://example.test/auth");
		assert_eq!(backend.remove_url, "https://example.test/auth");
		assert_eq!(backend.delete_url, "https://example.test/auth");
	}

	#[test]
	fn has_release_hook_is_set() {
		let options: Map<String, String> = [("auth_url".to_string(), "https://example.test/auth".to_string())].into();
		let backend = UrlBackend::from_options(&options).unwrap();
		assert!(backend.has_release_hook());
	}
}

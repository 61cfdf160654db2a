//! Concrete [`super::backend::AuthBackend`] implementations, one per
//! [`super::AuthType`].

pub mod anonymous;
pub mod htpasswd;
pub mod static_backend;
pub mod url;

pub use anonymous::AnonymousBackend;
pub use htpasswd::HtpasswdBackend;
pub use static_backend::StaticBackend;
pub use url::UrlBackend;

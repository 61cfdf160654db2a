//! Tracing setup, in two stages exactly as the teacher's `bin/server.rs`
//! does it: a temporary subscriber active for the duration of early startup
//! (config loading, before a log level is known), then a permanent one
//! installed once config is in hand.
//!
//! Per §4.1, the permanent subscriber is `EnvFilter`-driven (`RUST_LOG`)
//! rather than the teacher's config-reactive `DynFilterFn` — this crate has
//! no live config-reload path of its own, so there is nothing for a dynamic
//! filter to react to; `EnvFilter` is the ordinary `tracing-subscriber` way
//! to get a level from the environment once, at startup.

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Install a temporary default subscriber for use before the real log level
/// is known (e.g. while parsing config). Dropping the returned guard (or
/// letting it go out of scope once [`install`] has set the permanent
/// subscriber) restores whatever subscriber was active before this call.
#[must_use]
pub fn temporary() -> tracing::subscriber::DefaultGuard {
	let subscriber = FmtSubscriber::builder()
		.with_level(true)
		.with_max_level(if cfg!(debug_assertions) { Level::DEBUG } else { Level::INFO })
		.finish();

	tracing::subscriber::set_default(subscriber)
}

/// Install the permanent global subscriber: a non-blocking stdout writer
/// filtered by `RUST_LOG` (falling back to `info` for everything when unset).
///
/// The returned [`WorkerGuard`] must be kept alive for the life of the
/// process — dropping it stops the background writer thread and silently
/// truncates any logs still queued.
///
/// # Panics
/// Panics if a global subscriber has already been installed.
pub fn install() -> WorkerGuard {
	let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stdout());

	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

	let subscriber = FmtSubscriber::builder()
		.with_level(true)
		.with_env_filter(filter)
		.with_writer(non_blocking)
		.finish();

	tracing::subscriber::set_global_default(subscriber).expect("setting global tracing subscriber failed");

	guard
}

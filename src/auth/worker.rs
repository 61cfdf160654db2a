//! The per-authenticator worker thread that drains a non-`immediate`
//! authenticator's work queue.

use std::{
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
	thread::JoinHandle,
	time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, info};

use super::WorkItem;

/// How long a worker blocks waiting for the next item before re-checking
/// `running`. This directly supersedes the original's "sleep 150ms when the
/// queue is empty" poll loop: `recv_timeout` blocks efficiently and wakes
/// immediately on enqueue, while still bounding shutdown latency to this
/// interval.
const POLL_INTERVAL: Duration = Duration::from_millis(150);

/// A running worker thread plus the flag used to stop it.
///
/// Dropping a `Worker` signals `running` false and joins the thread, so the
/// worker is guaranteed stopped before the `Authenticator` that owns it (and
/// its backend) is dropped — invariant 2 in §9.
pub struct Worker {
	running: Arc<AtomicBool>,
	handle: Option<JoinHandle<()>>,
}

impl Worker {
	/// Spawn a worker thread draining `receiver`, invoking `process` on each
	/// item it pulls off in FIFO order.
	pub fn spawn<F>(name: String, receiver: Receiver<WorkItem>, process: F) -> Self
	where
		F: Fn(WorkItem) + Send + 'static,
	{
		let running = Arc::new(AtomicBool::new(true));
		let worker_running = Arc::clone(&running);

		let handle = std::thread::Builder::new()
			.name(name.clone())
			.spawn(move || {
				info!(worker = %name, "authenticator worker starting");
				while worker_running.load(Ordering::Acquire) {
					match receiver.recv_timeout(POLL_INTERVAL) {
						Ok(item) => process(item),
						Err(RecvTimeoutError::Timeout) => {}
						Err(RecvTimeoutError::Disconnected) => break,
					}
				}
				debug!(worker = %name, "authenticator worker stopping");
			})
			.expect("spawning an authenticator worker thread should not fail");

		Self {
			running,
			handle: Some(handle),
		}
	}

	/// Signal the worker to stop. It will observe this within one
	/// [`POLL_INTERVAL`].
	pub fn stop(&self) {
		self.running.store(false, Ordering::Release);
	}
}

impl Drop for Worker {
	fn drop(&mut self) {
		self.stop();
		if let Some(handle) = self.handle.take() {
			let _ = handle.join();
		}
	}
}

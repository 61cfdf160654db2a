//! Refcounted I/O staging buffer, with an optional linked continuation.

use std::sync::Arc;

use parking_lot::Mutex;

/// A refcounted I/O staging buffer used to hold data between a client's
/// connection and whatever is currently writing to or reading from it.
///
/// Cloning a `Refbuf` is cheap and shares the same underlying data (it wraps
/// an `Arc<Mutex<...>>`), mirroring the original's `refbuf_addref`/
/// `refbuf_release` pair: the buffer is freed once the last clone is
/// dropped.
#[derive(Clone, Debug)]
pub struct Refbuf {
	inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
	data: Vec<u8>,
	/// How much of `data`, from the front, is still unread.
	len: usize,
	next: Option<Refbuf>,
}

impl Refbuf {
	/// Allocate a new, empty staging buffer with the given capacity.
	#[must_use]
	pub fn new(capacity: usize) -> Self {
		Self {
			inner: Arc::new(Mutex::new(Inner {
				data: vec![0; capacity],
				len: 0,
				next: None,
			})),
		}
	}

	/// How many unread bytes remain in this buffer.
	#[must_use]
	pub fn len(&self) -> usize {
		self.inner.lock().len
	}

	/// Whether this buffer has no unread bytes.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Replace this buffer's contents, resetting its length to the new
	/// data's length.
	pub fn set_contents(&self, data: &[u8]) {
		let mut inner = self.inner.lock();
		inner.data.clear();
		inner.data.extend_from_slice(data);
		inner.len = data.len();
	}

	/// Consume up to `len` bytes from the front of the buffer into `out`,
	/// moving any residue forward. Returns the number of bytes copied.
	pub fn read_into(&self, out: &mut [u8]) -> usize {
		let mut inner = self.inner.lock();
		let take = out.len().min(inner.len);
		out[..take].copy_from_slice(&inner.data[..take]);
		if take < inner.len {
			inner.data.copy_within(take..inner.len, 0);
		}
		inner.len -= take;
		take
	}

	/// Chain `next` as this buffer's continuation.
	pub fn set_next(&self, next: Option<Self>) {
		self.inner.lock().next = next;
	}

	/// This buffer's continuation, if any.
	#[must_use]
	pub fn next(&self) -> Option<Self> {
		self.inner.lock().next.clone()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn read_into_consumes_and_shifts_residue() {
		let buf = Refbuf::new(16);
		buf.set_contents(b"hello");

		let mut out = [0u8; 2];
		let n = buf.read_into(&mut out);
		assert_eq!(n, 2);
		assert_eq!(&out, b"he");
		assert_eq!(buf.len(), 3);

		let mut rest = [0u8; 3];
		let n = buf.read_into(&mut rest);
		assert_eq!(n, 3);
		assert_eq!(&rest, b"llo");
		assert_eq!(buf.len(), 0);
	}

	#[test]
	fn clone_shares_storage() {
		let buf = Refbuf::new(16);
		buf.set_contents(b"abc");
		let clone = buf.clone();
		assert_eq!(clone.len(), 3);
	}
}

//! Lines carrying random content.
//!
//! Generating random bytes and hex-encoding them costs time proportional to
//! the line size, which for the larger presets is several MiB per line. To
//! keep that cost off the emission path the next line is prepared in a
//! blocking task right after the current one is written. The prepared line and
//! the task share one lock: the task takes ownership of the lock guard and
//! releases it when the line is ready, so at most one refresh is ever
//! outstanding and the following [`Random::produce`] waits for it to finish.
//! If refreshing takes longer than the emission interval the interval
//! stretches; nothing is dropped.

use std::{collections::TryReserveError, sync::Arc};

use chrono::Utc;
use rand::RngCore;
use tokio::{
    io::AsyncWrite,
    sync::{Mutex, OwnedMutexGuard},
    task,
};
use tracing::error;

use super::{Error, Stamp, write_line};

/// The shared buffers. `line` is what gets written, `raw` holds the random
/// bytes hex-encoded into it.
#[derive(Debug)]
struct Buffers {
    line: Vec<u8>,
    raw: Vec<u8>,
}

impl Buffers {
    /// Allocate zeroed buffers for a `size` byte line. Fails rather than
    /// aborting when the allocator cannot satisfy `size`.
    fn new(size: usize) -> Result<Self, Error> {
        let zeroed = |len: usize| -> Result<Vec<u8>, TryReserveError> {
            let mut buf = Vec::new();
            buf.try_reserve_exact(len)?;
            buf.resize(len, 0);
            Ok(buf)
        };
        let allocation = |source| Error::Allocation { size, source };

        Ok(Self {
            line: zeroed(size).map_err(allocation)?,
            raw: zeroed(size / 2).map_err(allocation)?,
        })
    }

    /// Fill the line with fresh random hex and terminate it. The prefix is
    /// written over the start of the line at produce time.
    fn refresh(&mut self) -> Result<(), hex::FromHexError> {
        rand::rng().fill_bytes(&mut self.raw);
        let hex_len = self.raw.len() * 2;
        hex::encode_to_slice(&self.raw, &mut self.line[..hex_len])?;
        if let Some(last) = self.line.last_mut() {
            *last = b'\n';
        }
        Ok(())
    }

    /// Grow the line so that `prefix_len` bytes plus the newline fit.
    fn fit(&mut self, prefix_len: usize) {
        let needed = prefix_len + 1;
        if self.line.len() < needed {
            self.line.resize(needed, b'0');
            self.raw.resize(needed / 2, 0);
            if let Some(last) = self.line.last_mut() {
                *last = b'\n';
            }
        }
    }
}

#[derive(Debug)]
/// Writes lines of hex-encoded random bytes, no shorter than a minimal size.
pub struct Random {
    stamp: Stamp,
    buffers: Arc<Mutex<Buffers>>,
}

impl Random {
    /// Line length is `max(min_size, prefix_len + 1)`: a minimal size too small
    /// to hold the prefix and newline is silently raised. The first line is
    /// allocated and filled on the blocking pool.
    pub(crate) async fn new(mut stamp: Stamp, min_size: usize) -> Result<Self, Error> {
        let prefix_len = stamp.prefix(Utc::now())?.len();
        let size = min_size.max(prefix_len.saturating_add(1));

        let buffers = task::spawn_blocking(move || {
            let mut buffers = Buffers::new(size)?;
            buffers.refresh().map_err(|err| {
                std::io::Error::other(format!("failed to encode random payload: {err}"))
            })?;
            Ok::<_, Error>(buffers)
        })
        .await??;

        Ok(Self {
            stamp,
            buffers: Arc::new(Mutex::new(buffers)),
        })
    }

    pub(crate) async fn produce<W>(&mut self, sink: &mut W) -> Result<usize, Error>
    where
        W: AsyncWrite + Unpin + Send,
    {
        // Blocks here while the previous refresh is still running.
        let mut guard = Arc::clone(&self.buffers).lock_owned().await;

        let prefix = self.stamp.prefix(Utc::now())?;
        guard.fit(prefix.len());
        guard.line[..prefix.len()].copy_from_slice(prefix.as_bytes());

        let result = write_line(sink, &guard.line).await;
        spawn_refresh(guard);
        result
    }
}

/// Refresh the buffers off the async runtime, releasing the lock when done.
fn spawn_refresh(mut guard: OwnedMutexGuard<Buffers>) {
    drop(task::spawn_blocking(move || {
        if let Err(err) = guard.refresh() {
            error!("failed to refresh random payload: {err}");
        }
        drop(guard);
    }));
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDateTime;

    use super::*;

    const RFC3339: &str = "%Y-%m-%dT%H:%M:%SZ";

    async fn lines(name: &str, min_size: usize, format: &str, repeats: usize) -> Vec<Vec<u8>> {
        let mut random = Random::new(Stamp::new(name, format), min_size)
            .await
            .expect("construction failed");
        let mut out = Vec::new();
        for _ in 0..repeats {
            let mut sink: Vec<u8> = Vec::new();
            let written = random.produce(&mut sink).await.expect("produce failed");
            assert_eq!(written, sink.len());
            out.push(sink);
        }
        out
    }

    fn split(line: &[u8], prefix_len: usize) -> (&str, &str) {
        let line = std::str::from_utf8(line).expect("line is not utf-8");
        assert!(line.ends_with('\n'), "line not newline terminated");
        let (prefix, payload) = line.split_at(prefix_len);
        (prefix, &payload[..payload.len() - 1])
    }

    #[tokio::test]
    async fn lines_hold_prefix_payload_and_newline() {
        let prefix_len = "2024-01-01T00:00:00Z [Basic] ".len();
        for line in lines("Basic", 256, RFC3339, 3).await {
            assert_eq!(line.len(), 256);
            let (prefix, payload) = split(&line, prefix_len);
            let (timestamp, tag) = prefix.split_once(' ').expect("no space after timestamp");
            NaiveDateTime::parse_from_str(timestamp, RFC3339).expect("timestamp does not parse");
            assert_eq!(tag, "[Basic] ");
            assert!(payload.bytes().all(|b| b.is_ascii_hexdigit()));
        }
    }

    #[tokio::test]
    async fn consecutive_payloads_differ() {
        let prefix_len = "[EmptyTimestamp] ".len();
        let lines = lines("EmptyTimestamp", 256, "", 3).await;
        for pair in lines.windows(2) {
            let (_, left) = split(&pair[0], prefix_len);
            let (_, right) = split(&pair[1], prefix_len);
            assert!(!left.is_empty());
            assert_ne!(left, right, "two consecutive lines share content");
        }
    }

    #[tokio::test]
    async fn small_minimal_size_is_promoted() {
        // A 10 byte minimum cannot hold the 20 byte timestamp, let alone the
        // rest of the prefix.
        let prefix_len = "2024-01-01T00:00:00Z [MinimalSize] ".len();
        for line in lines("MinimalSize", 10, RFC3339, 2).await {
            assert_eq!(line.len(), prefix_len + 1);
            assert_eq!(line.last(), Some(&b'\n'));
        }
    }

    #[tokio::test]
    async fn size_floor_holds_prefix_of_twenty() {
        // The prefix alone is 20 bytes, twice the requested minimum.
        let name = "abcdefghijklmnopq";
        let prefix_len = format!("[{name}] ").len();
        assert_eq!(prefix_len, 20);
        for line in lines(name, 10, "", 2).await {
            assert!(line.len() >= prefix_len + 1);
            assert!(line.starts_with(format!("[{name}] ").as_bytes()));
        }
    }

    #[tokio::test]
    async fn odd_sizes_are_fully_filled() {
        for line in lines("O", 101, "", 3).await {
            assert_eq!(line.len(), 101);
            let (_, payload) = split(&line, "[O] ".len());
            assert!(payload.bytes().all(|b| b.is_ascii_hexdigit()));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn produce_waits_for_outstanding_refresh() {
        let mut random = Random::new(Stamp::new("R", ""), 1 << 20)
            .await
            .expect("construction failed");
        let mut first: Vec<u8> = Vec::new();
        random.produce(&mut first).await.expect("produce failed");

        // The lock is held by the refresh task until the next line is ready;
        // once the next produce returns the buffer must have been refreshed.
        let mut second: Vec<u8> = Vec::new();
        random.produce(&mut second).await.expect("produce failed");
        assert_eq!(first.len(), second.len());
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn first_line_is_ready_before_first_produce() {
        let mut random = Random::new(Stamp::new("L", ""), 1 << 16)
            .await
            .expect("construction failed");
        let guard = random
            .buffers
            .try_lock()
            .expect("first line still being prepared");
        let (_, payload) = split(&guard.line, "[L] ".len());
        assert!(payload.bytes().all(|b| b.is_ascii_hexdigit()));
        drop(guard);

        let mut sink: Vec<u8> = Vec::new();
        random.produce(&mut sink).await.expect("produce failed");
        assert_eq!(sink.len(), 1 << 16);
    }

    #[tokio::test]
    async fn unallocatable_size_is_an_error() {
        let err = Random::new(Stamp::new("Huge", ""), 1 << 50)
            .await
            .expect_err("petabyte line allocated");
        assert!(matches!(err, Error::Allocation { size, .. } if size == 1 << 50));

        assert!(matches!(
            Buffers::new(usize::MAX),
            Err(Error::Allocation { .. })
        ));
    }

    #[test]
    fn buffers_fit_grows_and_terminates() {
        let mut buffers = Buffers::new(4).expect("allocation failed");
        buffers.fit(10);
        assert_eq!(buffers.line.len(), 11);
        assert_eq!(buffers.raw.len(), 5);
        assert_eq!(buffers.line.last(), Some(&b'\n'));
        buffers.refresh().expect("refresh failed");
        assert_eq!(buffers.line.last(), Some(&b'\n'));
    }
}

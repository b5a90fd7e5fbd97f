//! Lines carrying a fixed, user-provided message.

use chrono::Utc;
use tokio::io::AsyncWrite;

use super::{Error, Stamp, write_line};

#[derive(Debug)]
/// Repeats one message forever.
///
/// The line `<timestamp> [name] <message>\n` is built once. Producing a line
/// only rewrites the leading timestamp bytes.
pub struct Explicit {
    stamp: Stamp,
    line: Vec<u8>,
    /// Width of the timestamp region at the start of `line`.
    timestamp_len: usize,
}

impl Explicit {
    pub(crate) fn new(mut stamp: Stamp, message: &str) -> Result<Self, Error> {
        let timestamp = stamp.timestamp(Utc::now())?.to_string();
        let tag = stamp.tag();

        let mut line = Vec::with_capacity(timestamp.len() + 1 + tag.len() + message.len() + 1);
        line.extend_from_slice(timestamp.as_bytes());
        if stamp.has_timestamp() {
            line.push(b' ');
        }
        line.extend_from_slice(tag.as_bytes());
        line.extend_from_slice(message.as_bytes());
        line.push(b'\n');

        Ok(Self {
            timestamp_len: timestamp.len(),
            stamp,
            line,
        })
    }

    pub(crate) async fn produce<W>(&mut self, sink: &mut W) -> Result<usize, Error>
    where
        W: AsyncWrite + Unpin + Send,
    {
        if self.stamp.has_timestamp() {
            let timestamp = self.stamp.timestamp(Utc::now())?;
            if timestamp.len() == self.timestamp_len {
                self.line[..self.timestamp_len].copy_from_slice(timestamp.as_bytes());
            } else {
                // Variable width format, e.g. `%-d`. Splice rather than
                // clobber the space that follows.
                self.line.splice(..self.timestamp_len, timestamp.bytes());
                self.timestamp_len = timestamp.len();
            }
        }
        write_line(sink, &self.line).await
    }
}

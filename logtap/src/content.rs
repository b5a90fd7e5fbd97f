//! Log line content generators
//!
//! Every line logtap writes has the shape `[<timestamp> ][<name>] <payload>\n`.
//! The two variants of [`Content`] differ only in where the payload comes
//! from: [`Explicit`] repeats a fixed message, [`Random`] hex-encodes fresh
//! random bytes for every line and prepares the next line in the background
//! while the caller waits out its interval.
//!
//! Both variants keep their line in a long-lived buffer and only rewrite the
//! bytes that change between lines.

use std::fmt::{self, Write as _};

use chrono::{DateTime, Utc};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::task::{ContentType, Spec};

pub mod explicit;
pub mod random;

pub use explicit::Explicit;
pub use random::Random;

#[derive(thiserror::Error, Debug)]
/// Errors produced by [`Content`].
pub enum Error {
    /// Writing the line to the sink failed.
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),
    /// The timestamp could not be rendered with the configured format.
    #[error("Failed to format timestamp with '{0}'")]
    Timestamp(String),
    /// A line buffer of the requested size could not be allocated.
    #[error("Failed to allocate a {size} byte line: {source}")]
    Allocation {
        /// Requested line size in bytes.
        size: usize,
        /// Underlying allocator error.
        source: std::collections::TryReserveError,
    },
    /// Preparing the first line on the blocking pool did not complete.
    #[error("Failed to join line preparation: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug)]
/// A producer of log lines. See the variant types for details.
pub enum Content {
    /// See [`Explicit`] for details.
    Explicit(Explicit),
    /// See [`Random`] for details.
    Random(Random),
}

impl Content {
    /// Create the generator `spec` asks for, naming lines after `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the timestamp cannot be rendered with the spec's
    /// format or the line buffer cannot be allocated.
    pub async fn from_spec(spec: &Spec, name: &str) -> Result<Self, Error> {
        let stamp = Stamp::new(name, &spec.timestamp_format);
        let content = match spec.content_type {
            ContentType::Explicit => Self::Explicit(Explicit::new(stamp, &spec.message)?),
            ContentType::Random => {
                let min_size = usize::try_from(spec.min_size).unwrap_or(usize::MAX);
                Self::Random(Random::new(stamp, min_size).await?)
            }
        };
        Ok(content)
    }

    /// Write one line to `sink`, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns an error if the timestamp cannot be rendered or the write to
    /// `sink` fails.
    pub async fn produce<W>(&mut self, sink: &mut W) -> Result<usize, Error>
    where
        W: AsyncWrite + Unpin + Send,
    {
        match self {
            Content::Explicit(inner) => inner.produce(sink).await,
            Content::Random(inner) => inner.produce(sink).await,
        }
    }
}

/// Renders the `[<timestamp> ][<name>] ` prefix of a line.
#[derive(Debug, Clone)]
pub(crate) struct Stamp {
    name: String,
    format: String,
    /// Reused between renders to avoid an allocation per line.
    scratch: String,
}

impl Stamp {
    pub(crate) fn new(name: &str, format: &str) -> Self {
        Self {
            name: name.to_string(),
            format: format.to_string(),
            scratch: String::new(),
        }
    }

    pub(crate) fn has_timestamp(&self) -> bool {
        !self.format.is_empty()
    }

    /// Render only the timestamp for `now`.
    pub(crate) fn timestamp(&mut self, now: DateTime<Utc>) -> Result<&str, Error> {
        self.scratch.clear();
        self.render_timestamp(now)?;
        Ok(&self.scratch)
    }

    /// Render the whole prefix for `now`.
    pub(crate) fn prefix(&mut self, now: DateTime<Utc>) -> Result<&str, Error> {
        self.scratch.clear();
        if self.has_timestamp() {
            self.render_timestamp(now)?;
            self.scratch.push(' ');
        }
        self.scratch.push('[');
        self.scratch.push_str(&self.name);
        self.scratch.push_str("] ");
        Ok(&self.scratch)
    }

    /// The `[<name>] ` part of the prefix.
    pub(crate) fn tag(&self) -> String {
        format!("[{}] ", self.name)
    }

    fn render_timestamp(&mut self, now: DateTime<Utc>) -> Result<(), Error> {
        if !self.has_timestamp() {
            return Ok(());
        }
        write!(self.scratch, "{}", now.format(&self.format))
            .map_err(|fmt::Error| Error::Timestamp(self.format.clone()))
    }
}

/// Write `line` to `sink` in one operation and flush it through.
async fn write_line<W>(sink: &mut W, line: &[u8]) -> Result<usize, Error>
where
    W: AsyncWrite + Unpin + Send,
{
    sink.write_all(line).await?;
    sink.flush().await?;
    Ok(line.len())
}

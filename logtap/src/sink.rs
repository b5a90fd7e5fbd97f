//! Destinations for log lines.

use std::{
    io,
    path::{Path, PathBuf},
    pin::Pin,
    task::{Context, Poll},
};

use tokio::{
    fs,
    io::{AsyncWrite, Stderr, Stdout},
};
use tracing::info;

use crate::task::{OutputKind, Spec};

#[derive(thiserror::Error, Debug)]
/// Errors produced by [`Sink`].
pub enum Error {
    /// The output file could not be opened.
    #[error("open {path}: {source}")]
    Open {
        /// Path that failed to open.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
}

#[derive(Debug)]
/// Where a runner writes its lines.
pub enum Sink {
    /// The process' standard output.
    Stdout(Stdout),
    /// The process' standard error.
    Stderr(Stderr),
    /// A file, appended to.
    File(fs::File),
}

impl Sink {
    /// Open the destination `spec` names.
    ///
    /// Files are created if absent and always appended to, never truncated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Open`] if the file cannot be opened for writing.
    pub async fn open(spec: &Spec) -> Result<Self, Error> {
        match (spec.output_kind, spec.filepath.as_deref()) {
            (OutputKind::Stdout, _) => Ok(Self::Stdout(tokio::io::stdout())),
            (OutputKind::Stderr, _) => Ok(Self::Stderr(tokio::io::stderr())),
            (OutputKind::File, path) => {
                let path = path.unwrap_or_else(|| Path::new(""));
                let file = open_append(path).await.map_err(|source| Error::Open {
                    path: path.to_path_buf(),
                    source,
                })?;
                info!("opened {path} for appending", path = path.display());
                Ok(Self::File(file))
            }
        }
    }
}

async fn open_append(path: &Path) -> io::Result<fs::File> {
    let mut options = fs::OpenOptions::new();
    options.create(true).append(true).write(true);
    #[cfg(unix)]
    options.mode(0o644);
    options.open(path).await
}

impl AsyncWrite for Sink {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Sink::Stdout(inner) => Pin::new(inner).poll_write(cx, buf),
            Sink::Stderr(inner) => Pin::new(inner).poll_write(cx, buf),
            Sink::File(inner) => Pin::new(inner).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Sink::Stdout(inner) => Pin::new(inner).poll_flush(cx),
            Sink::Stderr(inner) => Pin::new(inner).poll_flush(cx),
            Sink::File(inner) => Pin::new(inner).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Sink::Stdout(inner) => Pin::new(inner).poll_shutdown(cx),
            Sink::Stderr(inner) => Pin::new(inner).poll_shutdown(cx),
            Sink::File(inner) => Pin::new(inner).poll_shutdown(cx),
        }
    }
}

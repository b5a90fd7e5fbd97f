//! The logtap task model.
//!
//! A [`Task`] bundles the user's immutable [`Spec`] with the runner-owned
//! [`Status`] and some identifying [`Metadata`]. The serialized form is what
//! the status server hands out and what spec files on disk contain, hence the
//! camelCase field names.

use std::{fmt, path::PathBuf, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod validation;

pub use validation::{
    ValidationError, validate_metadata, validate_spec, validate_status, validate_task,
};

/// The schema version of the models in this module.
pub const VERSION: &str = "v1alpha1";

/// Errors produced when parsing the kinds in this module from text.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseKindError {
    /// The text does not name an output kind.
    #[error("unrecognized output kind '{0}', expected one of stdout, stderr, file")]
    OutputKind(String),
    /// The text does not name a content type.
    #[error("unrecognized content type '{0}', expected one of random, explicit")]
    ContentType(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// The sink log lines are written to.
pub enum OutputKind {
    /// Log lines are written to STDOUT.
    Stdout,
    /// Log lines are written to STDERR.
    Stderr,
    /// Log lines are appended to the file at [`Spec::filepath`].
    File,
}

impl OutputKind {
    /// All output kinds, in help-text order.
    pub const ALL: [OutputKind; 3] = [OutputKind::Stdout, OutputKind::Stderr, OutputKind::File];

    /// The canonical lowercase name of this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            OutputKind::Stdout => "stdout",
            OutputKind::Stderr => "stderr",
            OutputKind::File => "file",
        }
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputKind {
    type Err = ParseKindError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        OutputKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(input))
            .ok_or_else(|| ParseKindError::OutputKind(input.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// The kind of content each log line carries.
pub enum ContentType {
    /// Hex-encoded random bytes, padded to [`Spec::min_size`].
    Random,
    /// The fixed text in [`Spec::message`].
    Explicit,
}

impl ContentType {
    /// All content types, in help-text order.
    pub const ALL: [ContentType; 2] = [ContentType::Random, ContentType::Explicit];

    /// The canonical lowercase name of this type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Random => "random",
            ContentType::Explicit => "explicit",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = ParseKindError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        ContentType::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(input))
            .ok_or_else(|| ParseKindError::ContentType(input.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(deny_unknown_fields)]
/// The user's declaration of how log lines are produced. Immutable once a
/// runner is built from it.
pub struct Spec {
    /// Where log lines go.
    pub output_kind: OutputKind,
    /// The file log lines are appended to. Required for
    /// [`OutputKind::File`], forbidden otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filepath: Option<PathBuf>,
    /// chrono strftime format of the line timestamp. Empty disables the
    /// timestamp.
    #[serde(default)]
    pub timestamp_format: String,
    /// What each line carries.
    pub content_type: ContentType,
    /// The message of [`ContentType::Explicit`] lines. Must be empty for
    /// [`ContentType::Random`].
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    /// The minimal size in bytes of a [`ContentType::Random`] line, newline
    /// included. Must be zero for [`ContentType::Explicit`].
    #[serde(default)]
    pub min_size: u64,
    /// Seconds between two lines. Zero emits as fast as possible.
    pub interval: f64,
}

impl Spec {
    /// Whether a non-empty `filepath` is set.
    #[must_use]
    pub fn has_filepath(&self) -> bool {
        self.filepath
            .as_ref()
            .is_some_and(|path| !path.as_os_str().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// The lifecycle phase of a task.
pub enum Phase {
    /// Constructed, not yet run.
    Idle,
    /// The emission loop is running.
    Running,
    /// Stopped by the stop signal. Terminal.
    Stopped,
    /// Stopped by an error. Terminal.
    Failed,
}

impl Phase {
    /// Whether no further transition out of this phase is possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Stopped | Phase::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "Idle",
            Phase::Running => "Running",
            Phase::Stopped => "Stopped",
            Phase::Failed => "Failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Runtime state of a task. Only the runner mutates it.
pub struct Status {
    /// Current lifecycle phase.
    pub phase: Phase,
    /// Why the task failed. Only set in [`Phase::Failed`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// When `phase` was last set.
    pub phase_timestamp: DateTime<Utc>,
    /// Lines written so far.
    pub sent_count: u64,
    /// Bytes written so far.
    pub sent_bytes: u64,
}

impl Status {
    fn idle() -> Self {
        Self {
            phase: Phase::Idle,
            reason: None,
            phase_timestamp: Utc::now(),
            sent_count: 0,
            sent_bytes: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Identifying information of a task.
pub struct Metadata {
    /// Schema version, see [`VERSION`].
    pub version: String,
    /// The name given to this deployment. Appears in every line.
    pub name: String,
    /// When the task was created.
    pub creation_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// A spec, its live status and metadata.
pub struct Task {
    /// Identifying information.
    pub metadata: Metadata,
    /// The immutable declaration.
    pub spec: Spec,
    /// The runtime state.
    pub status: Status,
}

impl Task {
    /// Create an idle task named `name` from `spec`.
    #[must_use]
    pub fn new(name: impl Into<String>, spec: Spec) -> Self {
        Self {
            metadata: Metadata {
                version: VERSION.to_string(),
                name: name.into(),
                creation_timestamp: Utc::now(),
            },
            spec,
            status: Status::idle(),
        }
    }

    /// The task name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

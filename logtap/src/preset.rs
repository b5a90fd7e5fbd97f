//! Named, ready-made task specs.
//!
//! Every preset writes random content to STDERR with an RFC 3339 timestamp and
//! varies only line size and interval. Users pick one with `--template`, which
//! replaces any spec assembled from other flags.

use crate::task::{ContentType, OutputKind, Spec};

/// The timestamp format shared by all presets: RFC 3339 in UTC, second
/// precision.
pub const RFC3339: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Errors produced by [`lookup`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No preset goes by the requested name.
    #[error("{0} is not a valid preset")]
    Unknown(String),
}

#[derive(Debug, Clone, Copy)]
/// A named spec template.
pub struct Preset {
    /// Canonical name of this preset.
    pub name: &'static str,
    /// One-line description of the load produced.
    pub description: &'static str,
    min_size: u64,
    interval: f64,
}

impl Preset {
    /// Build the [`Spec`] this preset stands for.
    #[must_use]
    pub fn spec(&self) -> Spec {
        Spec {
            output_kind: OutputKind::Stderr,
            filepath: None,
            timestamp_format: RFC3339.to_string(),
            content_type: ContentType::Random,
            message: String::new(),
            min_size: self.min_size,
            interval: self.interval,
        }
    }

    fn answers_to(&self, name: &str) -> bool {
        let lowercase = !name.bytes().any(|b| b.is_ascii_uppercase());
        self.name == name || (lowercase && self.name.eq_ignore_ascii_case(name))
    }
}

const PRESETS: [Preset; 4] = [
    Preset {
        name: "Standard",
        description: "Produces a load of 256 B/log, 10 logs/s, and 2.5 KiB/s",
        min_size: 256,
        interval: 0.1,
    },
    Preset {
        name: "Long",
        description: "Produces a load of 20 MiB/log, 0.5 log/s, and 10 MiB/s",
        min_size: 20 * 1024 * 1024,
        interval: 2.0,
    },
    Preset {
        name: "Frequent",
        description: "Produces a load of 256 B/log, 50000 log/s, and 12 MiB/s",
        min_size: 256,
        interval: 0.000_02,
    },
    Preset {
        name: "Roast",
        description: "Produces a load of 1 MiB/log, 40 log/s, and 40 MiB/s",
        min_size: 1024 * 1024,
        interval: 0.025,
    },
];

/// All presets, in help-text order.
#[must_use]
pub fn all() -> &'static [Preset] {
    &PRESETS
}

/// Return the spec of the preset called `name`, either its canonical name or
/// that name in lowercase.
///
/// # Errors
///
/// Returns [`Error::Unknown`] if no preset has that name.
pub fn lookup(name: &str) -> Result<Spec, Error> {
    PRESETS
        .iter()
        .find(|preset| preset.answers_to(name))
        .map(Preset::spec)
        .ok_or_else(|| Error::Unknown(name.to_string()))
}

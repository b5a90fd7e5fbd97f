//! Command line configuration for the `logtap` binary.
//!
//! Every flag has a `LOGTAP_*` environment variable fallback. The task spec is
//! taken from the first of these that is present: a preset named by
//! `--template`, a YAML spec file named by `--spec-path`, the individual
//! content and output flags.

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use byte_unit::Byte;
use clap::Parser;

use crate::{
    field_path::FieldPath,
    preset,
    task::{ContentType, OutputKind, Spec, ValidationError, validate_spec},
};

/// Task name used when neither `--name` nor `HOST` is set.
pub const DEFAULT_NAME: &str = "LogTap";
/// Minimal line size of random content when `--content-min-size` is unset.
pub const DEFAULT_MIN_SIZE: u64 = 128;

#[derive(thiserror::Error, Debug)]
/// Errors produced while assembling a [`Config`].
pub enum Error {
    /// `--template` named no known preset.
    #[error(transparent)]
    Preset(#[from] preset::Error),
    /// The spec file could not be read.
    #[error("Failed to read spec file {path}: {source}")]
    Io {
        /// The spec file.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// The spec file is not a valid YAML spec.
    #[error("Failed to deserialize spec: {0}")]
    SerdeYaml(#[from] serde_yaml::Error),
    /// A duration flag could not be parsed.
    #[error("invalid duration '{input}': {reason}")]
    Duration {
        /// The text given.
        input: String,
        /// Why it does not parse.
        reason: String,
    },
    /// A size flag could not be parsed.
    #[error("invalid size '{input}': {reason}")]
    Size {
        /// The text given.
        input: String,
        /// Why it does not parse.
        reason: String,
    },
    /// The assembled spec is not valid.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

fn preset_help() -> String {
    let mut help = String::from("Presets for --template:\n");
    for preset in preset::all() {
        help.push_str(&format!("  {:<10}{}\n", preset.name, preset.description));
    }
    help
}

#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, after_help = preset_help())]
/// Command line arguments of the `logtap` binary.
pub struct Args {
    /// name of this log generator, prefixed to every line [env: LOGTAP_NAME,
    /// then HOST]
    #[arg(short, long, env = "LOGTAP_NAME")]
    pub name: Option<String>,
    /// where lines are written: stdout, stderr or file
    #[arg(long, env = "LOGTAP_OUTPUT_KIND", default_value_t = OutputKind::Stderr)]
    pub output_kind: OutputKind,
    /// file lines are appended to, required for the file output kind
    #[arg(long, env = "LOGTAP_OUTPUT_FILE_PATH")]
    pub output_file_path: Option<PathBuf>,
    /// strftime format of the timestamp at the start of every line
    #[arg(long, env = "LOGTAP_TIMESTAMP_FORMAT", default_value = "%Y-%m-%dT%H:%M:%S%.9fZ")]
    pub timestamp_format: String,
    /// omit the timestamp from every line
    #[arg(long, env = "LOGTAP_TIMESTAMP_OFF")]
    pub timestamp_off: bool,
    /// what lines carry: random or explicit
    #[arg(long, env = "LOGTAP_CONTENT_TYPE", default_value_t = ContentType::Random)]
    pub content_type: ContentType,
    /// message of explicit lines
    #[arg(long, env = "LOGTAP_CONTENT_MESSAGE")]
    pub content_message: Option<String>,
    /// minimal size of random lines, units accepted, e.g. "1 MiB" [default:
    /// 128]
    #[arg(short = 's', long, env = "LOGTAP_CONTENT_MIN_SIZE", value_parser = parse_size)]
    pub content_min_size: Option<u64>,
    /// seconds between two lines, zero for as fast as possible
    #[arg(short, long, env = "LOGTAP_INTERVAL", default_value_t = 0.5)]
    pub interval: f64,
    /// preset to run, replaces every content and output flag
    #[arg(short, long, env = "LOGTAP_TEMPLATE")]
    pub template: Option<String>,
    /// YAML spec file to run, replaces every content and output flag
    #[arg(long, env = "LOGTAP_SPEC_PATH")]
    pub spec_path: Option<PathBuf>,
    /// stop after this long, e.g. "30s", "1m30s", "1.5h"; bare integers are
    /// seconds
    #[arg(long, env = "LOGTAP_DURATION", value_parser = parse_duration)]
    pub duration: Option<Duration>,
    /// address to serve task status on
    #[arg(long, env = "LOGTAP_STATUS_ADDR")]
    pub status_addr: Option<SocketAddr>,
    /// address to serve prometheus metrics on
    #[arg(long, env = "LOGTAP_PROMETHEUS_ADDR")]
    pub prometheus_addr: Option<SocketAddr>,
}

#[derive(Debug, Clone, PartialEq)]
/// Everything the binary needs to run one task.
pub struct Config {
    /// The task name.
    pub name: String,
    /// The validated spec to run.
    pub spec: Spec,
    /// Stop after this long; run until signalled if unset.
    pub duration: Option<Duration>,
    /// Serve task status here if set.
    pub status_addr: Option<SocketAddr>,
    /// Serve prometheus metrics here if set.
    pub prometheus_addr: Option<SocketAddr>,
}

impl Config {
    /// Assemble a `Config` from parsed `args`. The `HOST` environment
    /// variable names the task when `--name` is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the preset or spec file cannot be loaded or the
    /// resulting spec is invalid.
    pub fn from_args(args: Args) -> Result<Self, Error> {
        let host = std::env::var("HOST").ok();
        Self::from_args_with_host(args, host)
    }

    fn from_args_with_host(args: Args, host: Option<String>) -> Result<Self, Error> {
        let spec = if let Some(template) = &args.template {
            preset::lookup(template)?
        } else if let Some(path) = &args.spec_path {
            load_spec(path)?
        } else {
            spec_from_flags(&args)
        };
        validate_spec(&FieldPath::with_root("spec"), &spec)?;

        Ok(Self {
            name: resolve_name(args.name, host),
            spec,
            duration: args.duration,
            status_addr: args.status_addr,
            prometheus_addr: args.prometheus_addr,
        })
    }
}

fn resolve_name(flag: Option<String>, host: Option<String>) -> String {
    flag.or_else(|| host.filter(|host| !host.is_empty()))
        .unwrap_or_else(|| DEFAULT_NAME.to_string())
}

fn load_spec(path: &Path) -> Result<Spec, Error> {
    let contents = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_yaml::from_str(&contents)?)
}

fn spec_from_flags(args: &Args) -> Spec {
    // Explicit content forbids a size, so the random default only applies to
    // random content. A size the user did set is passed on for validation to
    // reject.
    let min_size = match (args.content_type, args.content_min_size) {
        (_, Some(size)) => size,
        (ContentType::Random, None) => DEFAULT_MIN_SIZE,
        (ContentType::Explicit, None) => 0,
    };
    let timestamp_format = if args.timestamp_off {
        String::new()
    } else {
        args.timestamp_format.clone()
    };

    Spec {
        output_kind: args.output_kind,
        filepath: args.output_file_path.clone(),
        timestamp_format,
        content_type: args.content_type,
        message: args.content_message.clone().unwrap_or_default(),
        min_size,
        interval: args.interval,
    }
}

/// Parse a human readable duration such as `30s`, `1m30s`, `1.5s` or
/// `500us`. A bare integer is in seconds.
///
/// # Errors
///
/// Returns [`Error::Duration`] if `input` is not a duration.
pub fn parse_duration(input: &str) -> Result<Duration, Error> {
    let invalid = |reason: String| Error::Duration {
        input: input.to_string(),
        reason,
    };
    let trimmed = input.trim();
    if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return trimmed
            .parse()
            .map(Duration::from_secs)
            .map_err(|err| invalid(err.to_string()));
    }
    humantime::parse_duration(trimmed).map_err(|err| invalid(err.to_string()))
}

/// Parse a byte size such as `256`, `4KiB` or `1 MiB`.
///
/// # Errors
///
/// Returns [`Error::Size`] if `input` is not a size.
pub fn parse_size(input: &str) -> Result<u64, Error> {
    Byte::parse_str(input, true)
        .map(|size| size.as_u64())
        .map_err(|err| Error::Size {
            input: input.to_string(),
            reason: err.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn parse(flags: &[&str]) -> Args {
        let argv = std::iter::once("logtap").chain(flags.iter().copied());
        Args::try_parse_from(argv).expect("arguments rejected")
    }

    fn config(flags: &[&str]) -> Result<Config, Error> {
        Config::from_args_with_host(parse(flags), None)
    }

    #[test]
    fn defaults_produce_random_stderr_spec() {
        let config = config(&[]).expect("defaults rejected");
        assert_eq!(config.name, DEFAULT_NAME);
        assert_eq!(config.spec.output_kind, OutputKind::Stderr);
        assert_eq!(config.spec.content_type, ContentType::Random);
        assert_eq!(config.spec.min_size, DEFAULT_MIN_SIZE);
        assert_eq!(config.spec.timestamp_format, "%Y-%m-%dT%H:%M:%S%.9fZ");
        assert!((config.spec.interval - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.duration, None);
        assert_eq!(config.status_addr, None);
    }

    #[test]
    fn name_falls_back_to_host() {
        assert_eq!(resolve_name(None, Some("box-1".to_string())), "box-1");
        assert_eq!(resolve_name(None, Some(String::new())), DEFAULT_NAME);
        assert_eq!(
            resolve_name(Some("flag".to_string()), Some("box-1".to_string())),
            "flag"
        );
    }

    #[test]
    fn explicit_content_drops_default_size() {
        let config = config(&["--content-type", "explicit", "--content-message", "hi"])
            .expect("explicit flags rejected");
        assert_eq!(config.spec.min_size, 0);
        assert_eq!(config.spec.message, "hi");
    }

    #[test]
    fn explicit_content_with_size_is_rejected() {
        let err = config(&["--content-type", "explicit", "-s", "64"])
            .expect_err("explicit size accepted");
        let Error::Validation(err) = err else {
            panic!("unexpected error {err:?}");
        };
        assert_eq!(err.path, "spec.minSize");
    }

    #[test]
    fn sizes_accept_units() {
        let config = config(&["-s", "1 MiB"]).expect("size rejected");
        assert_eq!(config.spec.min_size, 1024 * 1024);
        assert_eq!(parse_size("256").expect("plain size rejected"), 256);
        assert!(parse_size("lots").is_err());
    }

    #[test]
    fn timestamp_off_clears_format() {
        let config = config(&["--timestamp-off"]).expect("flags rejected");
        assert_eq!(config.spec.timestamp_format, "");
    }

    #[test]
    fn template_wins_over_flags_and_spec_file() {
        let config = config(&[
            "--template",
            "frequent",
            "--spec-path",
            "/nonexistent/spec.yaml",
            "--content-type",
            "explicit",
            "--output-kind",
            "stdout",
        ])
        .expect("template rejected");
        assert_eq!(config.spec, preset::lookup("Frequent").expect("preset missing"));
    }

    #[test]
    fn unknown_template_is_an_error() {
        assert!(matches!(
            config(&["-t", "Simmer"]),
            Err(Error::Preset(preset::Error::Unknown(_)))
        ));
    }

    #[test]
    fn spec_file_wins_over_flags() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(
            file,
            "outputKind: stdout\ncontentType: explicit\nmessage: from file\ninterval: 2.5\n"
        )
        .expect("write spec");

        let path = file.path().to_str().expect("utf-8 path");
        let config = config(&["--spec-path", path, "--content-message", "from flag"])
            .expect("spec file rejected");
        assert_eq!(config.spec.output_kind, OutputKind::Stdout);
        assert_eq!(config.spec.message, "from file");
        assert_eq!(config.spec.min_size, 0);
        assert_eq!(config.spec.timestamp_format, "");
        assert!((config.spec.interval - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_spec_file_is_an_error() {
        assert!(matches!(
            config(&["--spec-path", "/nonexistent/spec.yaml"]),
            Err(Error::Io { .. })
        ));
    }

    #[test]
    fn file_output_requires_path() {
        let err = config(&["--output-kind", "file"]).expect_err("file without path accepted");
        assert!(matches!(err, Error::Validation(ref e) if e.path == "spec.filepath"));

        let config = config(&["--output-kind", "file", "--output-file-path", "/tmp/x.log"])
            .expect("file output rejected");
        assert_eq!(config.spec.filepath, Some(PathBuf::from("/tmp/x.log")));
    }

    #[test]
    fn durations_parse() {
        assert_eq!(parse_duration("30s").ok(), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("45").ok(), Some(Duration::from_secs(45)));
        assert_eq!(parse_duration("1500ms").ok(), Some(Duration::from_millis(1_500)));
        assert_eq!(parse_duration("2m").ok(), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h").ok(), Some(Duration::from_secs(3_600)));
        assert_eq!(parse_duration("1m30s").ok(), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("1.5s").ok(), Some(Duration::from_millis(1_500)));
        assert_eq!(parse_duration("2h45m").ok(), Some(Duration::from_secs(9_900)));
        assert_eq!(parse_duration("500us").ok(), Some(Duration::from_micros(500)));
        for bad in ["", "s", "-1s", "1.5", "10 parsecs", "ten"] {
            assert!(parse_duration(bad).is_err(), "{bad:?} accepted");
        }

        let config = config(&["--duration", "1m30s"]).expect("duration rejected");
        assert_eq!(config.duration, Some(Duration::from_secs(90)));
        assert!(Args::try_parse_from(["logtap", "--duration", "soon"]).is_err());
    }

    #[test]
    fn addresses_parse() {
        let config = config(&[
            "--status-addr",
            "127.0.0.1:8080",
            "--prometheus-addr",
            "0.0.0.0:9000",
        ])
        .expect("addresses rejected");
        assert_eq!(config.status_addr, Some("127.0.0.1:8080".parse().expect("addr")));
        assert_eq!(config.prometheus_addr, Some("0.0.0.0:9000".parse().expect("addr")));
    }

    #[test]
    fn help_lists_presets() {
        let help = preset_help();
        for preset in preset::all() {
            assert!(help.contains(preset.name));
        }
    }
}

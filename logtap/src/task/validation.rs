//! Cross-field validation of the task model.
//!
//! Every function here is pure: it inspects its input, returns the first
//! violation found and never touches the input. Violations carry the dotted
//! path of the offending field, rooted at whatever `FieldPath` the caller
//! passes in.

use chrono::format::{Item, StrftimeItems};

use super::{ContentType, Metadata, OutputKind, Phase, Spec, Status, Task, VERSION};
use crate::field_path::FieldPath;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to validate '{path}': {reason}")]
/// A field of the task model violates a constraint.
pub struct ValidationError {
    /// Dotted path of the offending field, e.g. `spec.filepath`.
    pub path: String,
    /// What is wrong with the field.
    pub reason: String,
}

impl ValidationError {
    fn new(path: &FieldPath, reason: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    fn invalid_value(path: &FieldPath) -> Self {
        Self::new(path, "invalid value")
    }
}

/// Validate a whole [`Task`]: metadata, then spec, then status.
///
/// # Errors
///
/// Returns the first violation found.
pub fn validate_task(path: &FieldPath, task: &Task) -> Result<(), ValidationError> {
    validate_metadata(&path.push("metadata"), &task.metadata)?;
    validate_spec(&path.push("spec"), &task.spec)?;
    validate_status(&path.push("status"), &task.status)
}

/// Validate task [`Metadata`].
///
/// # Errors
///
/// Returns an error if the schema version is not [`VERSION`] or the name is
/// empty.
pub fn validate_metadata(path: &FieldPath, metadata: &Metadata) -> Result<(), ValidationError> {
    if metadata.version != VERSION {
        return Err(ValidationError::new(
            &path.push("version"),
            format!(
                "unexpected version '{}' (want '{VERSION}')",
                metadata.version
            ),
        ));
    }
    if metadata.name.is_empty() {
        return Err(ValidationError::new(&path.push("name"), "name is empty"));
    }
    Ok(())
}

/// Validate a [`Spec`].
///
/// Checks run in this order: content-type constraints, output-kind
/// constraints, `interval`, `timestampFormat`. `minSize` is unsigned so its
/// non-negativity holds by construction.
///
/// # Errors
///
/// Returns the first violation found.
pub fn validate_spec(path: &FieldPath, spec: &Spec) -> Result<(), ValidationError> {
    match spec.content_type {
        ContentType::Random => {
            if !spec.message.is_empty() {
                return Err(ValidationError::new(&path.push("message"), "invalid field"));
            }
        }
        ContentType::Explicit => {
            if spec.min_size != 0 {
                return Err(ValidationError::new(&path.push("minSize"), "invalid field"));
            }
        }
    }

    let filepath_provided = spec.has_filepath();
    match spec.output_kind {
        OutputKind::File if !filepath_provided => {
            return Err(ValidationError::new(
                &path.push("filepath"),
                "filepath not specified for file output",
            ));
        }
        OutputKind::Stdout | OutputKind::Stderr if filepath_provided => {
            let stream = if spec.output_kind == OutputKind::Stdout {
                "STDOUT"
            } else {
                "STDERR"
            };
            return Err(ValidationError::new(
                &path.push("filepath"),
                format!("filepath specified for {stream} output"),
            ));
        }
        OutputKind::File | OutputKind::Stdout | OutputKind::Stderr => {}
    }

    if !spec.interval.is_finite() || spec.interval < 0.0 {
        return Err(ValidationError::invalid_value(&path.push("interval")));
    }

    if StrftimeItems::new(&spec.timestamp_format).any(|item| matches!(item, Item::Error)) {
        return Err(ValidationError::new(
            &path.push("timestampFormat"),
            "malformed timestamp format",
        ));
    }

    Ok(())
}

/// Validate a [`Status`].
///
/// Phase membership and counter non-negativity hold by construction. What
/// remains is that only a failed task carries a reason.
///
/// # Errors
///
/// Returns an error if `reason` is set outside of [`Phase::Failed`].
pub fn validate_status(path: &FieldPath, status: &Status) -> Result<(), ValidationError> {
    if status.phase != Phase::Failed && status.reason.is_some() {
        return Err(ValidationError::new(
            &path.push("reason"),
            format!("reason set in phase {}", status.phase),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use proptest::prelude::*;

    use super::*;

    fn random_spec() -> Spec {
        Spec {
            output_kind: OutputKind::Stderr,
            filepath: None,
            timestamp_format: "%Y-%m-%dT%H:%M:%SZ".to_string(),
            content_type: ContentType::Random,
            message: String::new(),
            min_size: 256,
            interval: 0.1,
        }
    }

    fn explicit_spec() -> Spec {
        Spec {
            content_type: ContentType::Explicit,
            message: "hello".to_string(),
            min_size: 0,
            ..random_spec()
        }
    }

    fn failing_path(spec: &Spec) -> String {
        validate_spec(&FieldPath::with_root("spec"), spec)
            .expect_err("spec unexpectedly valid")
            .path
    }

    #[test]
    fn valid_specs_pass() {
        let root = FieldPath::with_root("spec");
        assert_eq!(validate_spec(&root, &random_spec()), Ok(()));
        assert_eq!(validate_spec(&root, &explicit_spec()), Ok(()));

        let file = Spec {
            output_kind: OutputKind::File,
            filepath: Some(PathBuf::from("/tmp/logtap.log")),
            ..random_spec()
        };
        assert_eq!(validate_spec(&root, &file), Ok(()));

        let continuous = Spec {
            interval: 0.0,
            timestamp_format: String::new(),
            ..explicit_spec()
        };
        assert_eq!(validate_spec(&root, &continuous), Ok(()));
    }

    #[test]
    fn random_with_message_is_rejected() {
        let spec = Spec {
            message: "nope".to_string(),
            ..random_spec()
        };
        assert_eq!(failing_path(&spec), "spec.message");
    }

    #[test]
    fn explicit_with_min_size_is_rejected() {
        let spec = Spec {
            min_size: 10,
            ..explicit_spec()
        };
        assert_eq!(failing_path(&spec), "spec.minSize");
    }

    #[test]
    fn filepath_must_match_output_kind() {
        let missing = Spec {
            output_kind: OutputKind::File,
            filepath: None,
            ..random_spec()
        };
        assert_eq!(failing_path(&missing), "spec.filepath");

        let empty = Spec {
            output_kind: OutputKind::File,
            filepath: Some(PathBuf::new()),
            ..random_spec()
        };
        assert_eq!(failing_path(&empty), "spec.filepath");

        let stray = Spec {
            output_kind: OutputKind::Stdout,
            filepath: Some(PathBuf::from("/tmp/x")),
            ..random_spec()
        };
        let err = validate_spec(&FieldPath::with_root("spec"), &stray)
            .expect_err("stray filepath accepted");
        assert_eq!(err.path, "spec.filepath");
        assert_eq!(
            err.to_string(),
            "failed to validate 'spec.filepath': filepath specified for STDOUT output"
        );
    }

    #[test]
    fn content_checks_run_before_output_checks() {
        let spec = Spec {
            output_kind: OutputKind::File,
            filepath: None,
            message: "nope".to_string(),
            ..random_spec()
        };
        assert_eq!(failing_path(&spec), "spec.message");
    }

    #[test]
    fn interval_must_be_finite_and_non_negative() {
        for interval in [-0.5, f64::NAN, f64::INFINITY] {
            let spec = Spec {
                interval,
                ..random_spec()
            };
            assert_eq!(failing_path(&spec), "spec.interval");
        }
    }

    #[test]
    fn malformed_timestamp_format_is_rejected() {
        let spec = Spec {
            timestamp_format: "%Y-%".to_string(),
            ..random_spec()
        };
        assert_eq!(failing_path(&spec), "spec.timestampFormat");

        // Text without specifiers is a valid, if constant, timestamp.
        let literal = Spec {
            timestamp_format: "invalid".to_string(),
            ..random_spec()
        };
        assert_eq!(validate_spec(&FieldPath::new(), &literal), Ok(()));
    }

    #[test]
    fn task_paths_are_rooted() {
        let mut task = Task::new("T", random_spec());
        assert_eq!(validate_task(&FieldPath::with_root("logTask"), &task), Ok(()));

        task.metadata.version = "v0".to_string();
        let err = validate_task(&FieldPath::with_root("logTask"), &task)
            .expect_err("wrong version accepted");
        assert_eq!(err.path, "logTask.metadata.version");

        task.metadata.version = VERSION.to_string();
        task.status.reason = Some("stray".to_string());
        let err = validate_task(&FieldPath::with_root("logTask"), &task)
            .expect_err("stray reason accepted");
        assert_eq!(err.path, "logTask.status.reason");

        task.status.phase = Phase::Failed;
        assert_eq!(validate_task(&FieldPath::with_root("logTask"), &task), Ok(()));
    }

    proptest! {
        #[test]
        fn random_specs_with_sane_fields_validate(
            min_size in 0..(1u64 << 30),
            interval in 0.0..3_600.0f64,
            to_file in any::<bool>(),
        ) {
            let spec = Spec {
                output_kind: if to_file { OutputKind::File } else { OutputKind::Stdout },
                filepath: to_file.then(|| PathBuf::from("/tmp/logtap.log")),
                min_size,
                interval,
                ..random_spec()
            };
            prop_assert_eq!(validate_spec(&FieldPath::new(), &spec), Ok(()));
        }

        #[test]
        fn explicit_specs_with_size_always_fail(min_size in 1..u64::MAX) {
            let spec = Spec { min_size, ..explicit_spec() };
            prop_assert_eq!(failing_path(&spec), "spec.minSize");
        }
    }
}

//! The task runner.
//!
//! A [`Runner`] owns one [`Task`] and drives it from `Idle` through `Running`
//! to one of the terminal phases. Emission is a single loop: wait out the
//! interval, produce a line into the sink, account for it. The loop ends when
//! the stop signal arrives or when anything goes wrong; there are no retries.
//!
//! The status half of the task is shared with whoever calls [`Runner::task`]
//! while the loop runs, typically the status server. Both sides go through
//! one lock and readers always receive a copy.

use std::{
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use chrono::Utc;
use logtap_cadence::Cadence;
use logtap_signal::Watcher;
use metrics::counter;
use tracing::{error, info};

use crate::{
    content::{self, Content},
    field_path::FieldPath,
    sink::{self, Sink},
    task::{Phase, Spec, Task, ValidationError, validate_task},
};

#[derive(thiserror::Error, Debug)]
/// Errors produced by [`Runner`].
pub enum Error {
    /// The task failed validation at construction.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// [`Runner::run`] was called a second time.
    #[error("runner already started")]
    AlreadyStarted,
    /// The sink could not be opened.
    #[error("Sink error: {0}")]
    Sink(#[from] sink::Error),
    /// A line could not be produced or written.
    #[error("Content error: {0}")]
    Content(#[from] content::Error),
}

#[derive(Debug)]
/// Runs a single log generation task.
pub struct Runner {
    name: String,
    task: Mutex<Task>,
    started: AtomicBool,
    metric_labels: Vec<(String, String)>,
}

impl Runner {
    /// Create a new idle `Runner` for `spec`, naming its lines after `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if `spec` or `name` is not acceptable.
    pub fn new(spec: Spec, name: &str) -> Result<Self, Error> {
        let task = Task::new(name, spec);
        validate_task(&FieldPath::new(), &task)?;

        let metric_labels = vec![
            ("component".to_string(), "runner".to_string()),
            ("task".to_string(), name.to_string()),
        ];

        Ok(Self {
            name: name.to_string(),
            task: Mutex::new(task),
            started: AtomicBool::new(false),
            metric_labels,
        })
    }

    /// A copy of the task as it is right now.
    ///
    /// Safe to call at any time, including while [`Runner::run`] is in
    /// progress on another task.
    #[must_use]
    pub fn task(&self) -> Task {
        self.lock().clone()
    }

    /// Run the task until `stop` fires or emission fails.
    ///
    /// A line being written when `stop` fires is completed first. The sink is
    /// closed on return.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyStarted`] if called more than once. Otherwise
    /// an error means the task is now `Failed`, its reason says why.
    pub async fn run(&self, stop: Watcher) -> Result<(), Error> {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::AlreadyStarted);
        }

        let spec = self.lock().spec.clone();

        let mut sink = match Sink::open(&spec).await {
            Ok(sink) => sink,
            Err(err) => {
                self.fail(format!("[{}] failed to open log file: {err}", self.name));
                return Err(err.into());
            }
        };
        let mut content = match Content::from_spec(&spec, &self.name).await {
            Ok(content) => content,
            Err(err) => {
                self.fail(format!("[{}] failed to prepare log: {err}", self.name));
                return Err(err.into());
            }
        };
        let interval = Duration::try_from_secs_f64(spec.interval).unwrap_or(Duration::MAX);
        let mut cadence = Cadence::new(interval);

        self.transition(Phase::Running, None);
        info!(
            "[{name}] writing {content_type} lines to {output_kind} every {interval:?}",
            name = self.name,
            content_type = spec.content_type,
            output_kind = spec.output_kind,
        );

        let shutdown_wait = stop.recv();
        tokio::pin!(shutdown_wait);
        loop {
            tokio::select! {
                biased;

                () = &mut shutdown_wait => {
                    info!("[{name}] shutdown signal received", name = self.name);
                    self.transition(Phase::Stopped, None);
                    return Ok(());
                }
                () = cadence.wait() => {
                    match content.produce(&mut sink).await {
                        Ok(bytes) => self.record(bytes),
                        Err(err) => {
                            self.fail(format!("[{}] failed to write log: {err}", self.name));
                            return Err(err.into());
                        }
                    }
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Task> {
        // The guarded section never panics midway through an update, so a
        // poisoned lock still holds a consistent task.
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, phase: Phase, reason: Option<String>) {
        let mut task = self.lock();
        task.status.phase = phase;
        task.status.reason = reason;
        task.status.phase_timestamp = Utc::now();
    }

    fn fail(&self, reason: String) {
        error!("{reason}");
        self.transition(Phase::Failed, Some(reason));
    }

    fn record(&self, bytes: usize) {
        let bytes = u64::try_from(bytes).unwrap_or(u64::MAX);
        {
            let mut task = self.lock();
            task.status.sent_count = task.status.sent_count.saturating_add(1);
            task.status.sent_bytes = task.status.sent_bytes.saturating_add(bytes);
        }
        counter!("lines_written", &self.metric_labels).increment(1);
        counter!("bytes_written", &self.metric_labels).increment(bytes);
    }
}

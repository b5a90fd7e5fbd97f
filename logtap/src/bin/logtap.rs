use std::{future, io, process, sync::Arc, time::Duration};

use clap::Parser;
use logtap::{
    config::{Args, Config},
    runner::{self, Runner},
    status,
};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use tokio::{runtime::Builder, signal, time::sleep};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, util::SubscriberInitExt};

/// How long blocking work, such as an in-flight random line refresh, may
/// outlive the main task.
const SHUTDOWN_DELAY: Duration = Duration::from_secs(1);

#[derive(thiserror::Error, Debug)]
enum Error {
    #[error(transparent)]
    Runner(#[from] runner::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("Failed to install prometheus recorder: {0}")]
    Prometheus(#[from] BuildError),
    #[error(transparent)]
    Registration(#[from] logtap_signal::RegisterError),
    #[error("Could not join the runner task: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Listens for SIGINT and SIGTERM.
struct Interrupts {
    #[cfg(unix)]
    interrupt: signal::unix::Signal,
    #[cfg(unix)]
    terminate: signal::unix::Signal,
}

impl Interrupts {
    fn new() -> io::Result<Self> {
        #[cfg(unix)]
        {
            use signal::unix::{SignalKind, signal};
            Ok(Self {
                interrupt: signal(SignalKind::interrupt())?,
                terminate: signal(SignalKind::terminate())?,
            })
        }
        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    async fn next(&mut self) {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.interrupt.recv() => info!("received SIGINT"),
                _ = self.terminate.recv() => info!("received SIGTERM"),
            }
        }
        #[cfg(not(unix))]
        {
            if let Err(err) = signal::ctrl_c().await {
                error!("Failed to listen for ctrl-c: {err}");
            }
        }
    }
}

async fn inner_main(config: Config, runner: Arc<Runner>) -> Result<(), Error> {
    let (shutdown_watcher, shutdown_broadcast) = logtap_signal::signal();
    let (stop_watcher, stop_broadcast) = logtap_signal::signal();

    if let Some(addr) = config.prometheus_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .add_global_label("task", config.name.clone())
            .install()?;
        info!("serving prometheus metrics on {addr}");
    }

    // The first interrupt stops the run gracefully, a second one does not
    // wait for that to finish.
    let mut interrupts = Interrupts::new()?;
    tokio::spawn(async move {
        interrupts.next().await;
        stop_broadcast.signal();
        interrupts.next().await;
        warn!("second stop signal received, exiting immediately");
        process::exit(1);
    });

    if let Some(addr) = config.status_addr {
        let server =
            status::Server::new(addr, Some(Arc::clone(&runner)), shutdown_watcher.register()?);
        tokio::spawn(async move {
            if let Err(err) = server.run().await {
                error!("Status server error: {err}");
            }
        });
    }

    let run_watcher = shutdown_watcher.register()?;
    let mut run = tokio::spawn({
        let runner = Arc::clone(&runner);
        async move { runner.run(run_watcher).await }
    });

    // Any watcher left unregistered from `shutdown_watcher` would hold up
    // `signal_and_wait` below.
    drop(shutdown_watcher);

    let duration = config.duration;
    let deadline = async move {
        match duration {
            Some(duration) => sleep(duration).await,
            None => future::pending().await,
        }
    };

    let finished = tokio::select! {
        res = &mut run => Some(res),
        () = stop_watcher.recv() => {
            info!("stop signal received, shutting down");
            None
        }
        () = deadline => {
            info!("duration elapsed, shutting down");
            None
        }
    };

    shutdown_broadcast.signal_and_wait().await;
    let res = match finished {
        Some(res) => res,
        None => run.await,
    };
    let task = runner.task();
    info!(
        "[{name}] wrote {count} lines, {bytes} bytes",
        name = task.name(),
        count = task.status.sent_count,
        bytes = task.status.sent_bytes,
    );
    res?.map_err(Error::from)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_ansi(false)
        .with_writer(io::stderr)
        .finish()
        .init();

    let version = env!("CARGO_PKG_VERSION");
    info!("Starting logtap {version} run.");

    let args = Args::parse();
    let config = match Config::from_args(args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("logtap: {err}");
            process::exit(2);
        }
    };
    let runner = match Runner::new(config.spec.clone(), &config.name) {
        Ok(runner) => Arc::new(runner),
        Err(err) => {
            eprintln!("logtap: {err}");
            process::exit(2);
        }
    };

    let runtime = match Builder::new_multi_thread().enable_io().enable_time().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("logtap: failed to start runtime: {err}");
            process::exit(1);
        }
    };
    let res = runtime.block_on(inner_main(config, runner));
    runtime.shutdown_timeout(SHUTDOWN_DELAY);

    match res {
        Ok(()) => info!("Bye. :)"),
        Err(err) => {
            error!("logtap failed: {err}");
            eprintln!("logtap: {err}");
            process::exit(1);
        }
    }
}

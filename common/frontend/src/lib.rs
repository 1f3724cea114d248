use std::{fs, io, path::Path};

use termcolor::{ColorChoice, StandardStream};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::LevelFilter, prelude::*, registry, EnvFilter};

const RUST_LOG_ENV: &str = "RUST_LOG";

/// Initialise tracing and logging for the logs_path.
///
/// This function will attempt to set up both a file and a terminal logger,
/// falling back to just a terminal logger if the file is unable to be created.
///
/// The logging level is by default set to `INFO`, to change this for any
/// particular crate or module you must use the `RUST_LOG` environment
/// variable.
///
/// For example to see every leg step of the gait coordinator you would need
/// the following in your environment.
/// `RUST_LOG="skitter_agent::walker=trace"`
///
/// more complex tracing can be done by concatenating with a `,` as seperator:
/// `RUST_LOG="skitter_agent::tracker=debug,skitter_common::task=trace,info"`
///
/// By default a few directives are set to `info`, until explicitly
/// overwritten! e.g. `RUST_LOG="skitter_common::task=trace"`
pub fn init<W>(log_path_file: Option<(&Path, &str)>, terminal: W) -> Vec<impl Drop>
where
    W: io::Write + Send + 'static,
{
    // To hold the guards that we create, they will cause the logs to be
    // flushed when they're dropped.
    let mut guards: Vec<WorkerGuard> = vec![];

    // Per tick chatter from the scheduler and trajectories is only shown when
    // asked for by INCLUSION, i.e. `skitter_common::task=trace`.
    let base_exceptions = |env: EnvFilter| {
        [
            "skitter_common::task=info",
            "skitter_common::trajectory=info",
            "skitter_agent::walker::leg=info",
        ]
        .into_iter()
        .filter_map(|d| d.parse().ok())
        .fold(env, |env, d| env.add_directive(d))
        .add_directive(LevelFilter::INFO.into())
    };

    let filter = match std::env::var_os(RUST_LOG_ENV).map(|s| s.into_string()) {
        Some(Ok(env)) => {
            let mut filter = base_exceptions(EnvFilter::new(""));
            for s in env.split(',') {
                match s.parse() {
                    Ok(d) => filter = filter.add_directive(d),
                    Err(err) => eprintln!("WARN ignoring log directive: `{}`: {}", s, err),
                };
            }
            filter
        },
        _ => base_exceptions(EnvFilter::from_env(RUST_LOG_ENV)),
    };

    // Create the terminal writer layer.
    let (non_blocking, stdio_guard) = tracing_appender::non_blocking(terminal);
    guards.push(stdio_guard);
    let registry = registry().with(tracing_subscriber::fmt::layer().with_writer(non_blocking));

    // Try to create the log file's parent folders.
    let mut file_setup = false;
    if let Some((path, file)) = log_path_file {
        match fs::create_dir_all(path) {
            Ok(_) => {
                let file_appender = tracing_appender::rolling::daily(path, file);
                let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);
                guards.push(file_guard);
                file_setup = true;
                registry
                    .with(
                        tracing_subscriber::fmt::layer()
                            .with_ansi(false)
                            .with_writer(non_blocking_file),
                    )
                    .with(filter)
                    .init();
            },
            Err(e) => {
                registry.with(filter).init();
                tracing::error!(
                    ?e,
                    "Failed to create log file!. Falling back to terminal logging only.",
                );
            },
        }
    } else {
        registry.with(filter).init();
    }

    if let (true, Some((path, file))) = (file_setup, log_path_file) {
        info!(?path, ?file, "Setup terminal and file logging.");
    }

    if tracing::level_enabled!(tracing::Level::TRACE) {
        info!("Tracing Level: TRACE");
    } else if tracing::level_enabled!(tracing::Level::DEBUG) {
        info!("Tracing Level: DEBUG");
    };

    // Return the guards
    guards
}

pub fn init_stdout(log_path_file: Option<(&Path, &str)>) -> Vec<impl Drop> {
    init(log_path_file, StandardStream::stdout(ColorChoice::Auto))
}

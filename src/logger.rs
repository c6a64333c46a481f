use crate::error::Result;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, Once, OnceLock, PoisonError};
use tracing::{Subscriber, subscriber::DefaultGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    Layer,
    filter::{LevelFilter, filter_fn},
    fmt,
    prelude::*,
    registry,
};

/// Name of the plain text run log inside the artifact directory.
pub const LOG_FILE: &str = "log.txt";

/// Log file of the active run, written by every thread of the process.
static RUN_FILE: Mutex<Option<RollingFileAppender>> = Mutex::new(None);
/// Held by the active run, so runs of one process are logged one after the other.
static ACTIVE_RUN: Mutex<()> = Mutex::new(());
static GLOBAL_SUBSCRIBER: OnceLock<bool> = OnceLock::new();
static PANIC_HOOK: Once = Once::new();

/// Logger of a single run, writing every event both to the console and to `log.txt`.
///
/// Events of all threads, data loader workers included, reach the log file until the logger
/// is dropped. Installing a second logger blocks until the first one is dropped.
pub struct RunLogger {
    path: PathBuf,
    _fallback: Option<DefaultGuard>,
    _active: MutexGuard<'static, ()>,
}

impl RunLogger {
    /// Starts logging to the console and to [LOG_FILE] in `directory`, appending when the file
    /// already exists.
    pub fn install<P: AsRef<Path>>(directory: P) -> Result<Self> {
        let directory = directory.as_ref();
        let active = ACTIVE_RUN.lock().unwrap_or_else(PoisonError::into_inner);

        let writer = RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(LOG_FILE)
            .build(directory)?;
        *run_file() = Some(writer);

        let global = *GLOBAL_SUBSCRIBER.get_or_init(|| subscriber().try_init().is_ok());
        // Another global subscriber is in place, only this thread reaches the run log.
        let fallback = (!global).then(|| tracing::subscriber::set_default(subscriber()));
        PANIC_HOOK.call_once(install_panic_hook);

        Ok(Self {
            path: directory.join(LOG_FILE),
            _fallback: fallback,
            _active: active,
        })
    }

    /// Location of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLogger {
    fn drop(&mut self) {
        *run_file() = None;
    }
}

fn subscriber() -> impl Subscriber + Send + Sync + 'static {
    let console = fmt::layer()
        .with_target(false)
        .with_writer(io::stdout)
        .with_filter(LevelFilter::INFO);
    let file = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(|| ActiveRunFile)
        .with_filter(LevelFilter::INFO)
        .with_filter(filter_fn(|metadata| {
            // The wgpu crate is logging too much, so we skip `info` level.
            !(metadata.target().starts_with("wgpu") && *metadata.level() >= tracing::Level::INFO)
        }));

    registry().with(console).with(file)
}

fn run_file() -> MutexGuard<'static, Option<RollingFileAppender>> {
    RUN_FILE.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Forwards log lines to the active run, lines emitted between runs are dropped.
struct ActiveRunFile;

impl Write for ActiveRunFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match run_file().as_mut() {
            Some(file) => file.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match run_file().as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

fn install_panic_hook() {
    let hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("PANIC => {info}");
        eprintln!(
            "=== PANIC ===\nA fatal error happened, the run log is in the artifact directory \
             ({LOG_FILE})\n============="
        );
        hook(info);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_written_to_the_run_log() {
        let dir = tempfile::tempdir().unwrap();

        {
            let logger = RunLogger::install(dir.path()).unwrap();
            assert_eq!(logger.path(), dir.path().join(LOG_FILE));

            tracing::info!("Random seed: 1");
            tracing::debug!("below the threshold");
        }

        let content = std::fs::read_to_string(dir.path().join(LOG_FILE)).unwrap();
        assert!(content.contains("Random seed: 1"));
        assert!(!content.contains("below the threshold"));
    }

    #[test]
    fn loggers_are_scoped_to_their_run() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();

        {
            let _logger = RunLogger::install(first.path()).unwrap();
            tracing::info!("first run");
        }
        {
            let _logger = RunLogger::install(second.path()).unwrap();
            tracing::info!("second run");
        }

        let first = std::fs::read_to_string(first.path().join(LOG_FILE)).unwrap();
        let second = std::fs::read_to_string(second.path().join(LOG_FILE)).unwrap();
        assert!(first.contains("first run") && !first.contains("second run"));
        assert!(second.contains("second run") && !second.contains("first run"));
    }

    #[test]
    fn events_of_other_threads_reach_the_run_log() {
        let dir = tempfile::tempdir().unwrap();

        {
            let _logger = RunLogger::install(dir.path()).unwrap();
            std::thread::spawn(|| tracing::info!("decoded by a worker"))
                .join()
                .unwrap();
        }

        let content = std::fs::read_to_string(dir.path().join(LOG_FILE)).unwrap();
        assert!(content.contains("decoded by a worker"));
    }

    #[test]
    fn panics_of_other_threads_reach_the_run_log() {
        let dir = tempfile::tempdir().unwrap();

        {
            let _logger = RunLogger::install(dir.path()).unwrap();
            let result = std::thread::spawn(|| panic!("Failed to load image `cat.png`")).join();
            assert!(result.is_err());
        }

        let content = std::fs::read_to_string(dir.path().join(LOG_FILE)).unwrap();
        assert!(content.contains("PANIC"));
        assert!(content.contains("cat.png"));
    }
}

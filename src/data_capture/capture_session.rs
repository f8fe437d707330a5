use std::io;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, trace, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::configuration::types::CaptureSettings;
use crate::error_handling::types::CaptureError;

use super::framer::PacketFramer;
use super::types::{Feed, PacketRecord};

/// Status chatter the capture tool prints on stderr during normal operation.
const BENIGN_STDERR_MARKERS: [&str; 2] = ["listening", "reportfilename"];

/// Buffers this short carry nothing worth reporting.
const TRIVIAL_STDERR_LEN: usize = 2;

/// Appends stderr `text` to `buffer` line by line, then clears the buffer if it
/// holds tool status output instead of an error.
pub fn absorb_stderr(buffer: &mut String, text: &str) {
    for line in text.lines() {
        buffer.push_str(line);
        buffer.push('\n');
    }
    if buffer.len() <= TRIVIAL_STDERR_LEN
        || BENIGN_STDERR_MARKERS
            .iter()
            .any(|marker| buffer.contains(marker))
    {
        buffer.clear();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cloneable view of a running capture session.
///
/// The orchestrator keeps one per feed to stop and terminate the session,
/// and the sibling feed's consumer uses it to tear this session down.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    feed: Feed,
    child: Arc<Mutex<Child>>,
    stopped: Arc<AtomicBool>,
    error_text: Arc<Mutex<String>>,
}

impl SessionHandle {
    pub fn feed(&self) -> Feed {
        self.feed
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Marks the session as stopped; the record stream ends at its next step.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            debug!("[{}] capture session marked as stopped", self.feed);
        }
    }

    /// Current stderr content that was not recognised as status chatter.
    pub fn error_text(&self) -> String {
        lock(&self.error_text).clone()
    }

    /// Asks the capture process to exit. A process that is already gone is not an error.
    pub fn terminate(&self) {
        let mut child = lock(&self.child);
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!("[{}] capture process already exited ({})", self.feed, status);
            }
            Ok(None) => match request_exit(&mut child) {
                Ok(true) => debug!("[{}] terminate request sent to capture process", self.feed),
                Ok(false) => debug!("[{}] capture process already reaped", self.feed),
                Err(e) => warn!("[{}] failed to terminate capture process: {}", self.feed, e),
            },
            Err(e) => warn!("[{}] failed to query capture process: {}", self.feed, e),
        }
    }
}

/// Sends SIGTERM. `Ok(false)` means there was no process left to signal.
#[cfg(unix)]
fn request_exit(child: &mut Child) -> io::Result<bool> {
    let Some(pid) = child.id() else {
        return Ok(false);
    };
    // SAFETY: kill(2) has no memory effects; pid is our own unreaped child.
    if unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) } == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(false)
    } else {
        Err(err)
    }
}

#[cfg(not(unix))]
fn request_exit(child: &mut Child) -> io::Result<bool> {
    match child.start_kill() {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(false),
        Err(e) => Err(e),
    }
}

/// One capture subprocess for one feed.
///
/// Stdout is framed into [`PacketRecord`]s; stderr is watched in a background
/// task that keeps only text not recognised as status chatter.
pub struct CaptureSession {
    handle: SessionHandle,
    framer: PacketFramer<ChildStdout>,
    stderr_task: JoinHandle<()>,
    cancel: CancellationToken,
}

impl CaptureSession {
    /// Starts the capture tool for `feed`, restricted by `filter`.
    ///
    /// `cancel` aborts any wait for output; it is shared by both feeds.
    ///
    /// Errors
    /// - [`CaptureError::SpawnFailed`] if the tool cannot be executed.
    /// - [`CaptureError::MissingPipe`] if stdout or stderr were not captured.
    pub fn spawn(
        feed: Feed,
        settings: &CaptureSettings,
        filter: &str,
        cancel: CancellationToken,
    ) -> Result<Self, CaptureError> {
        let args = settings.arguments(filter);
        debug!("[{}] spawning {} {:?}", feed, settings.program, args);

        let mut child = Command::new(&settings.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CaptureError::SpawnFailed { feed, source })?;

        let stdout = child.stdout.take().ok_or(CaptureError::MissingPipe {
            feed,
            pipe: "stdout",
        })?;
        let stderr = child.stderr.take().ok_or(CaptureError::MissingPipe {
            feed,
            pipe: "stderr",
        })?;

        let error_text = Arc::new(Mutex::new(String::new()));
        let stderr_task = tokio::spawn(watch_stderr(feed, stderr, Arc::clone(&error_text)));

        debug!("[{}] capture process started (pid {:?})", feed, child.id());
        Ok(Self {
            handle: SessionHandle {
                feed,
                child: Arc::new(Mutex::new(child)),
                stopped: Arc::new(AtomicBool::new(false)),
                error_text,
            },
            framer: PacketFramer::new(feed, stdout, cancel.clone()),
            stderr_task,
            cancel,
        })
    }

    pub fn feed(&self) -> Feed {
        self.handle.feed
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Waits for the next record from the capture tool's stdout.
    ///
    /// Returns `None` once the session is stopped or the output pipe closed;
    /// the session stays stopped from then on.
    pub async fn next_record(&mut self) -> Option<PacketRecord> {
        if self.handle.is_stopped() {
            return None;
        }
        let record = self.framer.next_record().await;
        if record.is_none() {
            debug!("[{}] capture output closed", self.handle.feed);
            self.handle.stop();
        }
        record
    }

    /// Ends the session and returns the leftover unsuppressed stderr text.
    ///
    /// Waits for the stderr watcher to drain unless shutdown was already
    /// requested, in which case whatever has been collected so far is returned.
    pub async fn finish(self) -> String {
        self.handle.stop();
        let mut stderr_task = self.stderr_task;
        tokio::select! {
            biased;
            joined = &mut stderr_task => {
                if let Err(e) = joined {
                    warn!("[{}] stderr watcher failed: {}", self.handle.feed, e);
                }
            }
            _ = self.cancel.cancelled() => {
                trace!("[{}] not waiting for stderr during shutdown", self.handle.feed);
            }
        }
        self.handle.error_text()
    }
}

async fn watch_stderr(feed: Feed, stderr: ChildStderr, error_text: Arc<Mutex<String>>) {
    let mut reader = BufReader::new(stderr);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                trace!("[{}][stderr] {}", feed, text.trim_end());
                absorb_stderr(&mut lock(&error_text), &text);
            }
            Err(e) => {
                warn!("[{}] failed to read capture stderr: {}", feed, e);
                break;
            }
        }
    }
    debug!("[{}] stderr monitoring ended", feed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listening_banner_is_suppressed() {
        let mut buffer = String::new();
        absorb_stderr(&mut buffer, "listening on eth0\n");
        assert!(buffer.is_empty());
    }

    #[test]
    fn report_filename_banner_is_suppressed() {
        let mut buffer = String::new();
        absorb_stderr(&mut buffer, "reportfilename: /dev/null\n");
        assert!(buffer.is_empty());
    }

    #[test]
    fn trivial_output_is_suppressed() {
        let mut buffer = String::new();
        absorb_stderr(&mut buffer, "\n");
        assert!(buffer.is_empty());
        absorb_stderr(&mut buffer, "x");
        assert!(buffer.is_empty());
    }

    #[test]
    fn genuine_errors_accumulate() {
        let mut buffer = String::new();
        absorb_stderr(&mut buffer, "tcpflow: eth0: You don't have permission\n");
        absorb_stderr(&mut buffer, "second line\r\nthird line");
        assert_eq!(
            buffer,
            "tcpflow: eth0: You don't have permission\nsecond line\nthird line\n"
        );
    }

    #[test]
    fn banner_clears_previous_error_text() {
        let mut buffer = String::new();
        absorb_stderr(&mut buffer, "some warning\n");
        assert!(!buffer.is_empty());
        absorb_stderr(&mut buffer, "tcpflow: listening on wlan0\n");
        assert!(buffer.is_empty());
    }

    #[cfg(unix)]
    fn shell(script: &str) -> CaptureSettings {
        CaptureSettings {
            program: String::from("sh"),
            mode_flags: vec![String::from("-c"), script.to_string()],
            null_output: Some(String::from("/dev/null")),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stdout_becomes_records() {
        let _ = env_logger::builder().is_test(true).try_init();
        let settings = shell("printf 'ab\\ncd\\n'; echo 'listening on lo' >&2");
        let mut session =
            CaptureSession::spawn(Feed::Game, &settings, "port 1", CancellationToken::new())
                .expect("spawn sh");

        let mut records = Vec::new();
        while let Some(record) = session.next_record().await {
            records.push(record.as_hex().to_string());
        }
        let handle = session.handle();
        assert!(handle.is_stopped());
        assert_eq!(session.finish().await, "");
        assert!(records.concat().starts_with("6162"));
        assert!(records.iter().all(|r| !r.is_empty()));
        handle.terminate();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn filter_is_passed_as_last_argument() {
        let settings = shell("echo \"$0|$1\" >&2");
        let session = CaptureSession::spawn(
            Feed::Community,
            &settings,
            "tcp and port 6112",
            CancellationToken::new(),
        )
        .expect("spawn sh");
        assert_eq!(session.finish().await, "-X/dev/null|tcp and port 6112\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stderr_error_is_kept() {
        let settings = shell("echo 'tcpflow: bad filter' >&2; exit 1");
        let mut session =
            CaptureSession::spawn(Feed::Game, &settings, "nonsense", CancellationToken::new())
                .expect("spawn sh");
        while session.next_record().await.is_some() {}
        assert_eq!(session.finish().await, "tcpflow: bad filter\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn terminate_tolerates_exited_process() {
        let settings = shell("exit 0");
        let mut session =
            CaptureSession::spawn(Feed::Game, &settings, "x", CancellationToken::new())
                .expect("spawn sh");
        while session.next_record().await.is_some() {}
        let handle = session.handle();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        handle.terminate();
        handle.terminate();
        assert_eq!(session.finish().await, "");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn terminate_ends_running_process() {
        let settings = shell("exec sleep 30");
        let mut session =
            CaptureSession::spawn(Feed::Community, &settings, "x", CancellationToken::new())
                .expect("spawn sh");
        session.handle().terminate();
        let next = tokio::time::timeout(std::time::Duration::from_secs(5), session.next_record())
            .await
            .expect("stdout did not close after terminate");
        assert!(next.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn terminate_sends_sigterm() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("term");
        // The filter argument doubles as the marker path.
        let settings = shell(
            "trap 'kill $pid; echo got-term > \"$1\"; exit 0' TERM; \
             sleep 30 & pid=$!; echo ready; wait $pid",
        );
        let mut session = CaptureSession::spawn(
            Feed::Game,
            &settings,
            marker.to_str().unwrap(),
            CancellationToken::new(),
        )
        .expect("spawn sh");

        // The trap is installed once the script prints.
        let ready = session.next_record().await.expect("ready line");
        assert_eq!(ready.to_bytes(), b"ready");

        session.handle().terminate();
        let next = tokio::time::timeout(std::time::Duration::from_secs(5), session.next_record())
            .await
            .expect("stdout did not close after terminate");
        assert!(next.is_none());
        assert_eq!(std::fs::read_to_string(&marker).unwrap(), "got-term\n");
    }

    #[tokio::test]
    async fn missing_program_fails_to_spawn() {
        let settings = CaptureSettings {
            program: String::from("/nonexistent/capture-tool"),
            ..CaptureSettings::default()
        };
        let err = CaptureSession::spawn(Feed::Game, &settings, "x", CancellationToken::new())
            .err()
            .expect("spawn should fail");
        assert!(matches!(err, CaptureError::SpawnFailed { feed: Feed::Game, .. }));
    }
}

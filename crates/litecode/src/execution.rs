//! Out-of-process execution of documents.
//!
//! Each run is a tokio task that owns one child process. Results travel back
//! to the owner of display state as [`EngineEvent`]s over an unbounded
//! channel; the engine never touches output directly. Starting a run cancels
//! the one in flight, and every event carries its [`RunId`] so receivers can
//! drop anything from a superseded run.

use langcore::RunnerTemplate;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::document::DocumentId;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Success(String),
    ProcessError { output: String, code: Option<i32> },
    Timeout(Duration),
    LaunchError(String),
    Cancelled,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success(_))
    }

    /// Text shown in the output sink.
    pub fn render(&self) -> String {
        match self {
            RunOutcome::Success(output) => output.clone(),
            RunOutcome::ProcessError { output, .. } => format!("Error: {}", output),
            RunOutcome::Timeout(_) => "Error: Execution timed out".to_string(),
            RunOutcome::LaunchError(message) => format!("Unexpected error: {}", message),
            RunOutcome::Cancelled => "Execution cancelled".to_string(),
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// One rendered invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub argv: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
}

impl RunRequest {
    pub fn new(argv: Vec<String>, timeout: Duration) -> Self {
        Self {
            argv,
            cwd: None,
            timeout,
        }
    }

    /// Render `template` for `file`, running from the file's directory.
    pub fn from_template(template: &RunnerTemplate, file: &Path, timeout: Duration) -> Self {
        Self {
            argv: template.render(file),
            cwd: file
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf),
            timeout,
        }
    }

    pub fn command_line(&self) -> String {
        self.argv.join(" ")
    }
}

/// Run one request to completion, killing the child's whole process group
/// on timeout or cancel. Stdout and stderr are interleaved into one text in
/// arrival order.
pub async fn execute(request: &RunRequest, cancel: CancellationToken) -> RunOutcome {
    let Some((program, args)) = request.argv.split_first() else {
        return RunOutcome::LaunchError("empty command".to_string());
    };

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = &request.cwd {
        command.current_dir(cwd);
    }

    // Runners such as `sh -c "gcc .. && ./a.out"` leave the program as a
    // grandchild; its own group lets a timeout reach it.
    #[cfg(unix)]
    command.process_group(0);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => return RunOutcome::LaunchError(format!("{}: {}", program, e)),
    };
    let group = child.id();
    log::debug!("Spawned `{}`", request.command_line());

    let deadline = Instant::now() + request.timeout;
    let mut capture = tokio::spawn(capture_output(child.stdout.take(), child.stderr.take()));

    let status = tokio::select! {
        status = child.wait() => status,
        _ = tokio::time::sleep_until(deadline) => {
            kill(&mut child, group).await;
            capture.abort();
            return RunOutcome::Timeout(request.timeout);
        }
        _ = cancel.cancelled() => {
            kill(&mut child, group).await;
            capture.abort();
            return RunOutcome::Cancelled;
        }
    };

    let status = match status {
        Ok(status) => status,
        Err(e) => {
            kill_group(group);
            capture.abort();
            return RunOutcome::LaunchError(e.to_string());
        }
    };

    // Descendants may still hold the pipes open after the child exits.
    let output = tokio::select! {
        joined = &mut capture => joined.unwrap_or_default(),
        _ = tokio::time::sleep_until(deadline) => {
            kill_group(group);
            capture.abort();
            return RunOutcome::Timeout(request.timeout);
        }
        _ = cancel.cancelled() => {
            kill_group(group);
            capture.abort();
            return RunOutcome::Cancelled;
        }
    };
    let output = String::from_utf8_lossy(&output).into_owned();

    if status.success() {
        RunOutcome::Success(output)
    } else {
        RunOutcome::ProcessError {
            output,
            code: status.code(),
        }
    }
}

async fn kill(child: &mut Child, group: Option<u32>) {
    kill_group(group);
    if let Err(e) = child.kill().await {
        log::warn!("Failed to kill child process: {}", e);
    }
}

/// SIGKILL every process still in the run's group.
#[cfg(unix)]
fn kill_group(group: Option<u32>) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pgid) = group.and_then(|id| i32::try_from(id).ok()) else {
        return;
    };
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => log::warn!("Failed to kill process group {}: {}", pgid, e),
    }
}

#[cfg(not(unix))]
fn kill_group(_group: Option<u32>) {}

async fn read_chunk<R: AsyncRead + Unpin>(reader: &mut Option<R>, buf: &mut [u8]) -> Option<usize> {
    let stream = reader.as_mut()?;
    match stream.read(buf).await {
        Ok(0) => None,
        Ok(n) => Some(n),
        Err(e) => {
            log::debug!("Output stream closed with error: {}", e);
            None
        }
    }
}

async fn capture_output<O, E>(mut stdout: Option<O>, mut stderr: Option<E>) -> Vec<u8>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut output = Vec::new();
    let mut out_buf = [0u8; 4096];
    let mut err_buf = [0u8; 4096];

    loop {
        tokio::select! {
            read = read_chunk(&mut stdout, &mut out_buf), if stdout.is_some() => match read {
                Some(n) => output.extend_from_slice(&out_buf[..n]),
                None => stdout = None,
            },
            read = read_chunk(&mut stderr, &mut err_buf), if stderr.is_some() => match read {
                Some(n) => output.extend_from_slice(&err_buf[..n]),
                None => stderr = None,
            },
            else => break,
        }
    }
    output
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    RunStarted {
        run: RunId,
        document: DocumentId,
        command: String,
    },
    Output {
        run: RunId,
        text: String,
    },
    RunFinished {
        run: RunId,
        outcome: RunOutcome,
    },
}

impl EngineEvent {
    pub fn run(&self) -> RunId {
        match self {
            EngineEvent::RunStarted { run, .. }
            | EngineEvent::Output { run, .. }
            | EngineEvent::RunFinished { run, .. } => *run,
        }
    }
}

struct InFlight {
    run: RunId,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns the single in-flight run and the sending half of the event channel.
pub struct ExecutionEngine {
    events: mpsc::UnboundedSender<EngineEvent>,
    next_run: u64,
    current: Option<InFlight>,
}

impl ExecutionEngine {
    pub fn new(events: mpsc::UnboundedSender<EngineEvent>) -> Self {
        Self {
            events,
            next_run: 1,
            current: None,
        }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    fn begin(&mut self, document: DocumentId, command: String) -> RunId {
        self.cancel();
        let run = RunId(self.next_run);
        self.next_run += 1;
        self.send(EngineEvent::RunStarted {
            run,
            document,
            command,
        });
        run
    }

    fn send(&self, event: EngineEvent) {
        if self.events.send(event).is_err() {
            log::debug!("Engine event dropped, receiver is gone");
        }
    }

    /// Start `request` on a background task. Must be called from within a
    /// tokio runtime.
    pub fn spawn(&mut self, document: DocumentId, request: RunRequest) -> RunId {
        let run = self.begin(document, request.command_line());
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let events = self.events.clone();

        let task = tokio::spawn(async move {
            let outcome = execute(&request, token).await;
            log::info!("{} finished: {}", run, outcome_kind(&outcome));
            let _ = events.send(EngineEvent::RunFinished { run, outcome });
        });

        self.current = Some(InFlight { run, cancel, task });
        run
    }

    /// Report a finished pseudo-run made of plain lines, such as the debug
    /// trace or the preview address.
    pub fn report(&mut self, document: DocumentId, label: &str, lines: &[String]) -> RunId {
        let run = self.begin(document, label.to_string());
        for line in lines {
            self.send(EngineEvent::Output {
                run,
                text: format!("{}\n", line),
            });
        }
        self.send(EngineEvent::RunFinished {
            run,
            outcome: RunOutcome::Success(String::new()),
        });
        run
    }

    /// Kill the in-flight subprocess, if any. Its run finishes as `Cancelled`.
    pub fn cancel(&mut self) -> bool {
        match self.current.take() {
            Some(in_flight) if !in_flight.task.is_finished() => {
                log::info!("Cancelling {}", in_flight.run);
                in_flight.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|in_flight| !in_flight.task.is_finished())
    }

    pub fn current_run(&self) -> Option<RunId> {
        self.current.as_ref().map(|in_flight| in_flight.run)
    }
}

impl Drop for ExecutionEngine {
    fn drop(&mut self) {
        if let Some(in_flight) = self.current.take() {
            in_flight.cancel.cancel();
        }
    }
}

fn outcome_kind(outcome: &RunOutcome) -> &'static str {
    match outcome {
        RunOutcome::Success(_) => "success",
        RunOutcome::ProcessError { .. } => "process error",
        RunOutcome::Timeout(_) => "timeout",
        RunOutcome::LaunchError(_) => "launch error",
        RunOutcome::Cancelled => "cancelled",
    }
}

/// Lines of the breakpoint walk-through shown by the debug command.
pub fn debug_trace(breakpoints: impl IntoIterator<Item = usize>) -> Vec<String> {
    let mut lines: Vec<usize> = breakpoints.into_iter().map(|line| line + 1).collect();
    lines.sort_unstable();
    vec![
        "Debugging started...".to_string(),
        format!("Breakpoints at lines: {:?}", lines),
        "Debugging simulation complete.".to_string(),
    ]
}

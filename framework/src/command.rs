use crate::listener::ListenerHandle;
use crate::session::{FrameworkError, FrameworkResult, RunOptions, SignalSender, TestFramework};
use crate::types::{RunToken, Signal, TestEvent};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{debug, warn};

/// Runs an external program per target and reads its test events from stdout.
///
/// The target is passed as the last argument. Each non-blank stdout line must
/// be one JSON-encoded [`TestEvent`]. A malformed line or a non-zero exit is
/// reported to the coordinator as an out-of-band error. The program is
/// killed once the coordinator stops waiting for the run.
#[derive(Debug, Clone)]
pub struct CommandFramework {
    program: String,
    args: Vec<String>,
}

impl CommandFramework {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl TestFramework for CommandFramework {
    async fn start_run(
        &self,
        listener: ListenerHandle,
        target: &str,
        options: &RunOptions,
        inbox: SignalSender,
    ) -> FrameworkResult<RunToken> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(target)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| FrameworkError::Spawn {
                command: self.program.clone(),
                source,
            })?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(FrameworkError::Rejected {
                message: "test command output was not captured".to_string(),
            });
        };

        let token = RunToken::new();
        let _ = inbox.send(Signal::Started(token));

        tokio::spawn(stream_events(
            child,
            stdout,
            stderr,
            listener,
            inbox,
            options.verbose,
        ));

        Ok(token)
    }

    fn framework_name(&self) -> &'static str {
        "command"
    }
}

async fn stream_events(
    mut child: Child,
    stdout: ChildStdout,
    mut stderr: ChildStderr,
    listener: ListenerHandle,
    inbox: SignalSender,
    verbose: bool,
) {
    let stderr_task = tokio::spawn(async move {
        let mut buf = String::new();
        let _ = stderr.read_to_string(&mut buf).await;
        buf
    });

    let mut lines = BufReader::new(stdout).lines();
    let mut line_number = 0usize;

    loop {
        let next = tokio::select! {
            line = lines.next_line() => Some(line),
            _ = inbox.closed() => None,
        };
        let Some(next) = next else {
            abandon(&mut child).await;
            return;
        };

        let line = match next {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                let _ = child.kill().await;
                let _ = inbox.send(Signal::Error(format!("failed to read test output: {}", e)));
                return;
            }
        };
        line_number += 1;

        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<TestEvent>(&line) {
            Ok(event) => {
                if verbose {
                    debug!("Test event: {:?}", event);
                }
                if !listener.event(event) {
                    abandon(&mut child).await;
                    return;
                }
            }
            Err(e) => {
                warn!("Malformed test event on line {}: {}", line_number, e);
                let _ = child.kill().await;
                let _ = inbox.send(Signal::Error(format!(
                    "malformed test event on line {}: {}",
                    line_number, e
                )));
                return;
            }
        }
    }

    let waited = tokio::select! {
        status = child.wait() => Some(status),
        _ = inbox.closed() => None,
    };
    let Some(waited) = waited else {
        abandon(&mut child).await;
        return;
    };

    let status = match waited {
        Ok(status) => status,
        Err(e) => {
            let _ = inbox.send(Signal::Error(format!("failed to wait for test command: {}", e)));
            return;
        }
    };

    if status.success() {
        if !listener.finish() {
            debug!("Listener exited before the test command finished");
        }
        return;
    }

    let stderr = stderr_task.await.unwrap_or_default();
    let mut reason = format!("test command exited with {}", status);
    if let Some(last) = stderr.lines().rev().find(|l| !l.trim().is_empty()) {
        reason.push_str(": ");
        reason.push_str(last.trim());
    }
    let _ = inbox.send(Signal::Error(reason));
}

/// The coordinator stopped waiting, so nobody will read what the program
/// reports.
async fn abandon(child: &mut Child) {
    debug!("Run abandoned, stopping test command");
    if let Err(e) = child.kill().await {
        warn!("Failed to stop test command: {}", e);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::listener::Listener;
    use crate::types::{PassedTest, ResultBundle};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    fn shell(script: &str) -> CommandFramework {
        // `sh -c SCRIPT NAME TARGET` leaves the target in $1.
        CommandFramework::new("sh").with_args(["-c", script, "sh"])
    }

    #[tokio::test]
    async fn test_streams_events_from_stdout() {
        let framework = shell(r#"echo '{"event":"passed","line":3}'; echo; echo "{\"event\":\"passed\",\"line\":$1}""#);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let listener = Listener::spawn(tx.clone());

        let token = framework
            .start_run(listener.clone(), "12", &RunOptions::default(), tx)
            .await
            .unwrap();
        assert_eq!(rx.recv().await, Some(Signal::Started(token)));
        listener.start(token);

        let expected = ResultBundle {
            successful: vec![PassedTest::new(3), PassedTest::new(12)],
            failed: vec![],
            cancelled: vec![],
        };
        assert_eq!(rx.recv().await, Some(Signal::Result(token, expected)));
    }

    #[tokio::test]
    async fn test_malformed_line_is_out_of_band_error() {
        let framework = shell("echo 'not json'");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let listener = Listener::spawn(tx.clone());

        let token = framework
            .start_run(listener, "sample", &RunOptions::default(), tx)
            .await
            .unwrap();
        assert_eq!(rx.recv().await, Some(Signal::Started(token)));

        match rx.recv().await {
            Some(Signal::Error(reason)) => assert!(reason.contains("line 1"), "{}", reason),
            other => panic!("unexpected signal: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_out_of_band_error() {
        let framework = shell("echo 'module not loadable' >&2; exit 3");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let listener = Listener::spawn(tx.clone());

        framework
            .start_run(listener, "sample", &RunOptions::default(), tx)
            .await
            .unwrap();
        assert!(matches!(rx.recv().await, Some(Signal::Started(_))));

        match rx.recv().await {
            Some(Signal::Error(reason)) => {
                assert!(reason.contains("module not loadable"), "{}", reason)
            }
            other => panic!("unexpected signal: {:?}", other),
        }
    }

    fn is_alive(pid: &str) -> bool {
        std::process::Command::new("kill")
            .args(["-0", pid])
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    async fn read_pid(path: &std::path::Path) -> String {
        loop {
            if let Ok(pid) = tokio::fs::read_to_string(path).await {
                if !pid.trim().is_empty() {
                    return pid.trim().to_string();
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_program_is_killed_once_inbox_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let framework = shell(r#"echo $$ > "$1"; exec sleep 30"#);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let listener = Listener::spawn(tx.clone());

        framework
            .start_run(listener, pid_file.to_str().unwrap(), &RunOptions::default(), tx)
            .await
            .unwrap();
        assert!(matches!(rx.recv().await, Some(Signal::Started(_))));

        let pid = timeout(Duration::from_secs(5), read_pid(&pid_file))
            .await
            .unwrap();
        assert!(is_alive(&pid));
        drop(rx);

        let stopped = timeout(Duration::from_secs(5), async {
            while is_alive(&pid) {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        assert!(stopped.is_ok(), "test command {} still running", pid);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_rejection() {
        let framework = CommandFramework::new("/nonexistent/test-command");
        let (tx, _rx) = mpsc::unbounded_channel();
        let listener = Listener::spawn(tx.clone());

        let result = framework
            .start_run(listener, "sample", &RunOptions::default(), tx)
            .await;
        assert!(matches!(result, Err(FrameworkError::Spawn { .. })));
        assert_eq!(framework.program(), "/nonexistent/test-command");
    }
}

//! Subprocess transport.
//!
//! Spawns the wrapper program once per batch, writes the request JSON to its
//! stdin, and reads one response JSON from its stdout under a bounded wait.
//! A backend that overruns the wait is killed and reported as a timeout —
//! callers must never block forever on a wedged evaluator.

use std::io::Read;
use std::io::Write;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use gridcheck_protocol::{EvalRequest, EvalResponse};

use crate::{BackendError, CalcBackend};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Blocking subprocess-per-batch backend.
#[derive(Debug, Clone)]
pub struct SubprocessBackend {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl SubprocessBackend {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn wait_bounded(&self, child: &mut Child) -> Result<std::process::ExitStatus, BackendError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(BackendError::Timeout(self.timeout.as_secs()));
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => return Err(BackendError::Io(e.to_string())),
            }
        }
    }
}

impl CalcBackend for SubprocessBackend {
    fn evaluate(&self, request: &EvalRequest) -> Result<EvalResponse, BackendError> {
        let payload =
            serde_json::to_string(request).map_err(|e| BackendError::Parse(e.to_string()))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BackendError::Spawn(e.to_string()))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| BackendError::Io("backend stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BackendError::Io("backend stdout unavailable".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| BackendError::Io("backend stderr unavailable".into()))?;

        // Writer/reader threads keep the pipes draining while we watch the
        // child; a full pipe buffer would otherwise deadlock both sides.
        thread::spawn(move || {
            let _ = stdin.write_all(payload.as_bytes());
            // stdin drops here, closing the pipe so the backend sees EOF.
        });

        let (out_tx, out_rx) = mpsc::channel();
        thread::spawn(move || {
            let mut stdout = stdout;
            let mut buf = String::new();
            let result = stdout.read_to_string(&mut buf).map(|_| buf);
            let _ = out_tx.send(result);
        });

        let (err_tx, err_rx) = mpsc::channel();
        thread::spawn(move || {
            let mut stderr = stderr;
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf);
            let _ = err_tx.send(buf);
        });

        let status = self.wait_bounded(&mut child)?;

        let stdout_text = out_rx
            .recv_timeout(Duration::from_secs(5))
            .map_err(|_| BackendError::Io("backend stdout reader stalled".into()))?
            .map_err(|e| BackendError::Io(e.to_string()))?;

        if !status.success() {
            let stderr_text = err_rx.recv_timeout(Duration::from_secs(1)).unwrap_or_default();
            return Err(BackendError::Io(format!(
                "backend exited with {}: {}",
                status,
                stderr_text.trim()
            )));
        }

        serde_json::from_str(&stdout_text).map_err(|e| BackendError::Parse(e.to_string()))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use gridcheck_protocol::QueryOutcome;

    fn request() -> EvalRequest {
        EvalRequest {
            sheets: vec![],
            queries: vec![],
        }
    }

    fn sh(script: &str, timeout: Duration) -> SubprocessBackend {
        SubprocessBackend::new("/bin/sh", vec!["-c".into(), script.into()], timeout)
    }

    #[test]
    fn test_round_trip_through_subprocess() {
        let backend = sh(
            r#"cat >/dev/null; printf '{"success":true,"results":[{"cell_ref":"S!A1","type":"number","value":15}]}'"#,
            Duration::from_secs(5),
        );
        let response = backend.evaluate(&request()).unwrap();
        assert!(response.success);
        let results = response.results.unwrap();
        assert_eq!(results[0].outcome, QueryOutcome::Number { value: 15.0 });
    }

    #[test]
    fn test_timeout_kills_backend() {
        let backend = sh("sleep 30", Duration::from_millis(200));
        match backend.evaluate(&request()) {
            Err(BackendError::Timeout(_)) => {}
            other => panic!("expected timeout, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_nonzero_exit_is_io_error() {
        let backend = sh("cat >/dev/null; echo oops >&2; exit 3", Duration::from_secs(5));
        match backend.evaluate(&request()) {
            Err(BackendError::Io(msg)) => assert!(msg.contains("oops"), "{msg}"),
            other => panic!("expected io error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_garbage_output_is_parse_error() {
        let backend = sh("cat >/dev/null; echo not-json", Duration::from_secs(5));
        match backend.evaluate(&request()) {
            Err(BackendError::Parse(_)) => {}
            other => panic!("expected parse error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let backend = SubprocessBackend::new(
            "/nonexistent/calc-wrapper",
            vec![],
            Duration::from_secs(1),
        );
        match backend.evaluate(&request()) {
            Err(BackendError::Spawn(_)) => {}
            other => panic!("expected spawn error, got {:?}", other.map(|_| ())),
        }
    }
}

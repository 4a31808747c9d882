//! LLM worker boundary
//!
//! Synthesis delegates all prose generation to an external worker behind
//! the [`LlmWorker`] trait. The default backend runs a subprocess: prompt
//! on standard input, markdown on standard output, a hard deadline, and a
//! kill on expiry. Exit code ≠ 0 or empty output counts as a retryable
//! failure. The model selection string is passed through unchanged.

use crate::config::LlmConfig;
use crate::error::{Error, Result};
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use wait_timeout::ChildExt;

/// Completion interface all synthesizers use.
pub trait LlmWorker: Send + Sync {
    fn invoke(&self, prompt: &str) -> Result<String>;
}

/// Subprocess-backed worker.
pub struct CommandWorker {
    command: String,
    args: Vec<String>,
    model: String,
    timeout: Duration,
}

impl CommandWorker {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
        }
    }
}

impl LlmWorker for CommandWorker {
    fn invoke(&self, prompt: &str) -> Result<String> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .args(["--model", &self.model])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::LlmUnavailable(format!("failed to start {}: {}", self.command, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .map_err(|e| Error::LlmUnavailable(format!("failed to write prompt: {}", e)))?;
        }

        // Drain stdout on a separate thread so a chatty worker cannot fill
        // the pipe and deadlock against wait_timeout.
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::LlmUnavailable("worker stdout not captured".to_string()))?;
        let reader = std::thread::spawn(move || {
            let mut output = String::new();
            let _ = stdout.read_to_string(&mut output);
            output
        });

        let status = child
            .wait_timeout(self.timeout)
            .map_err(|e| Error::LlmUnavailable(format!("failed to wait for worker: {}", e)))?;

        let status = match status {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::LlmTimeout(self.timeout.as_secs()));
            }
        };

        let output = reader
            .join()
            .map_err(|_| Error::LlmUnavailable("worker output reader panicked".to_string()))?;

        if !status.success() {
            return Err(Error::LlmUnavailable(format!(
                "worker exited with status {}",
                status
            )));
        }
        if output.trim().is_empty() {
            return Err(Error::LlmUnavailable("worker returned empty output".to_string()));
        }

        Ok(output)
    }
}

/// First retry delay; doubles per attempt.
const INITIAL_BACKOFF: Duration = Duration::from_secs(2);

/// Invoke with a bounded retry budget and exponential backoff.
///
/// Only retryable failures (timeouts, unavailable worker, empty output)
/// consume further attempts; anything else propagates immediately.
/// Cancellation is honored between retries, never mid-invocation.
pub fn invoke_with_retry(
    worker: &dyn LlmWorker,
    prompt: &str,
    attempts: u32,
    cancel: &AtomicBool,
) -> Result<String> {
    let attempts = attempts.max(1);
    let mut delay = INITIAL_BACKOFF;
    let mut last_error = None;

    for attempt in 0..attempts {
        if cancel.load(Ordering::Relaxed) {
            return Err(Error::LlmUnavailable("cancelled".to_string()));
        }
        if attempt > 0 {
            tracing::debug!(attempt = attempt + 1, delay_secs = delay.as_secs(), "Retrying LLM call");
            std::thread::sleep(delay);
            delay *= 2;
        }

        match worker.invoke(prompt) {
            Ok(output) if output.trim().is_empty() => {
                last_error = Some(Error::LlmUnavailable("worker returned empty output".to_string()));
            }
            Ok(output) => return Ok(output),
            Err(e) if e.is_retryable() => {
                tracing::warn!(error = %e, "LLM call failed");
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or_else(|| Error::LlmUnavailable("retries exhausted".to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct FlakyWorker {
        calls: AtomicU32,
        fail_first: u32,
    }

    impl LlmWorker for FlakyWorker {
        fn invoke(&self, _prompt: &str) -> Result<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                Err(Error::LlmTimeout(1))
            } else {
                Ok("# Entry\n\nbody".to_string())
            }
        }
    }

    #[test]
    fn retry_recovers_from_transient_failure() {
        let worker = FlakyWorker {
            calls: AtomicU32::new(0),
            fail_first: 1,
        };
        let cancel = AtomicBool::new(false);
        let output = invoke_with_retry(&worker, "p", 3, &cancel).unwrap();
        assert!(output.contains("# Entry"));
        assert_eq!(worker.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn budget_exhaustion_returns_last_error() {
        let worker = FlakyWorker {
            calls: AtomicU32::new(0),
            fail_first: 10,
        };
        let cancel = AtomicBool::new(false);
        // One attempt only, so no backoff sleep in tests.
        let result = invoke_with_retry(&worker, "p", 1, &cancel);
        assert!(matches!(result, Err(Error::LlmTimeout(_))));
    }

    #[test]
    fn cancellation_preempts_attempts() {
        let worker = FlakyWorker {
            calls: AtomicU32::new(0),
            fail_first: 0,
        };
        let cancel = AtomicBool::new(true);
        assert!(invoke_with_retry(&worker, "p", 3, &cancel).is_err());
        assert_eq!(worker.calls.load(Ordering::SeqCst), 0);
    }

    struct EmptyWorker;

    impl LlmWorker for EmptyWorker {
        fn invoke(&self, _prompt: &str) -> Result<String> {
            Ok("   \n".to_string())
        }
    }

    #[test]
    fn empty_output_is_a_failure() {
        let cancel = AtomicBool::new(false);
        let result = invoke_with_retry(&EmptyWorker, "p", 1, &cancel);
        assert!(matches!(result, Err(Error::LlmUnavailable(_))));
    }

    #[cfg(unix)]
    #[test]
    fn command_worker_round_trips_stdin_to_stdout() {
        // `sh -c cat` echoes the prompt back; the trailing --model flag
        // lands in $0/$1 and is ignored by the script.
        let worker = CommandWorker {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), "cat".to_string()],
            model: "ignored".to_string(),
            timeout: Duration::from_secs(5),
        };
        let output = worker.invoke("hello worker").unwrap();
        assert!(output.contains("hello worker"));
    }

    #[cfg(unix)]
    #[test]
    fn command_worker_nonzero_exit_is_unavailable() {
        let worker = CommandWorker {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), "cat >/dev/null; exit 3".to_string()],
            model: "ignored".to_string(),
            timeout: Duration::from_secs(5),
        };
        assert!(matches!(
            worker.invoke("prompt"),
            Err(Error::LlmUnavailable(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn command_worker_kills_on_timeout() {
        let worker = CommandWorker {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), "sleep 30".to_string()],
            model: "ignored".to_string(),
            timeout: Duration::from_millis(200),
        };
        assert!(matches!(worker.invoke("prompt"), Err(Error::LlmTimeout(_))));
    }
}

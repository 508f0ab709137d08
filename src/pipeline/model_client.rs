use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use thiserror::Error;
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("{0}")]
    Transport(String),
    #[error("cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub prompt: &'a str,
    pub format_instructions: &'a str,
    pub corrective_context: Option<&'a str>,
}

impl GenerationRequest<'_> {
    /// Single text payload for clients that take one prompt string.
    pub fn render(&self) -> String {
        let mut rendered = format!("{}\n\n{}", self.format_instructions, self.prompt);
        if let Some(context) = self.corrective_context {
            rendered.push_str("\n\n");
            rendered.push_str(context);
        }
        rendered
    }
}

/// The generative model boundary. Calls are not idempotent and identical
/// requests may produce different text.
pub trait ModelClient: Send + Sync {
    fn generate(&self, request: &GenerationRequest<'_>) -> Result<String, ModelError>;
}

/// Runs an external command per request: the rendered request goes to stdin
/// and the response is read from stdout.
#[derive(Debug, Clone)]
pub struct CommandModel {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandModel {
    pub fn from_command_line(command_line: &str, timeout: Option<Duration>) -> Result<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let Some(program) = parts.next() else {
            bail!("model command must not be empty");
        };
        Ok(Self {
            program,
            args: parts.collect(),
            timeout,
        })
    }

    pub fn describe(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<&str>>()
            .join(" ")
    }
}

impl ModelClient for CommandModel {
    fn generate(&self, request: &GenerationRequest<'_>) -> Result<String, ModelError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Own process group, so a timeout also reaches commands a wrapper
        // shell started.
        #[cfg(unix)]
        std::os::unix::process::CommandExt::process_group(&mut command, 0);

        let mut child = command.spawn().map_err(|err| {
            ModelError::Transport(format!("failed to spawn {}: {err}", self.program))
        })?;

        let payload = request.render();
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // Detached so a cancelled call never waits for pipes that a
        // surviving grandchild still holds open.
        let writer = thread::spawn(move || match stdin {
            Some(mut stdin) => stdin.write_all(payload.as_bytes()),
            None => Ok(()),
        });
        let reader = thread::spawn(move || read_pipe(stdout));
        let error_reader = thread::spawn(move || read_pipe(stderr));

        let status = wait_with_deadline(&mut child, self.timeout)?;

        let written = writer.join().unwrap_or(Ok(()));
        let response = reader
            .join()
            .map_err(|_| ModelError::Transport("model output reader panicked".to_string()))?
            .map_err(|err| {
                ModelError::Transport(format!("failed to read {} output: {err}", self.program))
            })?;
        let diagnostics = error_reader.join().ok().and_then(Result::ok).unwrap_or_default();

        if !status.success() {
            return Err(ModelError::Transport(format!(
                "{} exited with {}: {}",
                self.program,
                status,
                diagnostics.trim()
            )));
        }
        if let Err(err) = written {
            debug!(error = %err, program = %self.program, "model command closed stdin early");
        }
        Ok(response)
    }
}

fn read_pipe(pipe: Option<impl Read>) -> std::io::Result<String> {
    let mut buffer = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buffer)?;
    }
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

fn wait_with_deadline(child: &mut Child, timeout: Option<Duration>) -> Result<ExitStatus, ModelError> {
    let Some(timeout) = timeout else {
        return child
            .wait()
            .map_err(|err| ModelError::Transport(format!("failed to wait for model command: {err}")));
    };

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) if Instant::now() >= deadline => {
                kill_process_tree(child);
                let _ = child.wait();
                return Err(ModelError::Cancelled);
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(err) => {
                return Err(ModelError::Transport(format!(
                    "failed to poll model command: {err}"
                )));
            }
        }
    }
}

#[cfg(unix)]
fn kill_process_tree(child: &mut Child) {
    let group = format!("-{}", child.id());
    let killed = Command::new("kill")
        .args(["-KILL", "--", &group])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|status| status.success());
    if !killed {
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn kill_process_tree(child: &mut Child) {
    let _ = child.kill();
}

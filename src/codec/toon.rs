use std::io::Write;
use std::process::{Command, Stdio};
use std::thread;

use anyhow::{Result, bail};

use super::{Codec, CodecError, Format};
use crate::document::Node;

/// TOON codec backed by an external converter that speaks JSON on one side.
///
/// The converter is invoked as `<program> [args..] --decode` (TOON on stdin,
/// JSON on stdout) and `<program> [args..] --encode` (JSON on stdin, TOON on
/// stdout).
#[derive(Debug, Clone)]
pub struct ToonCodec {
    program: String,
    args: Vec<String>,
}

impl ToonCodec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_command_line(command_line: &str) -> Result<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let Some(program) = parts.next() else {
            bail!("TOON command must not be empty");
        };
        Ok(Self::new(program, parts.collect()))
    }

    fn run(&self, mode: &str, input: &str) -> Result<String, CodecError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(mode)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| CodecError::Unavailable {
                program: self.program.clone(),
                detail: err.to_string(),
            })?;

        let stdin = child.stdin.take();
        let writer = thread::spawn({
            let input = input.to_string();
            move || match stdin {
                Some(mut stdin) => stdin.write_all(input.as_bytes()),
                None => Ok(()),
            }
        });

        let output = child.wait_with_output().map_err(|err| self.process_error(err))?;
        let write_result = writer
            .join()
            .unwrap_or_else(|_| Err(std::io::Error::other("stdin writer panicked")));

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CodecError::Process {
                program: self.program.clone(),
                detail: format!("exit status {}: {}", output.status, stderr.trim()),
            });
        }
        write_result.map_err(|err| self.process_error(err))?;

        String::from_utf8(output.stdout).map_err(|err| CodecError::Process {
            program: self.program.clone(),
            detail: format!("output is not UTF-8: {err}"),
        })
    }

    fn process_error(&self, err: std::io::Error) -> CodecError {
        CodecError::Process {
            program: self.program.clone(),
            detail: err.to_string(),
        }
    }
}

impl Codec for ToonCodec {
    fn format(&self) -> Format {
        Format::Toon
    }

    fn encode(&self, document: &Node) -> Result<String, CodecError> {
        let json = serde_json::to_string(document).map_err(|err| CodecError::Encode {
            format: Format::Toon,
            detail: err.to_string(),
        })?;
        let encoded = self.run("--encode", &json)?;
        Ok(encoded.trim_end().to_string())
    }

    fn decode(&self, text: &str) -> Result<Node, CodecError> {
        let json = match self.run("--decode", text) {
            Ok(json) => json,
            // The converter exits non-zero on malformed TOON.
            Err(CodecError::Process { detail, .. }) => {
                return Err(CodecError::Syntax {
                    format: Format::Toon,
                    detail,
                });
            }
            Err(err) => return Err(err),
        };
        serde_json::from_str(&json).map_err(|err| CodecError::Syntax {
            format: Format::Toon,
            detail: format!("converter produced invalid JSON: {err}"),
        })
    }

    fn check_available(&self) -> Result<(), CodecError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg("--version")
            .output()
            .map_err(|err| CodecError::Unavailable {
                program: self.program.clone(),
                detail: err.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CodecError::Unavailable {
                program: self.program.clone(),
                detail: format!("--version exited with {}: {}", output.status, stderr.trim()),
            });
        }
        Ok(())
    }
}

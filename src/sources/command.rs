//! Generic external command source.

use chrono::{DateTime, Utc};
use serde_json::{json, Value as JsonValue};
use std::process::{Command, Stdio};
use tracing::debug;

use crate::collector::Source;
use crate::document::{base_information, hostname, Document};
use crate::error::CollectorError;

/// Captured result of one command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub pid: u32,
    pub stdout: String,
    pub stderr: String,
}

/// Runs `program` with `args` and waits for both output streams to close.
///
/// There is no timeout: a command that never exits blocks the caller.
pub fn run(program: &str, args: &[String]) -> Result<CommandOutput, CollectorError> {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| CollectorError::CommandSpawn {
            command: program.to_string(),
            source,
        })?;

    let pid = child.id();
    let output = child
        .wait_with_output()
        .map_err(|source| CollectorError::CommandIo {
            command: program.to_string(),
            source,
        })?;

    debug!(
        "{} (pid {}) exited with {}, {} bytes of output",
        program,
        pid,
        output.status,
        output.stdout.len()
    );

    Ok(CommandOutput {
        pid,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Emits one `Command` document per cycle with the command's output.
pub struct CommandSource {
    name: String,
    program: String,
    args: Vec<String>,
    host: String,
}

impl CommandSource {
    pub fn new(program: &str, args: &[String]) -> Self {
        Self {
            name: "Command".to_string(),
            program: program.to_string(),
            args: args.to_vec(),
            host: hostname(),
        }
    }

    pub fn with_host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    /// Program and arguments joined by single spaces.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn docs_at(&self, now: DateTime<Utc>) -> Result<Vec<Document>, CollectorError> {
        let out = run(&self.program, &self.args)?;

        let mut data = base_information(&self.host, now);
        data.insert("name".into(), JsonValue::String(self.program.clone()));
        data.insert(
            self.name.clone(),
            json!({
                "command": self.command_line(),
                "pid": out.pid,
                "stdout": out.stdout,
                "stderr": out.stderr,
            }),
        );

        Ok(vec![Document::new(&self.name, "Command", data)])
    }
}

impl Source for CommandSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn docs(&mut self) -> Result<Vec<Document>, CollectorError> {
        self.docs_at(Utc::now())
    }
}

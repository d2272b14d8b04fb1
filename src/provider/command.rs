use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt as _;
use tokio::process::Command;

use super::{Provider, ProviderError};

/// Runs an external program with the prompt on stdin and reads the text from stdout.
///
/// The requested model is exported as `NOVELLOOM_MODEL`.
pub struct CommandProvider {
    program: String,
    args: Vec<String>,
}

impl CommandProvider {
    pub fn new(program: String, args: Vec<String>) -> Self {
        Self { program, args }
    }
}

#[async_trait]
impl Provider for CommandProvider {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String, ProviderError> {
        let program = &self.program;
        let mut child = Command::new(program)
            .args(&self.args)
            .env("NOVELLOOM_MODEL", model)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| ProviderError::new(format!("spawn command {program}: {err}")))?;

        {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| ProviderError::new("open command stdin"))?;
            stdin
                .write_all(prompt.as_bytes())
                .await
                .map_err(|err| ProviderError::new(format!("write command stdin: {err}")))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|err| ProviderError::new(format!("wait command {program}: {err}")))?;
        if !output.status.success() {
            return Err(ProviderError::new(format!(
                "command failed: {program} ({})",
                output.status
            )));
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|_| ProviderError::new("command stdout is not valid UTF-8"))?;
        if stdout.trim().is_empty() {
            return Err(ProviderError::new("command output is empty"));
        }
        Ok(stdout)
    }
}

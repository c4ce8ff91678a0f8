//! External command invocation.

use crate::error::{SignerError, SignerResult};
use std::ffi::OsStr;
use std::process::Stdio;
use tokio::process::Command;

/// Captured result of a finished command.
#[derive(Debug)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Stdout followed by stderr.
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

/// Run `program` with `args` to completion, capturing its output.
///
/// A non-zero exit is reported in [`CommandOutput::success`], not as an error;
/// only a failure to spawn is an error.
pub async fn run<I, S>(program: &str, args: I) -> SignerResult<CommandOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    let child = cmd
        .spawn()
        .map_err(|e| SignerError::command(program, format!("failed to spawn: {e}")))?;
    let output = child
        .wait_with_output()
        .await
        .map_err(|e| SignerError::command(program, e.to_string()))?;

    Ok(CommandOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run `program` and fail unless it exits successfully.
pub async fn run_checked<I, S>(program: &str, args: I) -> SignerResult<CommandOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run(program, args).await?;
    if !output.success {
        return Err(SignerError::command(program, output.stderr.trim().to_string()));
    }
    Ok(output)
}

/// Replace `{name}` placeholders in each argument.
pub fn substitute(args: &[String], vars: &[(&str, &str)]) -> Vec<String> {
    args.iter()
        .map(|arg| {
            vars.iter().fold(arg.clone(), |acc, (name, value)| {
                acc.replace(&format!("{{{name}}}"), value)
            })
        })
        .collect()
}

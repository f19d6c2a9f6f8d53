//! Blocking subprocess execution.
//!
//! Every external tool (vendor installer, compiler, cmake, make, git) goes
//! through here so a nonzero exit always surfaces as
//! [`FormulaError::Subprocess`] with the command line that failed.

use crate::error::{FormulaError, Result};
use std::process::{Command, Stdio};

/// Render a command the way a user would type it.
pub fn describe(cmd: &Command) -> String {
    let mut parts = vec![cmd.get_program().to_string_lossy().to_string()];
    parts.extend(cmd.get_args().map(|a| a.to_string_lossy().to_string()));
    parts.join(" ")
}

/// Run to completion with inherited stdio; nonzero exit is an error.
pub fn run(cmd: &mut Command) -> Result<()> {
    let command = describe(cmd);
    tracing::info!("running: {}", command);

    let status = cmd.status().map_err(|e| {
        FormulaError::Other(anyhow::anyhow!("Failed to spawn {}: {}", command, e))
    })?;

    if status.success() {
        Ok(())
    } else {
        Err(FormulaError::Subprocess {
            command,
            code: status.code(),
        })
    }
}

/// Run and capture stdout and stderr combined; nonzero exit is an error.
pub fn output(cmd: &mut Command) -> Result<String> {
    let command = describe(cmd);
    tracing::info!("capturing: {}", command);

    let out = cmd
        .stdin(Stdio::null())
        .output()
        .map_err(|e| FormulaError::Other(anyhow::anyhow!("Failed to spawn {}: {}", command, e)))?;

    let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&out.stderr));

    if out.status.success() {
        Ok(text)
    } else {
        tracing::debug!("{} output:\n{}", command, text);
        Err(FormulaError::Subprocess {
            command,
            code: out.status.code(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe() {
        let mut cmd = Command::new("make");
        cmd.args(["-C", "build", "install"]);
        assert_eq!(describe(&cmd), "make -C build install");
    }

    #[test]
    fn test_nonzero_exit_is_subprocess_failure() {
        let err = run(Command::new("sh").args(["-c", "exit 3"])).unwrap_err();
        match err {
            FormulaError::Subprocess { command, code } => {
                assert_eq!(code, Some(3));
                assert!(command.starts_with("sh -c"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_output_captures_both_streams() {
        let text = output(Command::new("sh").args(["-c", "echo out; echo err >&2"])).unwrap();
        assert!(text.contains("out"));
        assert!(text.contains("err"));
    }
}

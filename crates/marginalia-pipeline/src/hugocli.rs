//! Static-site generator invocation.

use anyhow::{bail, Result};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

pub const BUILD_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Binary name or full path; "hugo" by default.
    pub bin: String,
    /// Additional arguments, e.g. ["--minify"].
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            bin: "hugo".to_string(),
            args: Vec::new(),
            timeout: BUILD_TIMEOUT,
        }
    }
}

/// Run the site generator in the working directory, capturing combined
/// output for error reporting.
pub async fn run(working_dir: &Path, opts: &RunOptions) -> Result<()> {
    let bin = if opts.bin.trim().is_empty() { "hugo" } else { opts.bin.trim() };

    let mut cmd = Command::new(bin);
    cmd.args(&opts.args)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(opts.timeout, cmd.output()).await {
        Err(_) => bail!("{bin} timed out after {}s", opts.timeout.as_secs()),
        Ok(result) => result?,
    };

    if !output.status.success() {
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        bail!("{bin} failed: {combined}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let opts = RunOptions {
            bin: "definitely-not-a-real-binary-4711".to_string(),
            ..Default::default()
        };
        assert!(run(dir.path(), &opts).await.is_err());
    }

    #[tokio::test]
    async fn nonzero_exit_captures_output() {
        let dir = tempfile::tempdir().unwrap();
        // `false` exits 1 with no output; the error names the binary.
        let opts = RunOptions {
            bin: "false".to_string(),
            ..Default::default()
        };
        let err = run(dir.path(), &opts).await.unwrap_err();
        assert!(err.to_string().contains("false failed"));
    }
}

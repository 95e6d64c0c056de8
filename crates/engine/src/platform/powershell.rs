//! PowerShell runner used by the Windows backends.
//!
//! Scripts run with `$ErrorActionPreference = 'Stop'` so that cmdlet
//! errors surface as a non-zero exit code; stderr is then classified into
//! a [`CapError`].

use crate::config::ShellConfig;
use crate::traits::{CapError, CapResult};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::process::Command;

const PRELUDE: &str = "$ErrorActionPreference = 'Stop'; \
                       $ProgressPreference = 'SilentlyContinue'; \
                       [Console]::OutputEncoding = [System.Text.Encoding]::UTF8; ";

#[derive(Debug, Clone)]
pub struct PowerShell {
    program: String,
    query_timeout: Duration,
}

impl PowerShell {
    pub fn new(cfg: &ShellConfig) -> Self {
        Self {
            program: cfg.program.clone(),
            query_timeout: Duration::from_secs(cfg.query_timeout_secs),
        }
    }

    /// Run a read-only query, bounded by the configured timeout.
    pub async fn query(&self, script: &str) -> CapResult<String> {
        self.exec(script, &[], Some(self.query_timeout)).await
    }

    /// Run a query and parse its `ConvertTo-Json` output as a list.
    pub async fn query_list<T: DeserializeOwned>(&self, script: &str) -> CapResult<Vec<T>> {
        let out = self.query(script).await?;
        parse_json_list(&out)
    }

    /// Run a state-changing script. No timeout: mutators run to completion.
    pub async fn run(&self, script: &str) -> CapResult<String> {
        self.exec(script, &[], None).await
    }

    /// Like [`run`](Self::run), passing values through the child's
    /// environment instead of the command line.
    pub async fn run_with_env(&self, script: &str, env: &[(&str, &str)]) -> CapResult<String> {
        self.exec(script, env, None).await
    }

    async fn exec(
        &self,
        script: &str,
        env: &[(&str, &str)],
        timeout: Option<Duration>,
    ) -> CapResult<String> {
        let full = format!("{PRELUDE}{script}");
        let mut cmd = Command::new(&self.program);
        cmd.args(["-NoProfile", "-NonInteractive", "-Command", &full])
            .kill_on_drop(true);
        for (k, v) in env {
            cmd.env(k, v);
        }

        let output = match timeout {
            Some(t) => tokio::time::timeout(t, cmd.output())
                .await
                .map_err(|_| CapError::Timeout(t.as_secs()))?,
            None => cmd.output().await,
        }
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CapError::DependencyMissing(format!("{} not found", self.program))
            } else {
                CapError::Io(e)
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::debug!(status = %output.status, stderr = %stderr.trim(), "powershell failed");
            return Err(classify_failure(&stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Quote a value as a single-quoted PowerShell literal.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Parse `ConvertTo-Json` output, which is empty for no results, a bare
/// object for one and an array for several.
pub fn parse_json_list<T: DeserializeOwned>(out: &str) -> CapResult<Vec<T>> {
    let trimmed = out.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(vec![]);
    }
    let parsed = if trimmed.starts_with('[') {
        serde_json::from_str::<Vec<T>>(trimmed)
    } else {
        serde_json::from_str::<T>(trimmed).map(|one| vec![one])
    };
    parsed.map_err(|e| CapError::Other(format!("unexpected PowerShell output: {}", e)))
}

/// Map PowerShell error text onto the capability error taxonomy.
pub fn classify_failure(stderr: &str) -> CapError {
    let message = first_error_line(stderr);
    let lower = stderr.to_ascii_lowercase();

    if lower.contains("access is denied")
        || lower.contains("permissiondenied")
        || lower.contains("unauthorizedaccess")
        || lower.contains("requires elevation")
    {
        CapError::PermissionDenied(message)
    } else if lower.contains("already exists")
        || lower.contains("userexists")
        || lower.contains("groupexists")
    {
        CapError::AlreadyExists(message)
    } else if lower.contains("invalidpassword") || lower.contains("password does not meet") {
        CapError::InvalidInput(message)
    } else if lower.contains("notfound")
        || lower.contains("not found")
        || lower.contains("no msft_")
        || lower.contains("does not exist")
        || lower.contains("cannot find")
    {
        CapError::NotFound(message)
    } else {
        CapError::Other(message)
    }
}

fn first_error_line(stderr: &str) -> String {
    stderr
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("PowerShell exited with an error")
        .to_string()
}

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::cli::error::CliFailure;

/// Handle for invoking the external OCI CLI binary.
#[derive(Debug, Clone)]
pub struct OciCli {
    binary: String,
    profile: String,
    timeout_secs: u64,
    config_file: Option<std::path::PathBuf>,
}

impl OciCli {
    /// `timeout_secs` of 0 leaves the CLI's own read timeout in effect.
    pub fn new(binary: &str, profile: &str, timeout_secs: u64) -> Self {
        Self {
            binary: binary.to_string(),
            profile: profile.to_string(),
            timeout_secs,
            config_file: None,
        }
    }

    /// Point the CLI at a non-default config file.
    pub fn with_config_file(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// The argv tail appended to every invocation.
    pub fn common_args(&self) -> Vec<String> {
        let mut common = vec![
            "--profile".to_string(),
            self.profile.clone(),
            "--output".to_string(),
            "json".to_string(),
        ];
        if let Some(config) = &self.config_file {
            common.push("--config-file".to_string());
            common.push(config.display().to_string());
        }
        if self.timeout_secs > 0 {
            common.push("--read-timeout".to_string());
            common.push(self.timeout_secs.to_string());
        }
        common
    }

    /// Run `<binary> <args…> --profile <p> --output json` and return the
    /// parsed JSON payload.
    ///
    /// Exit 0 with empty stdout is normalised: list queries (`data[]` in the
    /// argv) yield `[]`, everything else `{}`. Nonzero exit yields a
    /// [`CliFailure`] parsed from the first stderr line, falling back to an
    /// `Error: …` line scraped from stdout.
    pub async fn invoke<S: AsRef<str>>(&self, args: &[S]) -> Result<serde_json::Value, CliFailure> {
        let argv: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
        tracing::debug!(binary = %self.binary, args = ?argv, "Invoking OCI CLI");

        let mut cmd = Command::new(&self.binary);
        cmd.args(&argv)
            .args(self.common_args())
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            CliFailure::parse(&format!("failed to spawn {}: {}", self.binary, e))
        })?;

        // Drain both pipes concurrently so neither side can block the child.
        let stdout = BufReader::new(child.stdout.take().unwrap());
        let stderr = BufReader::new(child.stderr.take().unwrap());

        let stdout_handle = tokio::spawn(collect_lines(stdout, "stdout"));
        let stderr_handle = tokio::spawn(collect_lines(stderr, "stderr"));

        let stdout_lines = stdout_handle.await.unwrap_or_default();
        let stderr_lines = stderr_handle.await.unwrap_or_default();

        let status = match child.wait().await {
            Ok(status) => status,
            Err(e) => return Err(CliFailure::parse(&format!("failed to reap child: {e}"))),
        };
        let exit_code = status.code().unwrap_or(-1);
        tracing::debug!(exit_code, "OCI CLI command completed");

        if exit_code != 0 {
            return Err(CliFailure::parse(&error_payload(
                &stdout_lines,
                &stderr_lines,
            )));
        }

        let stdout_text = stdout_lines.join("\n");
        let trimmed = stdout_text.trim();
        if trimmed.is_empty() {
            // Some list commands emit nothing at all instead of `[]`.
            return Ok(empty_payload(&argv));
        }

        serde_json::from_str(trimmed).map_err(|e| {
            CliFailure::parse(&format!("unparseable CLI output ({e}): {trimmed}"))
        })
    }
}

async fn collect_lines<R>(reader: BufReader<R>, stream: &'static str) -> Vec<String>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = Vec::new();
    let mut stream_lines = reader.lines();
    while let Ok(Some(line)) = stream_lines.next_line().await {
        tracing::debug!(stream, "{}", line);
        lines.push(line);
    }
    lines
}

fn empty_payload(argv: &[&str]) -> serde_json::Value {
    if argv.iter().any(|a| a.contains("data[]")) {
        serde_json::Value::Array(vec![])
    } else {
        serde_json::Value::Object(serde_json::Map::new())
    }
}

/// The first stderr line, even a blank one; only when stderr produced no
/// lines at all is an `Error: …` line scraped from stdout instead.
fn error_payload(stdout_lines: &[String], stderr_lines: &[String]) -> String {
    if let Some(line) = stderr_lines.first() {
        return line.trim().to_string();
    }

    let re = regex::Regex::new(r"Error: (.*)").unwrap();
    let stdout_text = stdout_lines.join("\n");
    if let Some(cap) = re.captures(&stdout_text) {
        return cap[1].to_string();
    }

    String::new()
}

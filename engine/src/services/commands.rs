// File: engine/src/services/commands.rs
use anyhow::{anyhow, Result};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command as AsyncCommand;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Which stream a relayed line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Run an external program and hand every output line to `on_line` while it
/// runs. The child is killed when `cancel` fires.
pub async fn run_streaming(
    program: &str,
    args: &[String],
    cancel: &CancellationToken,
    on_line: &(dyn Fn(OutputStream, &str) + Send + Sync),
) -> Result<ExitStatus> {
    info!("Starting {} {}", program, args.join(" "));

    let mut command = AsyncCommand::new(program);
    command
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|e| anyhow!("Failed to spawn {}: {}", program, e))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("{} stdout was not captured", program))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("{} stderr was not captured", program))?;

    let drain = async {
        tokio::join!(
            drain_lines(stdout, OutputStream::Stdout, on_line),
            drain_lines(stderr, OutputStream::Stderr, on_line),
        )
    };

    let finished = tokio::select! {
        _ = cancel.cancelled() => None,
        (_, status) = async { tokio::join!(drain, child.wait()) } => Some(status),
    };

    let status = match finished {
        Some(status) => status.map_err(|e| anyhow!("Error waiting for {}: {}", program, e))?,
        None => {
            warn!("{} cancelled, killing process", program);
            if let Err(e) = child.kill().await {
                warn!("Failed to kill {}: {}", program, e);
            }
            return Err(anyhow!("{} was cancelled", program));
        }
    };

    info!(
        "{} completed with exit code: {} (success: {})",
        program,
        status.code().unwrap_or(-1),
        status.success()
    );
    Ok(status)
}

async fn drain_lines<R>(
    reader: R,
    stream: OutputStream,
    on_line: &(dyn Fn(OutputStream, &str) + Send + Sync),
) where
    R: AsyncRead + Unpin,
{
    // Tools may print in a legacy code page, so lines are read as bytes and
    // decoded lossily. The pipe stays drained until EOF or a read error.
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                {
                    let line = String::from_utf8_lossy(&buf);
                    let trimmed = line.trim();
                    if !trimmed.is_empty() {
                        on_line(stream, trimmed);
                    }
                }
                buf.clear();
            }
            Err(e) => {
                warn!("Stopped reading {:?} output: {}", stream, e);
                break;
            }
        }
    }
}

/// Free bytes on the filesystem holding `path`, via `df`.
pub async fn available_space(path: &Path) -> Result<u64> {
    let output = AsyncCommand::new("df")
        .arg("-B1")
        .arg("--output=avail")
        .arg(path)
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("df failed for {}: {}", path.display(), stderr.trim()));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let available = parse_df_available(&stdout)
        .ok_or_else(|| anyhow!("Unexpected df output for {}: {}", path.display(), stdout.trim()))?;

    debug!("{} bytes available at {}", available, path.display());
    Ok(available)
}

/// Parse `df --output=avail` output: a header line followed by the byte count.
pub fn parse_df_available(output: &str) -> Option<u64> {
    output
        .lines()
        .skip(1)
        .find_map(|line| line.trim().parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_parse_df_available() {
        assert_eq!(parse_df_available("   Avail\n123456789\n"), Some(123_456_789));
        assert_eq!(parse_df_available("Avail\n"), None);
        assert_eq!(parse_df_available(""), None);
    }

    #[tokio::test]
    async fn test_run_streaming_relays_both_streams() {
        let lines = Mutex::new(Vec::new());
        let on_line = |stream: OutputStream, line: &str| {
            lines.lock().unwrap().push((stream, line.to_string()));
        };

        let status = run_streaming(
            "sh",
            &["-c".to_string(), "echo out; echo err >&2".to_string()],
            &CancellationToken::new(),
            &on_line,
        )
        .await
        .unwrap();

        assert!(status.success());
        let lines = lines.into_inner().unwrap();
        assert!(lines.contains(&(OutputStream::Stdout, "out".to_string())));
        assert!(lines.contains(&(OutputStream::Stderr, "err".to_string())));
    }

    #[tokio::test]
    async fn test_run_streaming_survives_non_utf8_output() {
        let lines = Mutex::new(Vec::new());
        let on_line = |_: OutputStream, line: &str| {
            lines.lock().unwrap().push(line.to_string());
        };

        // Latin-1 0xFC followed by enough output to fill the pipe buffer
        let script = r"printf 'Kopiere \374bung\n'; i=0; while [ $i -lt 5000 ]; do echo line $i; i=$((i+1)); done; exit 0";
        let status = run_streaming(
            "sh",
            &["-c".to_string(), script.to_string()],
            &CancellationToken::new(),
            &on_line,
        )
        .await
        .unwrap();

        assert!(status.success());
        let lines = lines.into_inner().unwrap();
        assert_eq!(lines.len(), 5001);
        assert_eq!(lines[0], "Kopiere \u{FFFD}bung");
        assert_eq!(lines[5000], "line 4999");
    }

    #[tokio::test]
    async fn test_run_streaming_reports_failure_status() {
        let status = run_streaming(
            "sh",
            &["-c".to_string(), "exit 3".to_string()],
            &CancellationToken::new(),
            &|_, _| {},
        )
        .await
        .unwrap();

        assert_eq!(status.code(), Some(3));
    }
}

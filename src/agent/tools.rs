use anyhow::{Context, Result};
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::process::Command;
use tracing::{info, warn};

use super::artifacts::{mime_for_extension, Artifact};

pub const MAX_OUTPUT_BYTES: usize = 200_000; // cap tool outputs
pub const FIGURE_DIR_ENV: &str = "ESI_FIGURE_DIR";

#[derive(Debug)]
pub struct PythonRun {
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
    pub figures: Vec<Artifact>,
}

pub fn truncate(mut s: String) -> String {
    if s.len() > MAX_OUTPUT_BYTES {
        let mut cut = MAX_OUTPUT_BYTES;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        s.push_str("\n[truncated]\n");
    }
    s
}

/// Run `code` with `python3` inside a throwaway directory. Figures written
/// to `$ESI_FIGURE_DIR` are collected as artifacts.
pub async fn run_python(python: &str, code: &str, timeout: Duration) -> Result<PythonRun> {
    let started = Instant::now();
    let workdir = tempfile::tempdir().context("Failed to create sandbox directory")?;
    let figure_dir = workdir.path().join("figures");
    fs::create_dir_all(&figure_dir).await?;
    let script = workdir.path().join("main.py");
    fs::write(&script, code).await?;

    info!(tool = "python_sandbox", code_len = code.len(), "tool start");
    let child = Command::new(python)
        .arg(&script)
        .current_dir(workdir.path())
        .env("MPLBACKEND", "Agg")
        .env(FIGURE_DIR_ENV, &figure_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to start {}", python))?;

    let (exit_code, timed_out, stdout, stderr) =
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => {
                let output = output?;
                (
                    output.status.code(),
                    false,
                    String::from_utf8_lossy(&output.stdout).to_string(),
                    String::from_utf8_lossy(&output.stderr).to_string(),
                )
            }
            // Dropping the wait future kills the child
            Err(_) => (
                None,
                true,
                String::new(),
                format!("execution timed out after {}s", timeout.as_secs()),
            ),
        };

    let figures = collect_figures(&figure_dir).await;
    info!(
        tool = "python_sandbox",
        exit = exit_code.unwrap_or(-1),
        timed_out,
        stdout_len = stdout.len(),
        stderr_len = stderr.len(),
        figures = figures.len(),
        took_ms = started.elapsed().as_millis() as u64,
        "tool end"
    );

    Ok(PythonRun {
        exit_code,
        timed_out,
        stdout: truncate(stdout),
        stderr: truncate(stderr),
        figures,
    })
}

/// Image files directly under `dir`, sorted by name.
pub async fn collect_figures(dir: &Path) -> Vec<Artifact> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Failed to read figure directory {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut figures = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let Some(mime) = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(mime_for_extension)
        else {
            continue;
        };
        match fs::read(&path).await {
            Ok(data) => {
                let name = entry.file_name().to_string_lossy().to_string();
                figures.push(Artifact::new(name, mime, data));
            }
            Err(e) => warn!("Failed to read figure {}: {}", path.display(), e),
        }
    }
    figures.sort_by(|a, b| a.name.cmp(&b.name));
    figures
}

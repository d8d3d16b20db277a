use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

use crate::viewer::FaultReport;

const MAX_SESSIONS: usize = 10;

/// Async session logger that writes timestamped lines to `<dir>/latest.log`.
///
/// `log()` only pushes into an unbounded channel; a background task owns the file,
/// so bridge handlers never wait on disk I/O.
pub struct SessionLogger {
    tx: mpsc::UnboundedSender<String>,
    path: PathBuf,
}

impl SessionLogger {
    /// Open a new session in `dir`.
    ///
    /// - Creates `dir` if needed
    /// - Rotates the previous `latest.log` to `session-{timestamp}.log`
    /// - Keeps at most 10 rotated sessions
    /// - Spawns the writer task (requires a tokio runtime)
    pub async fn new(dir: &Path, title: &str) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(dir).await?;

        let latest = dir.join("latest.log");
        if tokio::fs::try_exists(&latest).await.unwrap_or(false) {
            let rotated = dir.join(format!("session-{}.log", unix_timestamp()));
            let _ = tokio::fs::rename(&latest, &rotated).await;
        }
        cleanup_old_sessions(dir).await;

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&latest)
            .await?;

        let (tx, rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(writer_task(file, rx));

        let _ = tx.send(format!(
            "=== isoview session: {title} ({}) ===\n\n",
            format_timestamp(unix_timestamp())
        ));

        Ok(Self { tx, path: latest })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queue a log line. Never blocks.
    pub fn log(&self, prefix: &str, line: &str) {
        send_log(&self.tx, prefix, line);
    }

    /// Record a fault in a single line, with its location when known.
    pub fn log_fault(&self, fault: &FaultReport) {
        let location = match (fault.line, fault.col) {
            (Some(line), Some(col)) => format!(" at {line}:{col}"),
            (Some(line), None) => format!(" at line {line}"),
            _ => String::new(),
        };
        self.log("fault", &format!("{}{location}", fault.message));
    }

    /// Clone the sender so detached tasks can log without holding the logger.
    pub fn sender(&self) -> mpsc::UnboundedSender<String> {
        self.tx.clone()
    }
}

/// Format a line and push it through a cloned sender.
pub fn send_log(tx: &mpsc::UnboundedSender<String>, prefix: &str, line: &str) {
    let ts = format_timestamp(unix_timestamp());
    let _ = tx.send(format!("[{ts}] [{prefix}] {line}\n"));
}

async fn writer_task(file: tokio::fs::File, mut rx: mpsc::UnboundedReceiver<String>) {
    use tokio::io::AsyncWriteExt;
    let mut writer = tokio::io::BufWriter::new(file);

    while let Some(line) = rx.recv().await {
        let _ = writer.write_all(line.as_bytes()).await;
        // Keep the file readable while the session is live
        let _ = writer.flush().await;
    }

    let footer = format!(
        "\n=== Session ended ({}) ===\n",
        format_timestamp(unix_timestamp())
    );
    let _ = writer.write_all(footer.as_bytes()).await;
    let _ = writer.flush().await;
}

fn unix_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Format Unix seconds as ISO 8601 UTC, e.g. `2025-06-15T10:30:00Z`.
fn format_timestamp(secs: u64) -> String {
    let days = (secs / 86_400) as i64;
    let rem = secs % 86_400;
    let (hour, min, sec) = (rem / 3600, (rem / 60) % 60, rem % 60);

    // Civil date from days since 1970-01-01 (Howard Hinnant's algorithm).
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);

    format!("{year:04}-{month:02}-{day:02}T{hour:02}:{min:02}:{sec:02}Z")
}

/// Keep only the most recent `session-*.log` files.
async fn cleanup_old_sessions(dir: &Path) {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(_) => return,
    };

    let mut sessions: Vec<PathBuf> = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("session-") && name.ends_with(".log") {
            sessions.push(entry.path());
        }
    }

    // Timestamps are embedded in the names, so lexicographic order is chronological
    sessions.sort();
    let excess = sessions.len().saturating_sub(MAX_SESSIONS);
    for old in sessions.drain(..excess) {
        let _ = tokio::fs::remove_file(old).await;
    }
}

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures_util::future::BoxFuture;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use isoview_lib::logs::SessionLogger;
use isoview_lib::source::ContentSource;
use isoview_lib::viewer::{
    inject_shim, Bridge, CapabilityError, Dispatch, HostCapabilities, SharePayload,
};
use isoview_lib::{load_config, Measurements, ViewerConfig};

#[derive(Parser, Debug)]
#[command(name = "isoview", version, about = "Package and inspect sandboxed interactive content")]
struct Cli {
    #[arg(long, global = true, help = "Viewer config file (defaults to ~/.isoview/config.json)")]
    config: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Inject the bridge shim into a document (file path or http(s) URL)
    Package {
        source: String,
        #[arg(short, long, help = "Write the packaged document here instead of stdout")]
        out: Option<PathBuf>,
    },
    /// Print the fit of the logical frame for a container size
    Scale {
        #[arg(long)]
        width: f64,
        #[arg(long)]
        height: f64,
        #[arg(long, requires = "viewport_height")]
        viewport_width: Option<f64>,
        #[arg(long, requires = "viewport_width")]
        viewport_height: Option<f64>,
        #[arg(long, default_value = "0px")]
        safe_top: String,
        #[arg(long, default_value = "0px")]
        safe_bottom: String,
    },
    /// Dispatch bridge messages read as JSON lines from stdin
    Bridge {
        #[arg(long, help = "Record the session log in this directory")]
        session_log: Option<String>,
        #[arg(long, default_value_t = false, help = "Pretend a native share sheet exists")]
        native_share: bool,
    },
}

/// Prints capability requests to stdout instead of performing them.
struct StdoutCapabilities {
    native_share: bool,
}

impl HostCapabilities for StdoutCapabilities {
    fn can_share(&self) -> bool {
        self.native_share
    }

    fn share(&self, payload: SharePayload) -> BoxFuture<'static, Result<(), CapabilityError>> {
        let line = serde_json::json!({ "action": "share", "data": payload });
        Box::pin(async move {
            println!("{line}");
            Ok(())
        })
    }

    fn write_clipboard(&self, text: String) -> BoxFuture<'static, Result<(), CapabilityError>> {
        let line = serde_json::json!({ "action": "copy", "text": text });
        Box::pin(async move {
            println!("{line}");
            Ok(())
        })
    }
}

fn resolve_config(path: Option<&str>) -> anyhow::Result<ViewerConfig> {
    match path {
        Some(p) => ViewerConfig::load_from(p).with_context(|| format!("loading config {p}")),
        None => load_config().context("loading ~/.isoview/config.json"),
    }
}

async fn package(config: &ViewerConfig, source: &str, out: Option<PathBuf>) -> anyhow::Result<()> {
    let content = ContentSource::parse(source)
        .load(config.max_content_bytes)
        .await
        .with_context(|| format!("reading {source}"))?;
    if content.is_empty() {
        anyhow::bail!("{source}: no content to display");
    }

    let document = inject_shim(&content, 0);
    match out {
        Some(path) => {
            tokio::fs::write(&path, document)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            log::info!("packaged {source} -> {}", path.display());
        }
        None => println!("{document}"),
    }
    Ok(())
}

async fn bridge(
    config: &ViewerConfig,
    session_log: Option<String>,
    native_share: bool,
) -> anyhow::Result<()> {
    let logger = match session_log {
        Some(dir) => {
            let dir = PathBuf::from(isoview_lib::util::expand_tilde(&dir));
            Some(
                SessionLogger::new(&dir, "bridge")
                    .await
                    .with_context(|| format!("opening session log in {}", dir.display()))?,
            )
        }
        None => None,
    };

    let bridge = Bridge::new(Arc::new(StdoutCapabilities { native_share }))
        .with_fallback_text(&config.share_fallback_text);

    let mut pending = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: serde_json::Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                log::debug!("skipping non-JSON line: {e}");
                continue;
            }
        };
        match bridge.dispatch(&value) {
            Dispatch::Ignored => {
                if let Some(logger) = &logger {
                    logger.log("bridge", &format!("ignored: {line}"));
                }
            }
            Dispatch::Fault(report) => {
                if let Some(logger) = &logger {
                    logger.log_fault(&report);
                }
                println!(
                    "{}",
                    serde_json::json!({ "action": "fault", "error": report })
                );
            }
            Dispatch::Spawned(handle) => {
                if let Some(logger) = &logger {
                    logger.log("bridge", line);
                }
                pending.push(handle);
            }
        }
    }

    for handle in pending {
        let _ = handle.await;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let config = resolve_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Package { source, out } => package(&config, &source, out).await,
        Commands::Scale {
            width,
            height,
            viewport_width,
            viewport_height,
            safe_top,
            safe_bottom,
        } => {
            let mut measurements =
                Measurements::container(width, height).with_safe_area(&safe_top, &safe_bottom);
            if let (Some(w), Some(h)) = (viewport_width, viewport_height) {
                measurements = measurements.with_viewport(w, h);
            }
            let state =
                isoview_lib::viewer::compute_viewport(&config.frame, &config.layout, &measurements);
            println!("{}", serde_json::to_string_pretty(&state)?);
            Ok(())
        }
        Commands::Bridge {
            session_log,
            native_share,
        } => bridge(&config, session_log, native_share).await,
    }
}

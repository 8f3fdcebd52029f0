mod calc;
mod claims;
mod config;
mod db;
mod error;
mod ipc;
mod model;
mod projector;
mod roster;
mod sheet;

use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;

fn init_tracing(filter: &str) {
    // stdout carries the protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(config::DEFAULT_LOG_FILTER)),
        )
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cfg = config::Config::load()?;
    init_tracing(&cfg.log_filter);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        workspace = ?cfg.workspace,
        default_role = ?cfg.default_role,
        "aulad starting"
    );

    let startup_workspace = cfg.workspace.clone();
    let mut state = ipc::AppState::new(cfg);
    if let Some(ws) = startup_workspace {
        if let Err(e) = ipc::open_workspace(&mut state, &ws) {
            tracing::error!(workspace = %ws.display(), error = %e, "failed to open workspace");
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                tracing::warn!(error = %e, "unparseable request line");
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    tracing::info!("stdin closed, exiting");
    Ok(())
}

mod handlers;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use clap::Parser;
use tower_http::compression::CompressionLayer;
use tracing::{error, info, warn};

use postfix_exporter_core::{ExporterConfig, LogCollector, VERSION};

use state::SharedCollector;

// ============================================================
// CLI
// ============================================================

#[derive(Parser, Debug)]
#[command(name = "postfix-exporter-web", about = "Postfix Prometheus exporter", version = VERSION)]
struct Args {
    /// Listen address.
    #[arg(long, default_value = "0.0.0.0:9154", env = "POSTFIX_EXPORTER_LISTEN")]
    listen: SocketAddr,

    /// Postfix log file.
    #[arg(long, default_value = "/var/log/mail.log", env = "POSTFIX_EXPORTER_LOG_PATH")]
    log_path: PathBuf,

    /// Postfix queue directory.
    #[arg(long, default_value = "/var/spool/postfix", env = "POSTFIX_EXPORTER_QUEUE_ROOT")]
    queue_root: PathBuf,

    /// Lines read from the end of the log when no position is saved.
    #[arg(long, default_value = "1000", env = "POSTFIX_EXPORTER_BOOTSTRAP_LINES")]
    bootstrap_lines: usize,

    /// Counter state file.
    #[arg(
        long,
        default_value = "/var/lib/postfix-exporter/state.json",
        env = "POSTFIX_EXPORTER_STATE_PATH"
    )]
    state_path: PathBuf,

    /// Metric name prefix.
    #[arg(long, default_value = "postfix", env = "POSTFIX_EXPORTER_PREFIX")]
    prefix: String,

    /// Path to /proc filesystem.
    #[arg(long, default_value = "/proc")]
    proc_path: PathBuf,

    /// postconf binary used to discover the Postfix version.
    #[arg(long, default_value = "postconf", env = "POSTFIX_EXPORTER_POSTCONF")]
    postconf_path: PathBuf,

    /// Postfix config directory passed to postconf as -c.
    #[arg(long, env = "POSTFIX_EXPORTER_CONFIG_DIR")]
    config_dir: Option<PathBuf>,
}

impl Args {
    fn exporter_config(&self) -> ExporterConfig {
        ExporterConfig {
            log_path: self.log_path.clone(),
            queue_root: self.queue_root.clone(),
            bootstrap_lines: self.bootstrap_lines,
            state_path: self.state_path.clone(),
            prefix: self.prefix.clone(),
            proc_path: self.proc_path.clone(),
            postconf_path: self.postconf_path.clone(),
            config_dir: self.config_dir.clone(),
        }
    }
}

// ============================================================
// Main
// ============================================================

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "postfix_exporter_web=info,postfix_exporter_core=info".into()),
        )
        .init();

    let collector = match LogCollector::new(args.exporter_config()) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::from(2);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to build tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async_main(args.listen, collector))
}

async fn async_main(addr: SocketAddr, collector: SharedCollector) -> ExitCode {
    info!(
        version = VERSION,
        log = %collector.config().log_path.display(),
        state = %collector.config().state_path.display(),
        "starting"
    );

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(%addr, error = %e, "failed to bind");
            return ExitCode::FAILURE;
        }
    };
    info!(%addr, "listening");

    if let Err(e) = axum::serve(listener, router(collector))
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "server error");
        return ExitCode::FAILURE;
    }

    info!("shutdown complete");
    ExitCode::SUCCESS
}

fn router(collector: SharedCollector) -> Router {
    Router::new()
        .route("/metrics", get(handlers::handle_metrics))
        .route("/health", get(handlers::handle_health))
        .with_state(collector)
        .layer(CompressionLayer::new())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("received shutdown signal");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use clap::CommandFactory;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const RECEIVED: &str =
        "Oct 19 10:00:00 mx postfix/smtpd[1234]: 4ABC123: client=mail.example.com[203.0.113.5]\n";

    fn collector(dir: &Path) -> SharedCollector {
        let config = ExporterConfig {
            log_path: dir.join("mail.log"),
            queue_root: dir.join("spool"),
            state_path: dir.join("state.json"),
            proc_path: dir.join("proc"),
            postconf_path: dir.join("no-postconf"),
            ..Default::default()
        };
        Arc::new(LogCollector::new(config).unwrap())
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, Option<String>, String) {
        let response = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, content_type, String::from_utf8(body.to_vec()).unwrap())
    }

    #[test]
    fn test_cli_is_well_formed() {
        Args::command().debug_assert();
        let args = Args::try_parse_from(["postfix-exporter-web"]).unwrap();
        assert_eq!(args.listen, "0.0.0.0:9154".parse::<SocketAddr>().unwrap());
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let (status, _, body) = get(router(collector(dir.path())), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn test_metrics_counts_new_lines() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("mail.log"), RECEIVED).unwrap();
        let app = router(collector(dir.path()));

        let (status, content_type, body) = get(app.clone(), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some(handlers::EXPOSITION_CONTENT_TYPE));
        assert!(body.lines().any(|l| l == "postfix_messages_received_total 1"));

        // Unchanged log: a second scrape reports the same totals.
        let (_, _, body) = get(app, "/metrics").await;
        assert!(body.lines().any(|l| l == "postfix_messages_received_total 1"));
    }

    #[tokio::test]
    async fn test_metrics_commit_failure_is_500() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("mail.log"), RECEIVED).unwrap();
        fs::create_dir(dir.path().join("state.json.tmp")).unwrap();

        let (status, _, body) = get(router(collector(dir.path())), "/metrics").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("state.json"));
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let dir = tempfile::tempdir().unwrap();
        let (status, _, _) = get(router(collector(dir.path())), "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use report_digest::config::AppConfig;
use report_digest::mail::SmtpConnector;
use report_digest::web::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let config = AppConfig::from_env().context("Invalid configuration")?;

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_tracing(&config);

    eprintln!("📨 Report Digest v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://0.0.0.0:{}/api", config.port);
    eprintln!("   Rule variant: {}", config.run.aggregate.variant);
    eprintln!("   Upload dir: {}", config.upload_dir.display());
    eprintln!("   SMTP: {}:{}", config.smtp.host, config.smtp.port);
    if config.smtp.accounts.is_empty() {
        eprintln!("   Accounts: none configured (sending disabled)");
    } else {
        let ids: Vec<&str> = config.smtp.accounts.iter().map(|a| a.id.as_str()).collect();
        eprintln!("   Accounts: {}", ids.join(", "));
    }
    if config.run.follow_up.enabled {
        eprintln!(
            "   Follow-up: enabled (resend after {} month(s))",
            config.run.follow_up.min_age_months
        );
    }

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("Could not create {}", config.upload_dir.display()))?;

    let port = config.port;
    let state = AppState::new(config, Arc::new(SmtpConnector)).context("Invalid digest template")?;
    let _sweep_handle = web::spawn_sweep_task(Arc::clone(&state.sessions));
    let app = web::router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;
    tracing::info!(port, "Report digest server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

fn init_tracing(config: &AppConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = tracing_subscriber::fmt::layer().with_target(false);

    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "report-digest.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(file)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            None
        }
    }
}

//! lms-server - Learning Management Backend
//!
//! Role-based REST API for course catalog browsing, paid enrollment,
//! content progress, attendance, grading, announcements, online tests
//! and administrative reporting.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use lms_server::services::gateway::PaymentGateway;
use lms_server::services::mailer::Mailer;
use lms_server::AppState;

#[derive(Parser, Debug)]
#[command(name = "lms-server", about = "Learning management backend")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, env = "LMS_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting lms-server");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let config = Arc::new(lms_common::config::Config::load(args.config.as_deref())?);

    let db_pool = lms_common::db::init::init_database(&config.database_path).await?;
    info!("Database connection established");

    std::fs::create_dir_all(&config.upload_dir)?;

    // The token secret is generated on first run and persisted, so
    // issued tokens stay valid across restarts.
    let token_secret = lms_server::services::tokens::load_or_create_secret(&db_pool).await?;

    let gateway = Arc::new(PaymentGateway::from_config(&config.gateway));
    let mailer = Arc::new(Mailer::from_config(&config.mail));

    let state = AppState::new(
        db_pool.clone(),
        config.clone(),
        gateway,
        mailer,
        token_secret,
    );

    // Hourly cleanup of events more than a day past their date
    lms_server::tasks::spawn_event_cleanup(db_pool);

    let app = lms_server::build_router(state);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

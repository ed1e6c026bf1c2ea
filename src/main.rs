use sqlx::migrate::Migrator;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use eventpass_core::config::Config;
use eventpass_core::gateway::GatewayClient;
use eventpass_core::services::notifier::{
    DisabledCollaborator, EmailSender, HttpEmailSender, HttpQrEncoder, QrEncoder,
};
use eventpass_core::services::{
    CheckoutService, Clock, ReservationLedger, SeatCatalog, SystemClock, TicketNotifier,
    run_sweeper,
};
use eventpass_core::{AppState, create_app, db, startup};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Setup logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Database pool
    let pool = db::create_pool(&config).await?;

    // Run migrations
    let migrator = Migrator::new(Path::new("./migrations")).await?;
    migrator.run(&pool).await?;
    tracing::info!("Database migrations completed");

    let report = startup::validate_environment(&config, &pool).await?;
    report.print();
    if !report.database {
        anyhow::bail!("startup validation failed: database unavailable");
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let catalog = SeatCatalog::new(pool.clone());
    let ledger = ReservationLedger::new(pool.clone(), clock.clone(), config.hold_ttl_secs);
    let gateway = GatewayClient::new(&config);

    let qr: Arc<dyn QrEncoder> = match &config.qr_service_url {
        Some(url) => Arc::new(HttpQrEncoder::new(url.clone())),
        None => Arc::new(DisabledCollaborator),
    };
    let email: Arc<dyn EmailSender> = match &config.email_service_url {
        Some(url) => Arc::new(HttpEmailSender::new(url.clone())),
        None => Arc::new(DisabledCollaborator),
    };
    let notifier = TicketNotifier::new(pool.clone(), qr, email);

    let checkout = CheckoutService::new(
        pool.clone(),
        catalog,
        ledger,
        gateway,
        clock.clone(),
        notifier,
    );

    // Reclaims abandoned gateway holds whose lease ran out.
    tokio::spawn(run_sweeper(
        pool.clone(),
        clock.clone(),
        config.sweep_interval_secs,
    ));

    let state = AppState {
        db: pool,
        config: config.clone(),
        checkout,
    };

    let app = create_app(state).layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

//! Quartel billing service entry point.
//!
//! Loads configuration, wires adapters into the HTTP router, starts the
//! reconciliation sweep and serves until Ctrl-C.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use quartel_billing::adapters::http::{service_router, BillingAppState};
use quartel_billing::adapters::{
    HttpPaymentGateway, PostgresLedgerStore, PostgresMemberDirectory,
    PostgresWebhookEventRepository,
};
use quartel_billing::application::handlers::billing::DuesTerms;
use quartel_billing::application::{ReconciliationConfig, ReconciliationSweep};
use quartel_billing::config::AppConfig;
use quartel_billing::domain::billing::{BillingCycle, WebhookVerifier};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    init_tracing(&config);

    let pool = config
        .database
        .pool_options()
        .connect(&config.database.url)
        .await?;

    if config.database.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Database migrations applied");
    }

    let ledger = Arc::new(PostgresLedgerStore::new(
        pool.clone(),
        config.database.lock_timeout(),
    ));
    let gateway = Arc::new(HttpPaymentGateway::new(&config.gateway)?);

    let webhook_verifier = config.gateway.webhook_secret.clone().map(|secret| {
        WebhookVerifier::new(
            secret,
            config.billing.max_event_age_secs,
            config.billing.max_clock_skew_secs,
        )
    });
    if webhook_verifier.is_none() {
        tracing::warn!("No webhook secret configured; gateway signatures will not be checked");
    }

    let state = BillingAppState {
        ledger: ledger.clone(),
        webhook_events: Arc::new(PostgresWebhookEventRepository::new(pool.clone())),
        members: Arc::new(PostgresMemberDirectory::new(pool.clone())),
        gateway: gateway.clone(),
        eligibility: config.billing.eligibility_policy(),
        dues: DuesTerms {
            amount: config.billing.monthly_amount,
            cycle: BillingCycle::Monthly,
            due_date_offset_days: config.billing.due_date_offset_days,
            default_billing_type: config.billing.default_billing_type,
        },
        webhook_verifier,
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweep_task = if config.billing.sweep_enabled {
        let sweep = ReconciliationSweep::with_config(
            ledger,
            gateway,
            ReconciliationConfig::default()
                .with_interval(config.billing.sweep_interval())
                .with_grace_days(u64::try_from(config.billing.sweep_grace_days).unwrap_or(0))
                .with_batch_size(config.billing.sweep_batch_size),
        );
        Some(tokio::spawn(async move { sweep.run(shutdown_rx).await }))
    } else {
        tracing::info!("Reconciliation sweep disabled");
        None
    };

    let app = service_router(state, config.server.request_timeout()).layer(
        ServiceBuilder::new()
            .layer(DefaultBodyLimit::max(config.server.max_body_bytes))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id()),
    );

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, environment = ?config.server.environment, "Billing service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Some(task) = sweep_task {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Reconciliation sweep task panicked");
        }
    }
    pool.close().await;

    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));

    if config.is_production() {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

// service/src/main.rs

use parcelpay_service::activity::{ActivityLog, ActivityLogWorker, ActivitySink, PgActivitySink, TracingActivitySink};
use parcelpay_service::cart::{CartStore, MemoryCartStore, PgCartStore};
use parcelpay_service::config::AppConfig;
use parcelpay_service::gateways::payment::PosGatewayClient;
use parcelpay_service::gateways::shipping::ShippingApiClient;
use parcelpay_service::lifecycle::{MemoryOrderStore, OrderStore, PgOrderStore};
use parcelpay_service::reconciliation::ReconciliationScheduler;
use parcelpay_service::state::AppState;
use parcelpay_service::web::configure_app_routes;

use actix_web::{web as actix_data, App, HttpServer};
use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

const ACTIVITY_CHANNEL_CAPACITY: usize = 1024;

fn init_tracing() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::INFO.as_str()));
  let json = std::env::var("LOG_FORMAT").map(|v| v.eq_ignore_ascii_case("json")).unwrap_or(false);
  let builder = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_span_events(FmtSpan::CLOSE);
  if json {
    builder.json().init();
  } else {
    builder.init();
  }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
  init_tracing();
  tracing::info!("Starting parcelpay server...");

  let config = Arc::new(AppConfig::from_env().context("loading configuration")?);

  let (orders, carts, sink): (Arc<dyn OrderStore>, Arc<dyn CartStore>, Arc<dyn ActivitySink>) =
    match &config.database_url {
      Some(url) => {
        let pool = PgPoolOptions::new()
          .max_connections(10)
          .connect(url)
          .await
          .context("connecting to the database")?;
        tracing::info!("Connected to the database.");
        (
          Arc::new(PgOrderStore::new(pool.clone())),
          Arc::new(PgCartStore::new(pool.clone())),
          Arc::new(PgActivitySink::new(pool)),
        )
      }
      None => {
        tracing::warn!("DATABASE_URL not set; using in-memory stores. Data is lost on restart.");
        (
          Arc::new(MemoryOrderStore::new()),
          Arc::new(MemoryCartStore::new()),
          Arc::new(TracingActivitySink),
        )
      }
    };

  let payments = Arc::new(PosGatewayClient::new(config.payment.clone()).context("building payment client")?);
  let shipping = Arc::new(ShippingApiClient::new(config.shipping.clone()).context("building shipping client")?);

  let (activity, activity_rx) = ActivityLog::channel(ACTIVITY_CHANNEL_CAPACITY);
  let activity_task = tokio::spawn(ActivityLogWorker::new(sink).run(activity_rx));

  let app_state = AppState::build(config.clone(), orders, carts, payments, shipping, activity);

  let shutdown = CancellationToken::new();
  let scheduler = ReconciliationScheduler::new(
    app_state.reconciler.clone(),
    config.reconcile.interval,
    shutdown.clone(),
  )
  .spawn();

  let server_address = format!("{}:{}", config.server.host, config.server.port);
  tracing::info!("Binding server to {}...", server_address);

  let callback_path = config.redirects.callback_path.clone();
  let server_state = app_state.clone();
  let result = HttpServer::new(move || {
    let callback_path = callback_path.clone();
    App::new()
      .app_data(actix_data::Data::new(server_state.clone()))
      .wrap(tracing_actix_web::TracingLogger::default())
      .configure(move |cfg| configure_app_routes(cfg, &callback_path))
  })
  .bind(&server_address)?
  .run()
  .await;

  tracing::info!("Server stopped; shutting down background tasks.");
  shutdown.cancel();
  let _ = scheduler.await;
  // The worker drains what is queued once every sender is gone.
  drop(app_state);
  if tokio::time::timeout(Duration::from_secs(5), activity_task).await.is_err() {
    tracing::warn!("Activity log worker did not drain in time.");
  }

  result.context("running HTTP server")
}

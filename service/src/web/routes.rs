// service/src/web/routes.rs

use crate::web::handlers::{payment_handlers, reconcile_handlers, shipping_handlers, webhook_handlers};
use actix_web::web;

async fn health_check_handler() -> actix_web::HttpResponse {
  actix_web::HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

/// Mounts every route. `callback_path` is the configured payment callback
/// path, served for both POST and GET.
pub fn configure_app_routes(cfg: &mut web::ServiceConfig, callback_path: &str) {
  cfg
    .route(callback_path, web::post().to(payment_handlers::payment_callback_handler))
    .route(callback_path, web::get().to(payment_handlers::payment_callback_handler))
    .service(
      web::scope("/api/v1")
        .route("/health", web::get().to(health_check_handler))
        .service(
          web::scope("/orders/{order_number}")
            .route("/payment", web::post().to(payment_handlers::initiate_payment_handler))
            .route("/shipment", web::post().to(shipping_handlers::create_shipment_handler))
            .route("/shipment/cancel", web::post().to(shipping_handlers::cancel_shipment_handler))
            .route("/shipment/return", web::post().to(shipping_handlers::create_return_handler)),
        )
        .service(
          web::scope("/webhooks").route("/shipping", web::post().to(webhook_handlers::shipping_webhook_handler)),
        )
        .service(
          web::scope("/shipping")
            .route("/reconcile", web::get().to(reconcile_handlers::trigger_reconciliation_handler))
            .route("/senders", web::post().to(shipping_handlers::register_sender_handler))
            .route(
              "/webhook-deliveries",
              web::get().to(webhook_handlers::list_webhook_deliveries_handler),
            ),
        ),
    );
}

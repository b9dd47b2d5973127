// service/src/lib.rs

//! parcelpay_service: payment and fulfilment orchestration.
//!
//! Payment callbacks, carrier webhooks and the reconciliation scheduler all
//! write orders through the lifecycle store's named transitions; the flows
//! that need several steps run as `parcelpay_flow` pipelines.

pub mod activity;
pub mod cart;
pub mod config;
pub mod errors;
pub mod gateways;
pub mod lifecycle;
pub mod models;
pub mod pipelines;
pub mod reconciliation;
pub mod services;
pub mod state;
pub mod web;

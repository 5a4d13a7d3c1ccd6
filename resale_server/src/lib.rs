//! # Resale ledger server
//! This crate hosts the HTTP front end and the schedulers for the resale ledger. It is responsible for:
//! * Receiving bank transfer notifications from the payment provider and applying them to the ledger.
//! * Exposing the operator actions: renewal retries, supplier round settlement and order cancellation.
//! * Running the daily maintenance job and the advance notices on a local-time schedule.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/webhook/payments`: Bank transfer notifications. Requires a body signature or the API key.
//! * `/api/renewals/retry`, `/api/supplier_rounds/{id}/settle`, `/api/orders/cancel`: Operator actions. Require the
//!   API key.

pub mod capabilities;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod workers;

#[cfg(test)]
mod endpoint_tests;

//! The public engine APIs, built on top of a [`crate::traits::ReconciliationDatabase`] backend.
pub mod capabilities;
pub mod errors;
pub mod maintenance_api;
pub mod notice_api;
pub mod payment_flow_api;
pub mod payment_objects;
pub mod renewal;
pub mod supplier_api;

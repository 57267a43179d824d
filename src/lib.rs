//! Quartel Billing - Membership dues and payment reconciliation
//!
//! This crate subscribes eligible members to monthly dues through an
//! external payment gateway, charges event fees, follows every charge
//! through its lifecycle from gateway webhooks and a periodic
//! reconciliation sweep, and books settled payments exactly once in the
//! community's financial ledger.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

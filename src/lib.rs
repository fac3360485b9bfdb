//! Hookgate - Webhook Ingestion with Daily Rate Limits
//!
//! This crate receives payment (Lemon Squeezy) and identity (Clerk) webhooks
//! and guards them with a per-identifier daily request counter. Counters are
//! bucketed by UTC day, exposed read-only through a status endpoint, and
//! pruned by a periodic retention sweep.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
pub mod relay;
pub mod sweeper;
pub mod webhooks;

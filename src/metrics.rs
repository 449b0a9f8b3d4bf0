//! Prometheus metrics registry and instruments.
//!
//! Handlers and services bump these directly; `/metrics` exposes them.

use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Auth Metrics
    pub static ref LOGINS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("thandal_logins_total", "Total number of completed login callbacks"),
        &["provider", "outcome"]
    ).expect("metric can be created");
    pub static ref USERS_CREATED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("thandal_users_created_total", "Total number of users created on first login"),
        &["provider"]
    ).expect("metric can be created");
    pub static ref ACCOUNT_MERGES_TOTAL: IntCounter = IntCounter::new(
        "thandal_account_merges_total",
        "Total number of provider identities merged into an existing account by email"
    ).expect("metric can be created");

    // Ledger Metrics
    pub static ref TRANSACTIONS_CREATED_TOTAL: IntCounter = IntCounter::new(
        "thandal_transactions_created_total",
        "Total number of transactions recorded"
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("thandal_errors_total", "Total number of error responses"),
        &["error_type"]
    ).expect("metric can be created");
}

static INIT: Once = Once::new();

/// Initialize metrics registry.
///
/// Safe to call more than once; only the first call registers.
pub fn init_metrics() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(LOGINS_TOTAL.clone()))
            .expect("LOGINS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(USERS_CREATED_TOTAL.clone()))
            .expect("USERS_CREATED_TOTAL can be registered");
        REGISTRY
            .register(Box::new(ACCOUNT_MERGES_TOTAL.clone()))
            .expect("ACCOUNT_MERGES_TOTAL can be registered");
        REGISTRY
            .register(Box::new(TRANSACTIONS_CREATED_TOTAL.clone()))
            .expect("TRANSACTIONS_CREATED_TOTAL can be registered");
        REGISTRY
            .register(Box::new(ERRORS_TOTAL.clone()))
            .expect("ERRORS_TOTAL can be registered");

        tracing::info!("Metrics registry initialized");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_metrics();
        init_metrics();

        TRANSACTIONS_CREATED_TOTAL.inc();
        let names: Vec<String> = REGISTRY
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"thandal_transactions_created_total".to_string()));
    }
}

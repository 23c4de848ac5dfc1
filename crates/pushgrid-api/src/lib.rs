//! pushgrid-api — HTTP surface of the push gateway.
//!
//! Maps routes onto the [`MetricStore`] handle. Everything stateful lives
//! behind the store; handlers only build grouping keys, parse payloads
//! and translate results into responses.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | PUT, POST | `/metrics/job/{job}` | Replace the group `{job}` |
//! | PUT, POST | `/metrics/job/{job}/instance/{instance}` | Replace the group `{job, instance}` |
//! | DELETE | `/metrics/job/{job}` | Delete the group `{job}` |
//! | DELETE | `/metrics/job/{job}/instance/{instance}` | Delete the group `{job, instance}` |
//! | GET | `/metrics` | Merged exposition of every group |

pub mod handlers;

use axum::Router;
use axum::routing::{get, put};
use pushgrid_store::MetricStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: MetricStore,
}

/// Build the complete router.
pub fn build_router(store: MetricStore) -> Router {
    let state = ApiState { store };

    Router::new()
        .route("/metrics", get(handlers::scrape))
        .route(
            "/metrics/job/{job}",
            put(handlers::push_job)
                .post(handlers::push_job)
                .delete(handlers::delete_job),
        )
        .route(
            "/metrics/job/{job}/instance/{instance}",
            put(handlers::push_instance)
                .post(handlers::push_instance)
                .delete(handlers::delete_instance),
        )
        .with_state(state)
}

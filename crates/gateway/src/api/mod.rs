pub mod auth;
pub mod voice;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::GovernorLayer;

use crate::state::AppState;

/// Build the full API router.
///
/// `/voice/*` carries the expensive, LLM-backed path and is wrapped in a
/// per-IP `tower_governor` rate limiter when `[server.rate_limit]` is
/// configured; `/activity` and `/voice/capabilities` are cheap reads and
/// stay unrestricted. Everything is gated behind the bearer-token
/// middleware unless `VOICE_ORCH_API_TOKEN` is unset (dev mode).
pub fn router(state: AppState) -> Router<AppState> {
    let mut voice = Router::new()
        .route("/voice/query", post(voice::query))
        .route("/voice/query/stream", post(voice::query_stream))
        .route("/voice/confirm", post(voice::confirm));

    if let Some(rate_limit) = &state.config.server.rate_limit {
        let gov_config = GovernorConfigBuilder::default()
            .per_second(rate_limit.requests_per_second)
            .burst_size(rate_limit.burst_size)
            .finish()
            .expect("rate_limit: requests_per_second and burst_size must be > 0");
        voice = voice.layer(GovernorLayer { config: std::sync::Arc::new(gov_config) });
    }

    let rest = Router::new()
        .route("/voice/capabilities", get(voice::capabilities))
        .route("/activity", get(voice::activity));

    voice
        .merge(rest)
        .route_layer(middleware::from_fn_with_state(state, auth::require_api_token))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

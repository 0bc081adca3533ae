//! Observability Metrics
//!
//! Prometheus metrics endpoint for monitoring.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

use avatar_agent_engine::ProcessReport;

use crate::state::AppState;

/// Global Prometheus handle
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize metrics recorder
///
/// Must be called once at startup before recording any metrics.
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    register_default_metrics();

    METRICS_HANDLE.get_or_init(|| handle.clone());
    handle
}

/// Get the global metrics handle
pub fn get_metrics_handle() -> Option<&'static PrometheusHandle> {
    METRICS_HANDLE.get()
}

/// Register default application metrics
fn register_default_metrics() {
    // Session metrics
    gauge!("avatar_agent_sessions_active").set(0.0);
    counter!("avatar_agent_sessions_created_total").absolute(0);

    // Request metrics
    counter!("avatar_agent_requests_total", "endpoint" => "ws").absolute(0);
    counter!("avatar_agent_requests_total", "endpoint" => "turn").absolute(0);

    // Render metrics
    counter!("avatar_agent_segments_total", "outcome" => "completed").absolute(0);
    counter!("avatar_agent_segments_total", "outcome" => "failed").absolute(0);
    histogram!("avatar_agent_render_turn_duration_seconds").record(0.0);

    // Frame relay metrics
    gauge!("avatar_agent_frames_buffered").set(0.0);
    gauge!("avatar_agent_frame_capacity").set(0.0);

    // Error metrics
    counter!("avatar_agent_errors_total", "stage" => "transcription").absolute(0);
    counter!("avatar_agent_errors_total", "stage" => "generation").absolute(0);
    counter!("avatar_agent_errors_total", "stage" => "synthesis").absolute(0);
}

/// Record session created
pub fn record_session_created() {
    counter!("avatar_agent_sessions_created_total").increment(1);
}

/// Record active sessions gauge
pub fn record_active_sessions(count: usize) {
    gauge!("avatar_agent_sessions_active").set(count as f64);
}

/// Record request to endpoint
pub fn record_request(endpoint: &'static str) {
    counter!("avatar_agent_requests_total", "endpoint" => endpoint).increment(1);
}

/// Record the outcome of one render turn
pub fn record_turn(report: &ProcessReport, duration: Duration) {
    let completed = report.completed_count() as u64;
    if completed > 0 {
        counter!("avatar_agent_segments_total", "outcome" => "completed").increment(completed);
    }
    if report.failure.is_some() {
        counter!("avatar_agent_segments_total", "outcome" => "failed").increment(1);
    }
    histogram!("avatar_agent_render_turn_duration_seconds").record(duration.as_secs_f64());
}

/// Record a pipeline-stage error
pub fn record_error(stage: &'static str) {
    counter!("avatar_agent_errors_total", "stage" => stage).increment(1);
}

/// Metrics endpoint handler
///
/// Returns Prometheus-formatted metrics.
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    // Refresh the gauges derived from live state.
    record_active_sessions(state.sessions.count());
    let relay = state.registry.aggregate_status();
    gauge!("avatar_agent_frames_buffered").set(relay.total_occupancy as f64);
    gauge!("avatar_agent_frame_capacity").set(relay.total_capacity as f64);

    match get_metrics_handle() {
        Some(handle) => {
            let metrics = handle.render();
            (
                StatusCode::OK,
                [(
                    header::CONTENT_TYPE,
                    "text/plain; version=0.0.4; charset=utf-8",
                )],
                metrics,
            )
                .into_response()
        }
        None => (StatusCode::SERVICE_UNAVAILABLE, "Metrics not initialized").into_response(),
    }
}

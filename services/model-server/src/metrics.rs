//! Prometheus instruments for the prediction path.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use once_cell::sync::Lazy;
use prometheus::{register_histogram, register_int_counter, register_int_counter_vec, Encoder, Histogram, IntCounter, IntCounterVec, TextEncoder};

pub static PREDICT_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!("mlops_predict_requests_total", "Prediction requests by outcome", &["outcome"])
        .expect("mlops_predict_requests_total registers once")
});

pub static PREDICTED_ROWS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("mlops_predicted_rows_total", "Rows scored by the loaded model").expect("mlops_predicted_rows_total registers once")
});

pub static PREDICT_LATENCY: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!("mlops_predict_latency_seconds", "Time spent in the model's prediction function")
        .expect("mlops_predict_latency_seconds registers once")
});

pub fn record_outcome(outcome: &str) { PREDICT_REQUESTS.with_label_values(&[outcome]).inc(); }

pub async fn metrics_handler() -> Response {
    let families = prometheus::gather();
    let mut buf = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&families, &mut buf) {
        return (StatusCode::INTERNAL_SERVER_ERROR, format!("encode error: {e}")).into_response();
    }
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], buf).into_response()
}

use std::sync::OnceLock;
use std::time::Instant;

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::{HeaderValue, Request, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts as PromOpts, Registry,
    TextEncoder,
};

struct Metrics {
    registry: Registry,
    http_requests_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
    http_in_flight_requests: IntGauge,
    transcriptions_total: IntCounterVec,
}

impl Metrics {
    fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            PromOpts::new(
                "whisper_gateway_http_requests_total",
                "Total HTTP requests served by whisper-gateway-server.",
            ),
            &["status"],
        )?;
        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "whisper_gateway_http_request_duration_seconds",
                "HTTP request latency in seconds.",
            ),
            &["status"],
        )?;
        let http_in_flight_requests = IntGauge::new(
            "whisper_gateway_http_in_flight_requests",
            "Current number of in-flight HTTP requests.",
        )?;
        let transcriptions_total = IntCounterVec::new(
            PromOpts::new(
                "whisper_gateway_transcriptions_total",
                "Transcriptions by the backend that produced or last failed them.",
            ),
            &["backend", "outcome"],
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;
        registry.register(Box::new(http_in_flight_requests.clone()))?;
        registry.register(Box::new(transcriptions_total.clone()))?;

        Ok(Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            http_in_flight_requests,
            transcriptions_total,
        })
    }
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Register every collector. Until this succeeds, recording is a no-op.
pub fn init() -> prometheus::Result<()> {
    if METRICS.get().is_none() {
        let _ = METRICS.set(Metrics::new()?);
    }
    Ok(())
}

/// Transcription outcome for `whisper_gateway_transcriptions_total`.
#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    Ok,
    Fallback,
    Error,
}

impl Outcome {
    fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Fallback => "fallback",
            Self::Error => "error",
        }
    }
}

pub fn record_transcription(backend: &str, outcome: Outcome) {
    if let Some(metrics) = METRICS.get() {
        metrics
            .transcriptions_total
            .with_label_values(&[backend, outcome.as_str()])
            .inc();
    }
}

pub async fn prometheus_metrics() -> Response {
    let Some(metrics) = METRICS.get() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "metrics disabled").into_response();
    };

    let families = metrics.registry.gather();
    let mut buf = Vec::new();
    if TextEncoder::new().encode(&families, &mut buf).is_err() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "failed to encode metrics",
        )
            .into_response();
    }

    (
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
        )],
        buf,
    )
        .into_response()
}

pub async fn track_http_metrics(req: Request<Body>, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str())
        .unwrap_or_else(|| req.uri().path())
        .to_owned();

    let Some(metrics) = METRICS.get() else {
        return next.run(req).await;
    };
    if route == "/metrics" || route == "/health" {
        return next.run(req).await;
    }

    let start = Instant::now();

    metrics.http_in_flight_requests.inc();
    let response = next.run(req).await;
    metrics.http_in_flight_requests.dec();

    let status = response.status().as_u16().to_string();
    metrics
        .http_requests_total
        .with_label_values(&[&status])
        .inc();
    metrics
        .http_request_duration_seconds
        .with_label_values(&[&status])
        .observe(start.elapsed().as_secs_f64());

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exposes_transcription_counter_after_init() -> anyhow::Result<()> {
        init()?;
        init()?;
        record_transcription("local-model", Outcome::Fallback);

        let response = prometheus_metrics().await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let text = String::from_utf8(body.to_vec())?;
        assert!(text.contains(
            "whisper_gateway_transcriptions_total{backend=\"local-model\",outcome=\"fallback\"}"
        ));
        Ok(())
    }
}

//! Status and metrics HTTP endpoint
//!
//! Routes:
//! - GET /api/zones    per-zone snapshot (JSON)
//! - GET /api/summary  status counts and budget (JSON)
//! - GET /metrics      Prometheus text format
//! - GET /health       liveness
//!
//! Uses hyper for the HTTP server. Handlers only take read locks on the registry.

use crate::domain::types::ZoneStatus;
use crate::infra::metrics::{Metrics, MetricsTotals, NUM_BUCKETS, SWEEP_BUCKET_BOUNDS};
use crate::services::rate_budget::RateBudget;
use crate::services::registry::{StatusSummary, ZoneRegistry};
use bytes::Bytes;
use chrono::Utc;
use http_body_util::Full;
use hyper::header::{HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info};

const JSON: &str = "application/json";
const PROMETHEUS_TEXT: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Shared read-only handles served by the endpoint
#[derive(Clone)]
pub struct StatusState {
    pub registry: Arc<RwLock<ZoneRegistry>>,
    pub metrics: Arc<Metrics>,
    pub budget: Arc<Mutex<RateBudget>>,
}

#[derive(Debug, Serialize)]
struct SummaryBody {
    #[serde(flatten)]
    counts: StatusSummary,
    summary: String,
    tokens_available: u32,
    token_capacity: u32,
    generated_at: chrono::DateTime<Utc>,
}

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

fn write_metric(output: &mut String, name: &str, help: &str, typ: MetricType, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name} {val}");
}

/// Write a histogram from non-cumulative bucket counts
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    buckets: &[u64; NUM_BUCKETS],
    sum: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, bound) in SWEEP_BUCKET_BOUNDS.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{le=\"+Inf\"}} {cumulative}");
    let _ = writeln!(output, "{name}_sum {sum}");
    let _ = writeln!(output, "{name}_count {cumulative}");
}

fn write_counters(output: &mut String, totals: &MetricsTotals) {
    let counters: [(&str, &str, u64); 13] = [
        ("zone_monitor_main_sweeps_total", "Main sweeps completed", totals.main_sweeps),
        ("zone_monitor_priority_sweeps_total", "Priority sweeps completed", totals.priority_sweeps),
        ("zone_monitor_fetch_success_total", "Successful zone fetches", totals.fetch_success),
        ("zone_monitor_fetch_failed_total", "Failed zone fetches", totals.fetch_failed),
        ("zone_monitor_fetch_retries_total", "Fetches retried after a transient failure", totals.fetch_retries),
        ("zone_monitor_rate_limited_total", "Fetches rejected by the rate limiter", totals.rate_limited),
        ("zone_monitor_budget_suspensions_total", "Sweeps suspended for a budget reset", totals.budget_suspensions),
        ("zone_monitor_transitions_total", "Committed status transitions", totals.transitions),
        ("zone_monitor_recoveries_total", "Zones back online after an outage", totals.recoveries),
        ("zone_monitor_alerts_sent_total", "Alerts delivered", totals.alerts_sent),
        ("zone_monitor_alerts_skipped_total", "Alerts suppressed by cooldown", totals.alerts_skipped),
        ("zone_monitor_alerts_failed_total", "Alerts no channel could deliver", totals.alerts_failed),
        ("zone_monitor_persistence_errors_total", "Failed state writes", totals.persistence_errors),
    ];
    for (name, help, val) in counters {
        write_metric(output, name, help, MetricType::Counter, val);
    }
}

fn write_zone_gauges(output: &mut String, summary: &StatusSummary, tokens_available: u32) {
    let name = "zone_monitor_zones";
    let _ = writeln!(output, "# HELP {name} Zones by committed status");
    let _ = writeln!(output, "# TYPE {name} gauge");
    for status in ZoneStatus::ALL {
        let _ = writeln!(output, "{name}{{status=\"{}\"}} {}", status.as_str(), summary.count(status));
    }

    write_metric(
        output,
        "zone_monitor_tokens_available",
        "Rate-limit tokens currently available",
        MetricType::Gauge,
        u64::from(tokens_available),
    );
}

/// Format metrics in Prometheus text exposition format
fn format_prometheus_metrics(state: &StatusState) -> String {
    let totals = state.metrics.totals();
    let summary = state.registry.read().status_summary();
    let tokens_available = state.budget.lock().available();
    let mut output = String::with_capacity(4096);

    write_counters(&mut output, &totals);
    write_histogram(
        &mut output,
        "zone_monitor_sweep_duration_ms",
        "Wall-clock sweep duration",
        &totals.sweep_buckets,
        totals.sweep_duration_sum_ms,
    );
    write_zone_gauges(&mut output, &summary, tokens_available);

    output
}

fn respond(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response.headers_mut().insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

fn json_response<T: Serialize>(value: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(body) => respond(StatusCode::OK, JSON, body),
        Err(e) => {
            error!(error = %e, "status_json_encode_failed");
            respond(StatusCode::INTERNAL_SERVER_ERROR, JSON, r#"{"error":"encoding_failed"}"#)
        }
    }
}

/// Route one request. Pure with respect to the network, so it is testable directly.
fn route(method: &Method, path: &str, state: &StatusState) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, "/api/zones") => {
            let zones = state.registry.read().detailed_status(Utc::now());
            json_response(&zones)
        }
        (&Method::GET, "/api/summary") => {
            let counts = state.registry.read().status_summary();
            let (tokens_available, token_capacity) = {
                let budget = state.budget.lock();
                (budget.available(), budget.settings().capacity)
            };
            json_response(&SummaryBody {
                counts,
                summary: counts.to_string(),
                tokens_available,
                token_capacity,
                generated_at: Utc::now(),
            })
        }
        (&Method::GET, "/metrics") => {
            respond(StatusCode::OK, PROMETHEUS_TEXT, format_prometheus_metrics(state))
        }
        (&Method::GET, "/health") => respond(StatusCode::OK, "text/plain", "ok"),
        (_, "/api/zones" | "/api/summary" | "/metrics" | "/health") => {
            respond(StatusCode::METHOD_NOT_ALLOWED, "text/plain", "method not allowed")
        }
        _ => respond(StatusCode::NOT_FOUND, "text/plain", "not found"),
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    state: StatusState,
) -> Result<Response<Full<Bytes>>, Infallible> {
    debug!(method = %req.method(), path = %req.uri().path(), "status_request");
    Ok(route(req.method(), req.uri().path(), &state))
}

/// Serve the status endpoint until shutdown
pub async fn start_status_server(
    port: u16,
    state: StatusState,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(port = %port, "status_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let state = state.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| handle_request(req, state.clone()));

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "status_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "status_accept_error");
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("status_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

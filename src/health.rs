use crate::config::AppConfig;
use crate::state::{AppMetrics, AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = state.get_config();
    let uptime_seconds = state.get_uptime_seconds();
    let active_sessions = state.active_sessions();

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "metrics": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": metrics.error_rate(),
            "active_sessions": active_sessions
        },
        "memory": get_memory_info(),
        "generator": {
            "model": config.generator.model,
            "api_base": config.generator.api_base,
            "api_key_configured": config.generator.api_key.is_some(),
            "timeout_secs": config.generator.timeout_secs
        },
        "system": get_system_status(config, active_sessions)
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    let mut endpoint_stats: Vec<serde_json::Value> = metrics
        .endpoint_metrics
        .iter()
        .map(|(endpoint, metric)| {
            json!({
                "endpoint": endpoint,
                "request_count": metric.request_count,
                "error_count": metric.error_count,
                "error_rate": metric.error_rate(),
                "average_duration_ms": metric.average_duration_ms(),
                "total_duration_ms": metric.total_duration_ms
            })
        })
        .collect();
    endpoint_stats.sort_by(|a, b| a["endpoint"].as_str().cmp(&b["endpoint"].as_str()));

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "overall": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": metrics.error_rate(),
            "requests_per_second": if uptime_seconds > 0 {
                metrics.request_count as f64 / uptime_seconds as f64
            } else {
                0.0
            }
        },
        "sessions": session_metrics(&metrics, state.active_sessions(), state.registry.max_sessions()),
        "endpoints": endpoint_stats,
        "memory": get_memory_info()
    }))
}

fn session_metrics(metrics: &AppMetrics, active: usize, max: usize) -> serde_json::Value {
    json!({
        "active": active,
        "max_concurrent_sessions": max,
        "started": metrics.sessions_started,
        "completed": metrics.sessions_completed,
        "turns_completed": metrics.turns_completed,
        "generator_failures": metrics.generator_failures,
        "generator_failure_rate": metrics.generator_failure_rate(),
        "malformed_messages": metrics.malformed_messages
    })
}

fn get_memory_info() -> serde_json::Value {
    #[cfg(target_os = "linux")]
    {
        let pid = std::process::id();
        if let Ok(status) = std::fs::read_to_string(format!("/proc/{}/status", pid)) {
            let mut vm_rss = 0;
            let mut vm_size = 0;

            for line in status.lines() {
                if line.starts_with("VmRSS:") {
                    vm_rss = parse_kb(line);
                } else if line.starts_with("VmSize:") {
                    vm_size = parse_kb(line);
                }
            }

            return json!({
                "resident_memory_bytes": vm_rss,
                "virtual_memory_bytes": vm_size,
                "available": true
            });
        }
    }

    json!({
        "resident_memory_bytes": 0,
        "virtual_memory_bytes": 0,
        "available": false,
        "note": "Memory info not available on this platform"
    })
}

/// Parse a `/proc/<pid>/status` line like `VmRSS:   1234 kB` into bytes.
fn parse_kb(line: &str) -> u64 {
    line.split_whitespace()
        .nth(1)
        .and_then(|kb| kb.parse::<u64>().ok())
        .unwrap_or(0)
        * 1024
}

fn get_system_status(config: &AppConfig, active_sessions: usize) -> serde_json::Value {
    let max_sessions = config.session.max_concurrent_sessions;
    let session_usage = if max_sessions > 0 {
        active_sessions as f64 / max_sessions as f64
    } else {
        0.0
    };

    let status = if session_usage > 0.9 {
        "high_load"
    } else if session_usage > 0.7 {
        "moderate_load"
    } else {
        "normal"
    };

    let mut warnings = Vec::new();
    if session_usage > 0.8 {
        warnings.push("High session usage - consider increasing max_concurrent_sessions");
    }
    if config.generator.api_key.is_none() {
        warnings.push("No generator API key configured - every reply will be the fallback");
    }

    json!({
        "status": status,
        "session_usage_percent": (session_usage * 100.0).round(),
        "max_sessions": max_sessions,
        "current_sessions": active_sessions,
        "load_warnings": warnings
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::test_state;
    use actix_web::{test, App};

    #[std::prelude::v1::test]
    fn test_parse_kb() {
        assert_eq!(parse_kb("VmRSS:\t   2048 kB"), 2048 * 1024);
        assert_eq!(parse_kb("VmRSS:"), 0);
    }

    #[std::prelude::v1::test]
    fn test_system_status_thresholds() {
        let mut config = AppConfig::default();
        config.session.max_concurrent_sessions = 10;
        config.generator.api_key = Some("key".to_string());

        assert_eq!(get_system_status(&config, 1)["status"], "normal");
        assert_eq!(get_system_status(&config, 8)["status"], "moderate_load");

        let high = get_system_status(&config, 10);
        assert_eq!(high["status"], "high_load");
        assert_eq!(high["load_warnings"].as_array().unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn test_health_reports_sessions() {
        let state = web::Data::new(test_state());
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .route("/health", web::get().to(health_check)),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["status"], "healthy");
        assert_eq!(body["metrics"]["active_sessions"], 0);
        assert_eq!(body["system"]["max_sessions"], 2);
        assert_eq!(body["generator"]["model"], "llama-3.3-70b-versatile");
    }
}

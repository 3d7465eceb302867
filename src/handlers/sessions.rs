//! Read-only views over live and finished interview sessions.

use crate::error::{AppError, AppResult};
use crate::session::SessionSummary;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

const DEFAULT_RECENT_LIMIT: usize = 10;

#[derive(Debug, Deserialize)]
pub struct SessionsQuery {
    /// How many finished sessions to include
    pub recent: Option<usize>,
}

fn finished_entry(summary: &SessionSummary) -> serde_json::Value {
    json!({
        "session_id": summary.params.session_id,
        "category": summary.params.category,
        "difficulty": summary.params.difficulty,
        "topic": summary.params.topic,
        "started_at": summary.started_at.to_rfc3339(),
        "ended_at": summary.ended_at.to_rfc3339(),
        "duration_seconds": summary.duration_seconds(),
        "turns": summary.stats.turns_completed,
        "generator_failures": summary.stats.generator_failures,
    })
}

/// GET /api/v1/sessions
pub async fn list_sessions(
    state: web::Data<AppState>,
    query: web::Query<SessionsQuery>,
) -> HttpResponse {
    let limit = query.recent.unwrap_or(DEFAULT_RECENT_LIMIT);
    let active = state.registry.list();
    let finished: Vec<serde_json::Value> = state
        .sessions
        .archive
        .recent(limit)
        .await
        .iter()
        .map(finished_entry)
        .collect();

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "active_count": active.len(),
        "max_sessions": state.registry.max_sessions(),
        "active": active,
        "recent": finished,
    }))
}

/// GET /api/v1/sessions/{id}/transcript
///
/// Only finished sessions are available; a live transcript is owned by its
/// session until the connection ends.
pub async fn get_transcript(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let session_id = path.into_inner();

    let summary = state
        .sessions
        .archive
        .get(&session_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("No finished session '{}'", session_id)))?;

    Ok(HttpResponse::Ok().json(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interview::SessionParams;
    use crate::session::supervisor::tests::summary_for;
    use crate::state::tests::test_state;
    use actix_web::{http::StatusCode, test, App};

    fn routes(cfg: &mut web::ServiceConfig) {
        cfg.route("/api/v1/sessions", web::get().to(list_sessions))
            .route("/api/v1/sessions/{id}/transcript", web::get().to(get_transcript));
    }

    #[actix_web::test]
    async fn test_list_includes_active_and_recent() {
        let state = web::Data::new(test_state());
        let params = SessionParams::from_query("live", Some("system_design"), None, None).unwrap();
        let _lease = state.registry.register(&params).unwrap();
        state.sessions.archive.store(summary_for("done")).await;

        let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;
        let req = test::TestRequest::get().uri("/api/v1/sessions").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["active_count"], 1);
        assert_eq!(body["active"][0]["session_id"], "live");
        assert_eq!(body["active"][0]["category"], "system_design");
        assert_eq!(body["active"][0]["phase"], "connecting");
        assert_eq!(body["recent"][0]["session_id"], "done");
    }

    #[actix_web::test]
    async fn test_transcript_of_finished_session() {
        let state = web::Data::new(test_state());
        let mut summary = summary_for("done");
        summary.transcript.push_assistant("Hello");
        summary.transcript.push_user("Hi");
        state.sessions.archive.store(summary).await;

        let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;

        let req = test::TestRequest::get()
            .uri("/api/v1/sessions/done/transcript")
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["transcript"][0]["role"], "assistant");
        assert_eq!(body["transcript"][1]["content"], "Hi");
        assert_eq!(body["params"]["category"], "technical");

        let req = test::TestRequest::get()
            .uri("/api/v1/sessions/missing/transcript")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}

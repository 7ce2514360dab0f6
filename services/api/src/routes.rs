use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use chrono::{Local, NaiveDate};
use semaforo::defense::{
    ActType, DefenseCase, DefenseCaseId, DefenseRepository, DefenseStatus, RequiredDocument,
};
use semaforo::evaluation::{AnswerValue, HardBlockFlags};
use semaforo::ledger::{CaseId, Decision};
use semaforo::learning::ObservedOutcome;
use serde::Deserialize;
use serde_json::json;

use crate::error::AppError;
use crate::infra::{next_defense_id, AppState, Services};

#[derive(Debug, Deserialize)]
pub(crate) struct UpsertAnswerRequest {
    pub(crate) value: AnswerValue,
    #[serde(default)]
    pub(crate) hard_blocks: HardBlockFlags,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EvaluateRequest {
    pub(crate) answers: BTreeMap<String, AnswerValue>,
    #[serde(default)]
    pub(crate) hard_blocks: HardBlockFlags,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CloseCaseRequest {
    pub(crate) decision: Decision,
    pub(crate) reasoning: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenDefenseRequest {
    #[serde(default)]
    pub(crate) linked_case_ids: Vec<String>,
    pub(crate) act_type: ActType,
    pub(crate) notification_date: NaiveDate,
    #[serde(default)]
    pub(crate) required_documents: Vec<RequiredDocument>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AdvanceDefenseRequest {
    pub(crate) to: DefenseStatus,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MarkDocumentRequest {
    pub(crate) available: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RecordOutcomeRequest {
    pub(crate) case_id: String,
    pub(crate) outcome: ObservedOutcome,
    pub(crate) was_correct: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeadlineQuery {
    pub(crate) today: Option<NaiveDate>,
}

/// Engine routes plus the operational endpoints shared by every service.
pub(crate) fn with_service_routes(services: Arc<Services>) -> Router {
    api_router(services)
        .route("/health/live", get(liveness_endpoint))
        .route("/health/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

pub(crate) fn api_router(services: Arc<Services>) -> Router {
    Router::new()
        .route("/api/v1/cases", post(open_case))
        .route("/api/v1/cases/:case_id", get(case_status))
        .route(
            "/api/v1/cases/:case_id/answers/:question_id",
            put(upsert_answer),
        )
        .route("/api/v1/cases/:case_id/evaluate", post(evaluate_case))
        .route("/api/v1/cases/:case_id/close", post(close_case))
        .route("/api/v1/defenses", post(open_defense))
        .route("/api/v1/defenses/:defense_id/advance", post(advance_defense))
        .route(
            "/api/v1/defenses/:defense_id/documents/:code",
            put(mark_document),
        )
        .route("/api/v1/defenses/:defense_id/deadline", get(defense_deadline))
        .route("/api/v1/catalog", post(activate_catalog).get(export_catalog))
        .route("/api/v1/outcomes", post(record_outcome))
        .with_state(services)
}

async fn open_case(
    State(services): State<Arc<Services>>,
    Json(request): Json<semaforo::ledger::OpenCaseRequest>,
) -> Result<impl IntoResponse, AppError> {
    let case = services.ledger.open(request)?;
    let view = services.ledger.status_view(&case.id)?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn case_status(
    State(services): State<Arc<Services>>,
    Path(case_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let view = services.ledger.status_view(&CaseId(case_id))?;
    Ok(Json(view))
}

async fn upsert_answer(
    State(services): State<Arc<Services>>,
    Path((case_id, question_id)): Path<(String, String)>,
    Json(request): Json<UpsertAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = services.ledger.upsert_answer(
        &CaseId(case_id),
        &question_id,
        request.value,
        &request.hard_blocks,
    )?;
    Ok(Json(outcome))
}

async fn evaluate_case(
    State(services): State<Arc<Services>>,
    Path(case_id): Path<String>,
    Json(request): Json<EvaluateRequest>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = services.ledger.evaluate(
        &CaseId(case_id),
        request.answers.into_iter().collect(),
        &request.hard_blocks,
    )?;
    Ok(Json(outcome))
}

async fn close_case(
    State(services): State<Arc<Services>>,
    Path(case_id): Path<String>,
    Json(request): Json<CloseCaseRequest>,
) -> Result<impl IntoResponse, AppError> {
    let case_id = CaseId(case_id);
    services
        .ledger
        .close(&case_id, request.decision, request.reasoning)?;
    let view = services.ledger.status_view(&case_id)?;
    Ok(Json(view))
}

async fn open_defense(
    State(services): State<Arc<Services>>,
    Json(request): Json<OpenDefenseRequest>,
) -> Result<impl IntoResponse, AppError> {
    let case = DefenseCase::open(
        next_defense_id(),
        request.linked_case_ids.into_iter().map(CaseId).collect(),
        request.act_type,
        request.notification_date,
        request.required_documents,
    );
    services.defenses.insert(case.clone())?;
    Ok((StatusCode::CREATED, Json(case)))
}

async fn advance_defense(
    State(services): State<Arc<Services>>,
    Path(defense_id): Path<String>,
    Json(request): Json<AdvanceDefenseRequest>,
) -> Result<impl IntoResponse, AppError> {
    let updated = services
        .defenses
        .with_case(&DefenseCaseId(defense_id), |case| {
            case.advance(request.to).map(|()| case.clone())
        })??;
    Ok(Json(updated))
}

async fn mark_document(
    State(services): State<Arc<Services>>,
    Path((defense_id, code)): Path<(String, String)>,
    Json(request): Json<MarkDocumentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let updated = services
        .defenses
        .with_case(&DefenseCaseId(defense_id), |case| {
            case.mark_document(&code, request.available)
                .map(|()| case.clone())
        })??;
    Ok(Json(updated))
}

async fn defense_deadline(
    State(services): State<Arc<Services>>,
    Path(defense_id): Path<String>,
    Query(query): Query<DeadlineQuery>,
) -> Result<impl IntoResponse, AppError> {
    let id = DefenseCaseId(defense_id);
    let case = services
        .defenses
        .fetch(&id)?
        .ok_or(AppError::Repository(
            semaforo::ledger::RepositoryError::NotFound,
        ))?;
    let today = query.today.unwrap_or_else(|| Local::now().date_naive());
    Ok(Json(case.deadline_summary(today)))
}

async fn activate_catalog(
    State(services): State<Arc<Services>>,
    body: String,
) -> Result<impl IntoResponse, AppError> {
    let version = services.catalog.activate_json(&body)?;
    Ok(Json(json!({ "version": version })))
}

async fn export_catalog(State(services): State<Arc<Services>>) -> impl IntoResponse {
    Json((*services.catalog.current()).clone())
}

async fn record_outcome(
    State(services): State<Arc<Services>>,
    Json(request): Json<RecordOutcomeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let profile = services.learner.record_outcome(
        &CaseId(request.case_id),
        request.outcome,
        request.was_correct,
    )?;
    Ok(Json(profile))
}

async fn liveness_endpoint() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::default_catalog;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    fn build_router() -> Router {
        let services = Services::in_memory(default_catalog()).expect("builtin catalog valid");
        api_router(services)
    }

    async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&value).expect("serialize body"))
            }
            None => Body::empty(),
        };
        let response = router
            .clone()
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("router dispatch");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("body");
        let payload = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json")
        };
        (status, payload)
    }

    fn open_case_body() -> Value {
        json!({
            "subject_id": "op-7781",
            "industry": "professional_services",
            "service_type": "consulting",
            "amount": 1_200_000.0,
            "counterparty_id": "cp-042"
        })
    }

    fn positive_answers_body() -> Value {
        json!({
            "answers": {
                "doc-01": { "selection": 0 },
                "doc-02": { "selection": 0 },
                "fin-01": { "selection": 0 },
                "fin-02": { "numeric": 1_200_000.0 },
                "del-01": { "selections": [0, 1] },
                "del-02": { "selection": 0 },
                "com-01": { "selection": 0 },
                "mat-01": { "selection": 1 },
                "mat-02": { "selection": 0 },
                "biz-01": { "text": "Market entry analysis ahead of a planned expansion" },
                "biz-02": { "numeric": 40.0 }
            }
        })
    }

    async fn open_case(router: &Router) -> String {
        let (status, payload) = send(router, "POST", "/api/v1/cases", Some(open_case_body())).await;
        assert_eq!(status, StatusCode::CREATED);
        payload
            .get("case_id")
            .and_then(Value::as_str)
            .expect("case id present")
            .to_string()
    }

    #[tokio::test]
    async fn post_cases_returns_created_with_an_initial_red_verdict() {
        let router = build_router();
        let (status, payload) =
            send(&router, "POST", "/api/v1/cases", Some(open_case_body())).await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(payload.get("semaphore"), Some(&json!("red")));
        assert_eq!(payload.get("status"), Some(&json!("in_progress")));
        assert!(!payload["open_critical_gaps"]
            .as_array()
            .expect("gaps array")
            .is_empty());
    }

    #[tokio::test]
    async fn put_answer_reports_the_triggered_escalation() {
        let router = build_router();
        let case_id = open_case(&router).await;

        let (status, payload) = send(
            &router,
            "PUT",
            &format!("/api/v1/cases/{case_id}/answers/mat-01"),
            Some(json!({ "value": { "selection": 3 } })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.get("is_red_flag"), Some(&json!(true)));
        assert_eq!(payload.get("semaphore"), Some(&json!("red")));
    }

    #[tokio::test]
    async fn put_answer_rejects_unknown_questions() {
        let router = build_router();
        let case_id = open_case(&router).await;

        let (status, _) = send(
            &router,
            "PUT",
            &format!("/api/v1/cases/{case_id}/answers/zzz-99"),
            Some(json!({ "value": { "selection": 0 } })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn get_missing_case_returns_not_found() {
        let router = build_router();
        let (status, _) = send(&router, "GET", "/api/v1/cases/case-999999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn close_with_open_critical_gaps_conflicts() {
        let router = build_router();
        let case_id = open_case(&router).await;

        let (status, payload) = send(
            &router,
            "POST",
            &format!("/api/v1/cases/{case_id}/close"),
            Some(json!({ "decision": "approve", "reasoning": "premature" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(payload
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .contains("critical"));
    }

    #[tokio::test]
    async fn full_case_lifecycle_reaches_green_and_feeds_learning() {
        let router = build_router();
        let case_id = open_case(&router).await;

        let (status, payload) = send(
            &router,
            "POST",
            &format!("/api/v1/cases/{case_id}/evaluate"),
            Some(positive_answers_body()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            payload.pointer("/verdict/color"),
            Some(&json!("green"))
        );

        let (status, payload) = send(
            &router,
            "POST",
            &format!("/api/v1/cases/{case_id}/close"),
            Some(json!({ "decision": "approve", "reasoning": "complete evidence" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.get("status"), Some(&json!("approved")));

        let (status, payload) = send(
            &router,
            "POST",
            "/api/v1/outcomes",
            Some(json!({
                "case_id": case_id,
                "outcome": "favorable",
                "was_correct": true
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.get("total_cases"), Some(&json!(1)));
        assert_eq!(payload.get("approved_cases"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn recording_an_outcome_for_an_open_case_conflicts() {
        let router = build_router();
        let case_id = open_case(&router).await;

        let (status, _) = send(
            &router,
            "POST",
            "/api/v1/outcomes",
            Some(json!({
                "case_id": case_id,
                "outcome": "favorable",
                "was_correct": true
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn catalog_can_be_exported_and_replaced() {
        let router = build_router();

        let (status, payload) = send(&router, "GET", "/api/v1/catalog", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.get("version"), Some(&json!("builtin-2026.1")));

        let mut replacement = payload.clone();
        replacement["version"] = json!("override-2026.2");
        let (status, payload) =
            send(&router, "POST", "/api/v1/catalog", Some(replacement)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.get("version"), Some(&json!("override-2026.2")));

        let (status, payload) = send(&router, "GET", "/api/v1/catalog", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.get("version"), Some(&json!("override-2026.2")));
    }

    #[tokio::test]
    async fn invalid_catalog_is_refused_and_the_active_one_survives() {
        let router = build_router();

        let (_, mut broken) = send(&router, "GET", "/api/v1/catalog", None).await;
        broken["version"] = json!("broken");
        broken["weights"]["insufficient_threshold"] = json!(90.0);

        let (status, _) = send(&router, "POST", "/api/v1/catalog", Some(broken)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (_, payload) = send(&router, "GET", "/api/v1/catalog", None).await;
        assert_eq!(payload.get("version"), Some(&json!("builtin-2026.1")));
    }

    #[tokio::test]
    async fn defense_deadline_flow_over_business_days() {
        let router = build_router();

        let (status, payload) = send(
            &router,
            "POST",
            "/api/v1/defenses",
            Some(json!({
                "linked_case_ids": [],
                "act_type": "electronic_review",
                "notification_date": "2026-02-02",
                "required_documents": [
                    { "code": "contract", "priority": "critical", "available": false }
                ]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(payload.get("deadline"), Some(&json!("2026-02-23")));
        let defense_id = payload
            .get("id")
            .and_then(Value::as_str)
            .expect("defense id")
            .to_string();

        let (status, payload) = send(
            &router,
            "GET",
            &format!("/api/v1/defenses/{defense_id}/deadline?today=2026-02-16"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.get("business_days_remaining"), Some(&json!(5)));
        assert_eq!(payload.get("urgency"), Some(&json!("high")));
        assert_eq!(payload.get("documents_ready"), Some(&json!(0)));

        let (status, payload) = send(
            &router,
            "PUT",
            &format!("/api/v1/defenses/{defense_id}/documents/contract"),
            Some(json!({ "available": true })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            payload.pointer("/required_documents/0/available"),
            Some(&json!(true))
        );

        let (status, _) = send(
            &router,
            "POST",
            &format!("/api/v1/defenses/{defense_id}/advance"),
            Some(json!({ "to": "analyzing" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            &router,
            "POST",
            &format!("/api/v1/defenses/{defense_id}/advance"),
            Some(json!({ "to": "filed" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}

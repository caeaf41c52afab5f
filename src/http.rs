//! Inbound HTTP boundary.
//!
//! Thin adapter only: accepts a new email and forwards it to
//! `WorkflowService::start_workflow`; accepts an operator chat turn, extracts
//! `[email-id/question-id] answer` lines (this layer owns that format),
//! groups them by email, and calls `continue_workflow` once per group.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::notify::UserMessenger;
use crate::stores::ConversationStore;
use crate::workflow::WorkflowService;
use crate::workflow::engine::DriveOutcome;
use crate::workflow::types::{Email, QuestionAnswer};

/// Shared state for the HTTP boundary.
pub struct AppState {
    pub service: Arc<WorkflowService>,
    pub conversations: Arc<dyn ConversationStore>,
    pub messenger: Arc<UserMessenger>,
}

/// Build the router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/emails", post(submit_email))
        .route("/api/emails/{id}/status", get(email_status))
        .route("/api/conversations/{id}/turns", post(operator_turn))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
        .with_state(state)
}

/// Serve the boundary on `port` until the process exits.
pub async fn serve(state: Arc<AppState>, port: u16) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "HTTP boundary listening");
    axum::serve(listener, router(state)).await
}

// ── Requests / responses ────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub email_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct TurnResponse {
    /// The support agent's chat response, when one could be produced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assistant: Option<String>,
    /// One entry per email whose run was resumed by this turn.
    pub resumed: Vec<RunResponse>,
    /// Answer lines that matched no known format.
    pub unparsed_lines: usize,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub email_id: String,
    pub status: String,
}

fn run_response(email_id: &str, outcome: &DriveOutcome) -> RunResponse {
    RunResponse {
        email_id: email_id.to_string(),
        status: outcome.status.to_string(),
        reply: outcome.reply.clone(),
    }
}

fn internal_error(e: impl std::fmt::Display) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

// ── Handlers ────────────────────────────────────────────────────────

async fn submit_email(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EmailRequest>,
) -> Result<Json<RunResponse>, (StatusCode, String)> {
    let email = Email {
        id: request.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        from: request.from,
        to: request.to,
        subject: request.subject,
        body: request.body,
    };
    let email_id = email.id.clone();

    let outcome = state
        .service
        .start_workflow(email)
        .await
        .map_err(internal_error)?;
    Ok(Json(run_response(&email_id, &outcome)))
}

async fn email_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, (StatusCode, String)> {
    let status = state.service.status(&id).await.map_err(internal_error)?;
    Ok(Json(StatusResponse {
        email_id: id,
        status: status.to_string(),
    }))
}

async fn operator_turn(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<String>,
    Json(request): Json<TurnRequest>,
) -> Result<Json<TurnResponse>, (StatusCode, String)> {
    let (answers, unparsed_lines) = extract_answers(&request.text);

    // The support agent's chat response is best-effort: a failure here must
    // not block workflow resumption.
    let assistant = match state
        .messenger
        .handle_user_message(&conversation_id, &request.text)
        .await
    {
        Ok(text) => Some(text),
        Err(e) => {
            warn!(conversation = %conversation_id, error = %e, "Support chat turn failed");
            None
        }
    };

    // Update the operator's backlog record first, then resume each affected
    // run with its group of answers.
    for qa in &answers {
        state
            .conversations
            .answer_question(
                &conversation_id,
                &qa.email_id,
                &qa.question_id,
                qa.answer.as_deref().unwrap_or_default(),
            )
            .await
            .map_err(internal_error)?;
    }

    let mut resumed = Vec::new();
    for (email_id, group) in group_by_email(answers) {
        if let Some(outcome) = state
            .service
            .continue_workflow(&email_id, group)
            .await
            .map_err(internal_error)?
        {
            resumed.push(run_response(&email_id, &outcome));
        }
    }

    Ok(Json(TurnResponse {
        assistant,
        resumed,
        unparsed_lines,
    }))
}

// ── Turn parsing ────────────────────────────────────────────────────

/// Extract `[email-id/question-id] answer` lines from a chat turn.
///
/// Returns the parsed answers and the number of non-empty lines that did
/// not match.
fn extract_answers(text: &str) -> (Vec<QuestionAnswer>, usize) {
    static PATTERN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"^\s*\[([^\]/]+)/([^\]]+)\]\s*(.+)$").expect("answer pattern is valid")
    });

    let mut answers = Vec::new();
    let mut unparsed = 0usize;
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match pattern.captures(line) {
            Some(caps) => answers.push(QuestionAnswer {
                email_id: caps[1].trim().to_string(),
                question_id: caps[2].trim().to_string(),
                question: String::new(),
                answer: Some(caps[3].trim().to_string()),
            }),
            None => unparsed += 1,
        }
    }
    (answers, unparsed)
}

/// Group answers by email id, preserving a stable order.
fn group_by_email(answers: Vec<QuestionAnswer>) -> BTreeMap<String, Vec<QuestionAnswer>> {
    let mut groups: BTreeMap<String, Vec<QuestionAnswer>> = BTreeMap::new();
    for qa in answers {
        groups.entry(qa.email_id.clone()).or_default().push(qa);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_answer_lines() {
        let text = "Here you go:\n[e1/q1] the premium plan\n[e1/q2] Firefox\n[e2/q9] yes\n";
        let (answers, unparsed) = extract_answers(text);

        assert_eq!(answers.len(), 3);
        assert_eq!(unparsed, 1); // "Here you go:"
        assert_eq!(answers[0].email_id, "e1");
        assert_eq!(answers[0].question_id, "q1");
        assert_eq!(answers[0].answer.as_deref(), Some("the premium plan"));
    }

    #[test]
    fn groups_by_email_id() {
        let text = "[e1/q1] a\n[e2/q2] b\n[e1/q3] c\n";
        let (answers, _) = extract_answers(text);
        let groups = group_by_email(answers);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups["e1"].len(), 2);
        assert_eq!(groups["e2"].len(), 1);
    }

    #[test]
    fn blank_lines_are_ignored() {
        let (answers, unparsed) = extract_answers("\n\n[e1/q1] fine\n\n");
        assert_eq!(answers.len(), 1);
        assert_eq!(unparsed, 0);
    }

    #[test]
    fn uuid_question_ids_parse() {
        let text = "[email-7/4f3c2a1b-aaaa-bbbb-cccc-000000000000] forty-two";
        let (answers, _) = extract_answers(text);
        assert_eq!(answers.len(), 1);
        assert_eq!(
            answers[0].question_id,
            "4f3c2a1b-aaaa-bbbb-cccc-000000000000"
        );
    }
}

//! Orchestration Facade (C10): the single entry point a voice turn goes
//! through, tying the Conversation Store, Planner, Connection Manager, and
//! Executor together and streaming typed progress back to the caller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::timeout;

use vco_domain::error::Error;
use vco_domain::ids::{SessionId, UserId};
use vco_domain::plan::StepResult;
use vco_domain::progress::{OrchestrationResult, ProgressEvent};
use vco_domain::session::SessionMode;
use vco_domain::Result;
use vco_executor::ExecutionOutcome;
use vco_planner::intent::{self, IntentType};
use vco_planner::synthesize;

use crate::registry_snapshot;
use crate::state::AppState;

/// Hard ceiling on a single voice turn, from query received to `done` event.
const PLAN_DEADLINE: Duration = Duration::from_secs(60);
const CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub mode: SessionMode,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self { mode: SessionMode::Continuous }
    }
}

struct InFlightGuard {
    state: Arc<AppState>,
    session_id: SessionId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.state.in_flight_sessions.lock().remove(&self.session_id);
    }
}

fn error_code(err: &Error) -> &'static str {
    match err {
        Error::Io(_) => "IO_ERROR",
        Error::Json(_) => "JSON_ERROR",
        Error::Http(_) => "HTTP_ERROR",
        Error::AuthMissing { .. } => "AUTH_MISSING",
        Error::AuthExpired { .. } => "AUTH_EXPIRED",
        Error::TransportError { .. } => "TRANSPORT_ERROR",
        Error::SessionEvicted { .. } => "SESSION_EVICTED",
        Error::BadArgument(_) => "BAD_ARGUMENT",
        Error::ToolFailure(_) => "TOOL_FAILURE",
        Error::PlanMalformed(_) => "PLAN_MALFORMED",
        Error::Timeout(_) => "TIMEOUT",
        Error::ConfirmationRequired { .. } => "CONFIRMATION_REQUIRED",
        Error::ManualApprovalRequired { .. } => "MANUAL_APPROVAL_REQUIRED",
        Error::NotConnected { .. } => "NOT_CONNECTED",
        Error::Provider { .. } => "PROVIDER_ERROR",
        Error::Config(_) => "CONFIG_ERROR",
        Error::Other(_) => "OTHER",
    }
}

fn failed_result() -> OrchestrationResult {
    OrchestrationResult {
        success: false,
        reply: None,
        clarification_question: None,
        pending_confirmation_id: None,
        data: None,
    }
}

fn summarize_results(results: &[StepResult], success: bool) -> String {
    if !success {
        let reason = results
            .iter()
            .rev()
            .find_map(|r| r.error.as_deref())
            .unwrap_or("the request could not be completed");
        return format!("I couldn't finish that: {reason}.");
    }
    match results.len() {
        0 => "Done.".to_owned(),
        1 => "Done — that's taken care of.".to_owned(),
        n => format!("Done — completed {n} steps."),
    }
}

/// Run one voice turn to completion (or to a clarification / confirmation
/// stopping point), streaming progress over the returned channel. The final
/// event sent is always exactly one `Done`.
pub fn process_query(
    state: Arc<AppState>,
    user: UserId,
    query: String,
    opts: QueryOptions,
) -> mpsc::Receiver<ProgressEvent> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let outcome = timeout(PLAN_DEADLINE, run_turn(&state, &user, &query, opts, &tx)).await;

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::warn!(user = %user, error = %e, "voice turn failed");
                tx.send(ProgressEvent::Error { code: error_code(&e).to_owned(), message: e.to_string() })
                    .await
                    .ok();
                failed_result()
            }
            Err(_) => {
                tracing::warn!(user = %user, "voice turn exceeded the 60s deadline");
                tx.send(ProgressEvent::Error {
                    code: "TIMEOUT".to_owned(),
                    message: "the request took too long and was cancelled".to_owned(),
                })
                .await
                .ok();
                failed_result()
            }
        };

        tx.send(ProgressEvent::Done { result }).await.ok();
    });

    rx
}

async fn run_turn(
    state: &Arc<AppState>,
    user: &UserId,
    query: &str,
    opts: QueryOptions,
    progress: &mpsc::Sender<ProgressEvent>,
) -> Result<OrchestrationResult> {
    let started = Instant::now();
    let session = state.sessions.get_or_create_active(user, opts.mode)?;

    if !state.in_flight_sessions.lock().insert(session.session_id.clone()) {
        return Err(Error::Other(format!(
            "a plan is already in progress for session '{}'",
            session.session_id
        )));
    }
    let _guard = InFlightGuard { state: state.clone(), session_id: session.session_id.clone() };

    let context = state.sessions.build_context(&session.session_id)?;

    progress.send(ProgressEvent::Phase { name: "analyzing".to_owned() }).await.ok();
    let intent = intent::route_intent(&state.llm, query, &context).await?;

    if intent.intent_type == IntentType::Conversational {
        let reply = intent::conversational_reply(&state.llm, query, &context).await?;
        state.sessions.append_turn(
            &session.session_id,
            query.to_owned(),
            reply.clone(),
            None,
            started.elapsed().as_millis() as u64,
        )?;
        return Ok(OrchestrationResult::reply(reply));
    }

    progress.send(ProgressEvent::Phase { name: "discovering".to_owned() }).await.ok();
    let (snapshot, connected) =
        registry_snapshot::build(&state.connections, &state.config.connections, user).await;

    if connected == 0 {
        let question =
            "I'm not connected to any services yet — connect one in settings and try again.";
        state.sessions.append_turn(
            &session.session_id,
            query.to_owned(),
            question.to_owned(),
            None,
            started.elapsed().as_millis() as u64,
        )?;
        return Ok(OrchestrationResult::clarification(question));
    }

    progress.send(ProgressEvent::Phase { name: "selecting".to_owned() }).await.ok();
    let plan = synthesize::synthesize_plan(&state.llm, &snapshot, query, &context).await?;

    if plan.needs_clarification {
        let question = plan
            .clarification_question
            .clone()
            .unwrap_or_else(|| "Could you say that a different way?".to_owned());
        state.sessions.append_turn(
            &session.session_id,
            query.to_owned(),
            question.clone(),
            None,
            started.elapsed().as_millis() as u64,
        )?;
        return Ok(OrchestrationResult::clarification(question));
    }

    progress.send(ProgressEvent::Phase { name: "executing".to_owned() }).await.ok();
    let outcome = state.executor.execute_plan(user, &plan, query, &context, progress).await?;

    match outcome {
        ExecutionOutcome::ConfirmationRequired { confirmation_id, summary, .. } => {
            state.sessions.append_turn(
                &session.session_id,
                query.to_owned(),
                summary,
                None,
                started.elapsed().as_millis() as u64,
            )?;
            Ok(OrchestrationResult::pending_confirmation(confirmation_id))
        }
        ExecutionOutcome::Completed { results, success } => {
            let reply = summarize_results(&results, success);
            let tool_results = serde_json::to_value(&results).ok();
            state.sessions.append_turn(
                &session.session_id,
                query.to_owned(),
                reply.clone(),
                tool_results.clone(),
                started.elapsed().as_millis() as u64,
            )?;
            Ok(OrchestrationResult {
                success,
                reply: Some(reply),
                clarification_question: None,
                pending_confirmation_id: None,
                data: tool_results,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_covers_taxonomy() {
        assert_eq!(error_code(&Error::Timeout(Duration::from_secs(60))), "TIMEOUT");
        assert_eq!(
            error_code(&Error::AuthMissing { provider: "calendar".into() }),
            "AUTH_MISSING"
        );
    }

    #[test]
    fn summary_reports_failure_reason() {
        let results = vec![StepResult::err("calendar", "create_event", "event not found", 5)];
        let summary = summarize_results(&results, false);
        assert!(summary.contains("event not found"));
    }

    #[test]
    fn summary_counts_successful_steps() {
        let results = vec![
            StepResult::ok("calendar", "create_event", serde_json::json!({}), 5),
            StepResult::ok("calendar", "create_event", serde_json::json!({}), 5),
        ];
        let summary = summarize_results(&results, true);
        assert!(summary.contains('2'));
    }
}

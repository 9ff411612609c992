//! Executor (C9): carries out a synthesized `Plan` step by step against
//! connected providers, resolving template references, fanning out
//! iterated steps, and gating risky steps behind a confirmation.

pub mod iterate;
pub mod retry;
pub mod template;
pub mod unwrap;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value as Json;
use tokio::sync::mpsc::Sender;
use vco_connections::ConnectionManager;
use vco_domain::config::ExecutorConfig;
use vco_domain::ids::{ConfirmationId, Provider, UserId};
use vco_domain::plan::{Plan, PlanStep, StepResult};
use vco_domain::progress::ProgressEvent;
use vco_domain::risk::RiskLevel;
use vco_domain::{Error, Result};
use vco_risk::{ConfirmationGate, RiskAssessor, RiskContext};

/// Outcome of running (or resuming) a plan to its next stopping point.
pub enum ExecutionOutcome {
    /// The plan ran to completion or was short-circuited by a step failure.
    Completed { results: Vec<StepResult>, success: bool },
    /// A step requires a confirmation the caller hasn't supplied yet. The
    /// remaining steps are held; call `Executor::resume` with the matching
    /// token once the caller responds.
    ConfirmationRequired { confirmation_id: ConfirmationId, risk_level: RiskLevel, summary: String },
}

struct PausedPlan {
    user: UserId,
    remaining: Vec<PlanStep>,
    results_so_far: Vec<StepResult>,
    query_text: String,
    context: String,
}

pub struct Executor {
    connections: Arc<ConnectionManager>,
    risk: Arc<RiskAssessor>,
    confirmations: Arc<ConfirmationGate>,
    config: ExecutorConfig,
    paused: parking_lot::RwLock<HashMap<ConfirmationId, PausedPlan>>,
}

impl Executor {
    pub fn new(
        connections: Arc<ConnectionManager>,
        risk: Arc<RiskAssessor>,
        confirmations: Arc<ConfirmationGate>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            connections,
            risk,
            confirmations,
            config,
            paused: parking_lot::RwLock::new(HashMap::new()),
        }
    }

    /// Run a freshly synthesized plan from its first step.
    pub async fn execute_plan(
        self: &Arc<Self>,
        user: &UserId,
        plan: &Plan,
        query_text: &str,
        context: &str,
        progress: &Sender<ProgressEvent>,
    ) -> Result<ExecutionOutcome> {
        progress
            .send(ProgressEvent::PlanStarted { step_count: plan.steps.len() })
            .await
            .ok();
        self.run_steps(user, plan.steps.clone(), Vec::new(), query_text, context, false, progress)
            .await
    }

    /// Resume a plan that was paused on a confirmation, once the caller has
    /// supplied a token. Returns an error if the id is unknown or the token
    /// doesn't satisfy the step's risk level.
    pub async fn resume(
        self: &Arc<Self>,
        confirmation_id: &ConfirmationId,
        token: &str,
        progress: &Sender<ProgressEvent>,
    ) -> Result<ExecutionOutcome> {
        if !self.confirmations.resolve(confirmation_id, token) {
            return Err(Error::ConfirmationRequired { confirmation_id: confirmation_id.to_string() });
        }
        let Some(paused) = self.paused.write().remove(confirmation_id) else {
            return Err(Error::Other(format!("no pending plan for confirmation '{confirmation_id}'")));
        };
        self.run_steps(
            &paused.user,
            paused.remaining,
            paused.results_so_far,
            &paused.query_text,
            &paused.context,
            true,
            progress,
        )
        .await
    }

    /// Explicitly decline a pending confirmation, discarding the paused plan.
    pub fn reject(&self, confirmation_id: &ConfirmationId) -> bool {
        let resolved = self.confirmations.reject(confirmation_id);
        self.paused.write().remove(confirmation_id);
        resolved
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_steps(
        self: &Arc<Self>,
        user: &UserId,
        steps: Vec<PlanStep>,
        mut results: Vec<StepResult>,
        query_text: &str,
        context: &str,
        skip_gate_on_first: bool,
        progress: &Sender<ProgressEvent>,
    ) -> Result<ExecutionOutcome> {
        for (offset, step) in steps.iter().enumerate() {
            let step_index = results.len();
            let provider = Provider::from(step.provider.as_str());

            if !self.connections.is_connected(user, &provider) {
                self.connections.connect(user, &provider).await?;
            }

            let base_params = template::resolve_params(&step.params, &results, None);

            let skip_gate = skip_gate_on_first && offset == 0;
            if !skip_gate {
                let ctx = RiskContext { tool: &step.tool, params: &base_params, query_text };
                let assessment = self.risk.assess(&ctx);
                if assessment.level.requires_confirmation() {
                    let (confirmation_id, rx) = self.confirmations.request(assessment.level, &step.tool);
                    let summary = format!(
                        "{} {} is {} risk and requires confirmation",
                        step.provider, step.tool, assessment.level
                    );
                    progress
                        .send(ProgressEvent::ConfirmationRequired {
                            confirmation_id: confirmation_id.clone(),
                            risk_level: assessment.level,
                            summary: summary.clone(),
                        })
                        .await
                        .ok();

                    self.paused.write().insert(
                        confirmation_id.clone(),
                        PausedPlan {
                            user: user.clone(),
                            remaining: steps[offset..].to_vec(),
                            results_so_far: results.clone(),
                            query_text: query_text.to_owned(),
                            context: context.to_owned(),
                        },
                    );

                    let sweep_gate = Arc::clone(&self.confirmations);
                    let sweep_executor = Arc::clone(self);
                    let sweep_id = confirmation_id.clone();
                    let ttl = self.confirmations.ttl();
                    tokio::spawn(async move {
                        if tokio::time::timeout(ttl, rx).await.is_err() {
                            sweep_gate.expire(&sweep_id);
                        }
                        sweep_executor.paused.write().remove(&sweep_id);
                    });

                    return Ok(ExecutionOutcome::ConfirmationRequired {
                        confirmation_id,
                        risk_level: assessment.level,
                        summary,
                    });
                }
            }

            progress
                .send(ProgressEvent::StepStarted { step_index, provider: provider.clone(), tool: step.tool.clone() })
                .await
                .ok();

            let start = Instant::now();
            let result = if let Some(reference) = &step.iterate_over {
                self.run_iterated_step(user, &provider, step, &base_params, &results).await
            } else {
                self.run_single_step(user, &provider, step, base_params, context).await
            };
            let duration_ms = start.elapsed().as_millis() as u64;
            let result = result.with_duration(duration_ms);

            progress
                .send(ProgressEvent::StepCompleted { step_index, success: result.success, duration_ms })
                .await
                .ok();

            let is_iteration = step.iterate_over.is_some();
            let short_circuit = !result.success
                && (!is_iteration || self.config.short_circuit_on_total_iteration_failure);
            results.push(result);
            if short_circuit {
                break;
            }
        }

        let success = results.is_empty() || results.iter().any(|r| r.success);
        Ok(ExecutionOutcome::Completed { results, success })
    }

    async fn run_single_step(
        self: &Arc<Self>,
        user: &UserId,
        provider: &Provider,
        step: &PlanStep,
        params: HashMap<String, Json>,
        context: &str,
    ) -> StepResult {
        let data = match self.call_and_unwrap(user, provider, &step.tool, params.clone()).await {
            Ok(data) => data,
            Err(message) => return StepResult::err(&step.provider, &step.tool, message, 0),
        };

        let empty_list_result = retry::is_retriable_lookup(&step.tool) && retry::list_item_count(&data) == Some(0);
        if self.config.smart_retry_enabled && empty_list_result && retry::context_suggests_recent_item(context) {
            let mut broadened = params;
            if retry::broaden_time_window(&mut broadened) {
                if let Ok(retried) = self.call_and_unwrap(user, provider, &step.tool, broadened).await {
                    if retry::list_item_count(&retried) != Some(0) {
                        return StepResult::ok(&step.provider, &step.tool, retried, 0);
                    }
                }
            }
        }

        StepResult::ok(&step.provider, &step.tool, data, 0)
    }

    async fn run_iterated_step(
        self: &Arc<Self>,
        user: &UserId,
        provider: &Provider,
        step: &PlanStep,
        base_params: &HashMap<String, Json>,
        results_so_far: &[StepResult],
    ) -> StepResult {
        let reference = step.iterate_over.as_deref().unwrap_or_default();
        let items = template::resolve_iteration_source(reference, results_so_far);

        if items.is_empty() {
            return StepResult::err(&step.provider, &step.tool, "no items to iterate over", 0);
        }

        let mut per_item = Vec::with_capacity(items.len());
        for item in &items {
            let merged = iterate::effective_params(base_params, item);
            let resolved = template::resolve_params(&merged, results_so_far, Some(item));
            let outcome = self.call_and_unwrap(user, provider, &step.tool, resolved).await;
            per_item.push(match outcome {
                Ok(data) => StepResult::ok(&step.provider, &step.tool, data, 0),
                Err(message) => StepResult::err(&step.provider, &step.tool, message, 0),
            });
        }

        StepResult::aggregate(&step.provider, &step.tool, per_item)
    }

    async fn call_and_unwrap(
        self: &Arc<Self>,
        user: &UserId,
        provider: &Provider,
        tool: &str,
        params: HashMap<String, Json>,
    ) -> std::result::Result<Json, String> {
        let args = Json::Object(params.into_iter().collect());
        match self.connections.call_tool(user, provider, tool, args).await {
            Ok(result) => unwrap::unwrap_tool_result(&result),
            Err(e) => Err(e.to_string()),
        }
    }
}

trait WithDuration {
    fn with_duration(self, duration_ms: u64) -> Self;
}

impl WithDuration for StepResult {
    fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

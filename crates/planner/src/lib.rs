//! Two-stage LLM planner: an intent router that screens out chit-chat,
//! and a plan synthesizer that turns an action query into a typed `Plan`.

pub mod intent;
pub mod synthesize;

use std::sync::Arc;

use serde_json::Value as Json;
use vco_domain::plan::Plan;
use vco_domain::Result;
use vco_llm::LlmRouter;

pub use intent::{IntentResult, IntentType};

/// Outcome of running the full two-stage pipeline for one query.
pub enum PlannerOutcome {
    /// The query was chit-chat; `reply` is ready to send back as-is.
    Conversational { reply: String },
    /// The query implied an action; `plan` is ready for the Executor.
    Action { plan: Plan },
}

pub struct Planner {
    router: Arc<LlmRouter>,
}

impl Planner {
    pub fn new(router: Arc<LlmRouter>) -> Self {
        Self { router }
    }

    /// Run Stage A, and Stage B if the query turned out to be actionable.
    pub async fn plan(&self, registry_snapshot: &Json, query: &str, context: &str) -> Result<PlannerOutcome> {
        let intent = intent::route_intent(&self.router, query, context).await?;

        match intent.intent_type {
            IntentType::Conversational => {
                let reply = intent::conversational_reply(&self.router, query, context).await?;
                Ok(PlannerOutcome::Conversational { reply })
            }
            IntentType::Action => {
                let plan = synthesize::synthesize_plan(&self.router, registry_snapshot, query, context).await?;
                Ok(PlannerOutcome::Action { plan })
            }
        }
    }
}

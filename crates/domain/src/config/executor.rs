use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Whether a `StepResult::aggregate` with `successCount == 0` across an
    /// iterated step's items short-circuits the remaining plan.
    #[serde(default = "d_true")]
    pub short_circuit_on_total_iteration_failure: bool,
    #[serde(default = "d_true")]
    pub smart_retry_enabled: bool,
    #[serde(default = "d_1")]
    pub max_step_retries: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            short_circuit_on_total_iteration_failure: d_true(),
            smart_retry_enabled: d_true(),
            max_step_retries: d_1(),
        }
    }
}

fn d_true() -> bool {
    true
}
fn d_1() -> u32 {
    1
}

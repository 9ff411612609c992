use serde::{Deserialize, Serialize};

/// Total order `SAFE < LOW < MEDIUM < HIGH`. Attached to each `PlanStep`
/// before execution. `MEDIUM` requires a confirmation token; `HIGH`
/// requires the literal approval token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Safe,
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn requires_confirmation(self) -> bool {
        self >= RiskLevel::Medium
    }

    pub fn requires_manual_approval(self) -> bool {
        self == RiskLevel::High
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskLevel::Safe => "safe",
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_total() {
        assert!(RiskLevel::Safe < RiskLevel::Low);
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
    }

    #[test]
    fn medium_and_above_require_confirmation() {
        assert!(!RiskLevel::Safe.requires_confirmation());
        assert!(!RiskLevel::Low.requires_confirmation());
        assert!(RiskLevel::Medium.requires_confirmation());
        assert!(RiskLevel::High.requires_confirmation());
    }

    #[test]
    fn only_high_requires_manual_approval() {
        assert!(!RiskLevel::Medium.requires_manual_approval());
        assert!(RiskLevel::High.requires_manual_approval());
    }
}

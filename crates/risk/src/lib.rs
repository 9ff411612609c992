//! Risk Assessor and Confirmation Gate: classifies plan steps by
//! `RiskLevel` and holds dangerous steps until a matching confirmation or
//! manual approval token arrives.

pub mod assess;
pub mod confirmation;

pub use assess::{Assessment, RiskAssessor, RiskContext};
pub use confirmation::{ConfirmationDecision, ConfirmationGate, ConfirmationInfo};

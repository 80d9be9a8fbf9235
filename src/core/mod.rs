//! 核心编排层：错误、会话状态、决策策略、编排图、过程事件与会话入口

pub mod error;
pub mod events;
pub mod graph;
pub mod policy;
pub mod runner;
pub mod state;

pub use error::{CapabilityError, CapabilityKind, TriageError};
pub use events::TriageEvent;
pub use graph::TriageGraph;
pub use policy::{route, AssignmentDecision, AssignmentPolicy};
pub use runner::{run_triage, run_triage_with, RunOptions};
pub use state::{
    ChangeEvidence, Outcome, Phase, Priority, Resolution, TicketType, TriageFailure, TriageSession,
};

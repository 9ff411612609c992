//! The gateway: HTTP surface, bootstrap/CLI, and the Orchestration Facade
//! that ties the Planner, Executor, Connection Manager, and Conversation
//! Store together into a single `process_query` call per voice turn.

pub mod activity;
pub mod api;
pub mod cli;
pub mod observability;
pub mod orchestrator;
pub mod registry_snapshot;
pub mod state;
pub mod tokens;

pub mod context;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod telemetry;

pub use context::ReconcileContext;
pub use error::Error;
pub use orchestrator::{OrchestratorError, PhaseOrchestrator, Requeue};

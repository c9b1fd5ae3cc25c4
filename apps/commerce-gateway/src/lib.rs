pub mod config;
pub mod dispatcher;
pub mod http;
pub mod orchestrator;
pub mod reasoning;
pub mod transport;

pub use dispatcher::Dispatcher;
pub use orchestrator::{Orchestrator, OrchestratorError, TurnReport, TurnStage};
pub use reasoning::{FALLBACK_REPLY, ReasoningClient, ReasoningEngine};
pub use transport::{ChannelTransport, TransportMonitor, TransportState};

pub mod agent;
pub mod crew;
pub mod geo;
pub mod population;
pub mod retry;
pub mod search;
pub mod verifier;

pub use agent::{AgentEngine, AgentError, ProviderConfig, ToolRegistry};
pub use crew::{CrewKind, CrewService};

pub mod agent;

pub use agent::{agent_context_middleware, require_agent};

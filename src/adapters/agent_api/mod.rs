//! Agent service adapters - HTTP implementations of the agent-facing ports.
//!
//! All three adapters share one `AgentApiClient`, so base URL, timeout and
//! bearer token are configured once.

mod agent_connector;
mod client;
mod conversation_lookup;
mod workflow_source;

pub use agent_connector::HttpAgentConnector;
pub use client::{AgentApiClient, AgentApiConfig};
pub use conversation_lookup::HttpConversationLookup;
pub use workflow_source::HttpWorkflowSource;

//! Adapters - Implementations of the ports.
//!
//! - `storage` - In-memory and file-backed `KeyValueStore`
//! - `agent_api` - HTTP adapters for the agent service
//! - `workflow_file` - Workflow definitions from YAML/JSON files
//! - `clock` - System and manual clocks

pub mod agent_api;
pub mod clock;
pub mod storage;
pub mod workflow_file;

pub use agent_api::{
    AgentApiClient, AgentApiConfig, HttpAgentConnector, HttpConversationLookup, HttpWorkflowSource,
};
pub use clock::{ManualClock, SystemClock};
pub use storage::{FileKeyValueStore, InMemoryKeyValueStore};
pub use workflow_file::FileWorkflowSource;

//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Storage Ports
//!
//! - `KeyValueStore` - Durable string store for progress records
//! - `Clock` - Current time
//!
//! ## Agent Service Ports
//!
//! - `ConversationLookup` - Authoritative conversation outcomes
//! - `AgentConnector` - Signed voice-session URLs
//! - `WorkflowSource` - Workflow definitions
//! - `VoiceTransport` - Realtime voice session

mod agent_connector;
mod clock;
mod conversation_lookup;
mod key_value_store;
mod voice_transport;
mod workflow_source;

pub use agent_connector::{AgentConnector, ConnectorError, SignedUrl};
pub use clock::Clock;
pub use conversation_lookup::{ConversationLookup, LookupError, RemoteConversation, TranscriptEntry};
pub use key_value_store::{KeyValueStore, StorageError};
pub use voice_transport::{TransportError, TransportEvent, TransportStatus, VoiceTransport};
pub use workflow_source::{WorkflowRequest, WorkflowSource, WorkflowSourceError};

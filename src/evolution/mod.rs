//! The orchestration layer on top of signals, policy and the sandbox.

pub mod archive;
pub mod controller;
pub mod design;
pub mod server;

pub use archive::{AgentArchive, AgentMetadata};
pub use controller::HybridController;
pub use design::{DesignArtifact, DesignSessions};
pub use server::{EvolutionResponse, EvolutionServer};

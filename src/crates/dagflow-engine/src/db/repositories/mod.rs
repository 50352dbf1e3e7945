//! Repository pattern implementations for database access.
//!
//! [`workflow_repo`] owns the `workflows` table; [`node_repo`] owns
//! `nodes` and `node_edges`, including the atomic edit-batch machinery
//! and the readiness query the scheduler polls.

pub mod configuration_repo;
pub mod node_repo;
pub mod workflow_repo;

pub use configuration_repo::ConfigurationRepository;
pub use node_repo::NodeRepository;
pub use workflow_repo::WorkflowRepository;

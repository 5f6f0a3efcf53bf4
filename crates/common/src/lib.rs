//! Identifier types shared by the saga store, the orchestrator and the API.

pub mod types;

pub use types::{AggregateId, SagaId};

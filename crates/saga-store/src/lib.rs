//! Persistence for saga runs.
//!
//! A [`SagaRun`] is the audit trail of one saga execution against one
//! business aggregate. Runs are created and mutated only by the
//! orchestrator and are never deleted.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod run;
pub mod store;

pub use common::{AggregateId, SagaId};
pub use error::{Result, SagaStoreError};
pub use memory::InMemorySagaRunStore;
pub use postgres::PostgresSagaRunStore;
pub use run::{INITIAL_STEP, SagaRun, SagaStatus};
pub use store::SagaRunStore;

//! Event dispatch surface used by product features.
//!
//! - `events`: event types and their priority tiers
//! - `adapter`: event to template send, variable assembly, auto-send toggles
//! - `priority`: blocking vs. detached execution per tier
//! - `pool`: bounded worker pool for detached sends

mod adapter;
mod events;
mod pool;
mod priority;

pub use adapter::{EventRequest, NotificationAdapter, Recipient};
pub use events::{EventType, Priority};
pub use pool::{PoolError, PoolStats, WorkerPool};
pub use priority::{DispatchOutcome, PriorityDispatcher};

use thiserror::Error;
use uuid::Uuid;

use crate::domain::notification::DeliveryError;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error("Invalid dispatch request: {0}")]
    Validation(String),
}

impl DispatchError {
    pub fn notification_id(&self) -> Option<Uuid> {
        match self {
            DispatchError::Delivery(e) => e.notification_id(),
            DispatchError::Validation(_) => None,
        }
    }
}

//! Notification records and the delivery pipeline.
//!
//! - `types`: channel, lifecycle status and the persistent record
//! - `store`: storage backends for records
//! - `delivery`: send, retry and status callbacks

mod delivery;
mod postgres_store;
mod store;
mod types;

pub use delivery::{
    DeliveryError, DeliveryService, ProviderTestResult, SendContext, SendRequest,
    TemplateSendRequest,
};
pub use postgres_store::PostgresNotificationStore;
pub use store::{create_notification_store, MemoryNotificationStore, NotificationStore};
pub use types::{
    ChannelType, InvalidTransition, Notification, NotificationFilter, NotificationStatus, Page,
};

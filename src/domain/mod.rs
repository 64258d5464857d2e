//! Domain layer modules
//!
//! - `template`: template records, default catalog, resolution and rendering
//! - `notification`: delivery records and the delivery pipeline
//! - `provider`: channel providers
//! - `vault`: at-rest encryption of provider credentials
//! - `tenant`: tenant policy and settings
//! - `ratelimit`: per-tenant send limits
//! - `audit`: audit trail for template changes

pub mod audit;
pub mod notification;
pub mod provider;
pub mod ratelimit;
pub mod store;
pub mod template;
pub mod tenant;
pub mod vault;

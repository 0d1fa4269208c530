//! Domain types and DTOs
//!
//! These types define the data structures for RFP lifecycle entities.

pub mod activity;
pub mod documents;
pub mod events;
pub mod responses;
pub mod rfps;
pub mod users;

// Re-export commonly used types
pub use activity::ActivityLog;
pub use documents::*;
pub use events::{Actor, DomainEvent, StatusChanged};
pub use responses::*;
pub use rfps::*;
pub use users::*;

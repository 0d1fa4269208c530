//! RFP workflow engine
//!
//! Owns the status state machine. Every mutation runs in one repository
//! transaction (status write plus activity row) and, once committed, hands a
//! [`DomainEvent`](crate::domain::DomainEvent) to the dispatcher.

mod engine;
mod error;
pub mod transitions;

pub use engine::WorkflowEngine;
pub use error::WorkflowError;

use uuid::Uuid;

use crate::domain::Role;

/// Authenticated principal acting on the workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub id: Uuid,
    pub role: Role,
}

impl Caller {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }

    pub fn is_buyer(&self) -> bool {
        self.role == Role::Buyer
    }

    pub fn is_supplier(&self) -> bool {
        self.role == Role::Supplier
    }
}

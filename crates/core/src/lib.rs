//! `backoffice-core`: shared building blocks for the back-office client.
//!
//! Pure types only (no IO): identifiers, money, and the domain error model.

pub mod error;
pub mod id;
pub mod money;

pub use error::{DomainError, DomainResult};
pub use id::OperationId;
pub use money::Money;

//! Submits guarded, remapped SQL to the warehouse with caching, timeouts,
//! row caps, and numeric coercion. The warehouse itself is an external
//! collaborator — this crate only defines the contract it must meet
//! ([`WarehouseClient`]) and the policy layered in front of it.

pub mod client;
pub mod executor;

pub use client::{SubmitOptions, WarehouseClient, WarehouseRows, WarehouseValue};
pub use executor::{execute, ErrorResult, ErrorResultKind, QueryResult};

pub mod db;
pub mod store;
pub mod types;

pub use njvox_core::types::Role;
pub use store::SessionStore;
pub use types::{Message, Session};

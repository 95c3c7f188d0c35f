//! Repository implementations.
//!
//! - `local`: in-memory document store used by the server and by tests
pub mod local;

pub use local::LocalRepository;

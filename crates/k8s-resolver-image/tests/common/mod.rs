//! Shared helpers for registry integration tests

pub mod fixtures;
pub mod mock_registry;

#[allow(unused_imports)]
pub use fixtures::*;
#[allow(unused_imports)]
pub use mock_registry::*;

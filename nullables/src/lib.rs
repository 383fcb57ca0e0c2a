//! Nullable infrastructure for deterministic testing.
//!
//! Every external collaborator of the importer (clock, block nodes, object
//! storage, downstream notifier) is abstracted behind a trait. This crate
//! provides test-friendly implementations that:
//! - Return deterministic values
//! - Can be controlled and inspected programmatically
//! - Never touch the filesystem or network
//!
//! [`BlockGenerator`] produces chained, correctly hashed and signed blocks to
//! feed them with.

pub mod block_node;
pub mod clock;
pub mod generator;
pub mod notifier;
pub mod provider;

pub use block_node::NullBlockNode;
pub use clock::NullClock;
pub use generator::BlockGenerator;
pub use notifier::NullNotifier;
pub use provider::NullFileProvider;

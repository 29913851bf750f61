//! Repository abstractions for durable pipeline storage.
//!
//! Every component that touches the database depends on one of these
//! traits rather than on a pool, so tests can drive the pipeline with
//! in-memory implementations or mocks.

pub mod bindings;
pub mod mailboxes;
pub mod modules;
pub mod notifications;
pub mod orders;
pub mod queue;
pub mod settings;
pub mod users;

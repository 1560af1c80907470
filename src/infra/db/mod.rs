//! Repository implementations.

mod memory;

pub use memory::InMemoryTasks;

//! Script execution: process spawning, stream draining, stdin forwarding,
//! and the single-slot run manager that ties them together.

pub mod codec;
pub mod manager;
pub mod reader;
pub mod spawner;
pub mod terminate;

pub use manager::RunManager;

pub mod memory;
pub mod persistence;
pub mod publisher;

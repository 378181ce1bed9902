// Re-export internal modules for integration tests and external crate use.
pub mod commands;
pub mod config;
pub mod console;
pub mod gateway;
pub mod journal;
pub mod orchestrator;
pub mod probe;
pub mod render;
pub mod ui;

pub mod client;
pub mod discovery;
pub mod models;
pub mod queue;
pub mod watcher;

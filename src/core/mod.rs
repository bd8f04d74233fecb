pub mod config;
pub mod engine;
pub mod events;
pub mod model;
pub mod notifier;
pub mod progress;
pub mod submit;
pub mod workspace;

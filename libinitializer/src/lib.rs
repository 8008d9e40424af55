pub mod attributes;
pub mod config;
pub mod controller;
pub mod markers;
pub mod pending;
pub mod propagate;
pub mod store;
pub mod with_xline;

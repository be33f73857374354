//! Error helpers shared by the dicelog crates.

pub mod context;

pub use context::FromMessage;

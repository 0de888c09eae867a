#![deny(unsafe_code)]

/// Settings persistence.
pub mod settings;
/// Terminal rendering and input handling.
pub mod surface;

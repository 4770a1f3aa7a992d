// Shared type definitions
// Each submodule defines types used across the crate.

pub mod bookmark;
pub mod errors;
pub mod modification;
pub mod remote;
pub mod settings;

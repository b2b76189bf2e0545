//! Core foundation layer (no internal dependencies).

pub mod types;

//! Core engine types and utilities shared by the snow simulation crates.
//!
//! This crate provides the foundational types used across all systems:
//! - Transform and spatial conversions
//! - Frame and fixed-step time management

pub mod time;
pub mod transform;

pub use time::*;
pub use transform::*;

// Re-export commonly used types
pub use glam::{Quat, Vec3};
pub use hecs::{Entity, World};

//! Error types for scene construction.
//!
//! Strike handling never fails; these only come out of building surfaces,
//! cornices and blocks from configuration.

use hecs::Entity;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnowError {
    #[error("invalid surface: {0}")]
    InvalidSurface(String),

    #[error("invalid cornice layout: {0}")]
    InvalidCornice(String),

    #[error("invalid snow block: {0}")]
    InvalidBlock(String),

    #[error("invalid tuning: {0}")]
    InvalidTuning(String),

    #[error("entity {0:?} does not exist or has the wrong kind")]
    NoSuchEntity(Entity),
}

pub type Result<T> = std::result::Result<T, SnowError>;

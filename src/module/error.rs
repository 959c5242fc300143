//! Errors surfaced by module lifecycle hooks.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("module rejected its configuration: {0}")]
    InvalidConfig(String),

    #[error("module creation failed: {0}")]
    CreateFailed(String),
}

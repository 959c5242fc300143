//! Configuration document errors (SPEC_FULL.md ยง6, ยง7).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration document is not valid JSON: {0}")]
    Parse(String),

    #[error("module name {0} appears more than once")]
    DuplicateModule(String),

    #[error("link source or sink {0} is not a known module or the wildcard \"*\"")]
    UnknownModule(String),
}

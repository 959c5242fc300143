//! Module capability trait, factory, and the publish handle modules use to
//! speak back to the broker under their own identity.

pub mod error;
pub mod traits;

pub use error::ModuleError;
pub use traits::{ModuleFactory, NativeModule, PublishHandle, PublishSink};

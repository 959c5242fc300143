//! Small cross-cutting helpers shared by the broker, topology manager, and
//! transport.

pub mod ids;

pub use ids::{random_channel_id, ModuleTag, QuitToken};

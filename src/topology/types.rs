//! Topology-manager value types (SPEC_FULL.md ยง4.2, ยง4.5, ยง6).

use crate::util::ModuleTag;

/// Opaque handle to an attached module, returned by `Topology::add_module`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleHandle(pub(crate) ModuleTag);

/// A snapshot entry returned by `Topology::list_modules`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub name: String,
    /// `None` stands in for "null-valued sources field": some wildcard-source
    /// link targets this module, so no bounded source list applies.
    pub sources: Option<Vec<String>>,
}

/// Named events the topology manager emits (SPEC_FULL.md ยง4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Created,
    Destroyed,
    Started,
    ModuleListChanged,
}

/// The payload delivered to a registered callback.
///
/// Callbacks receive this by shared reference only, with no handle back
/// into the topology, so they cannot mutate it mid-emission (SPEC_FULL.md
/// ยง4.5, "Callbacks may not mutate the topology").
#[derive(Debug, Clone)]
pub struct TopologyEvent {
    pub kind: EventKind,
    pub module: Option<String>,
    pub link: Option<(String, String)>,
}

/// A registered event callback. Ordinary Rust closures already carry their
/// own captured state, which is the idiomatic replacement for the source's
/// `(callback, user_data)` pointer pair.
pub type EventCallback = Box<dyn Fn(&TopologyEvent) + Send + Sync>;

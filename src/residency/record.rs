//! Per-resource bookkeeping records.

use std::sync::Arc;

use super::source::SourceHandle;

/// Cost unit for resident resources (bytes on the GPU).
pub type Cost = u64;

/// Priority value reserved for the persistent tier. Records at this
/// priority are never evicted by budget pressure.
pub const PERSISTENT_PRIORITY: i32 = i32::MAX;

/// Stable, dense identifier for a registered resource.
///
/// Assigned at registration, never reused. `ResourceId::INVALID` is the
/// sentinel returned when registration fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId(pub u32);

impl ResourceId {
    pub const INVALID: ResourceId = ResourceId(u32::MAX);

    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }

    /// Index into the record bank.
    pub(crate) fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Class tag forwarded to the instantiator so it can pick an appropriate
/// GPU representation (format, swizzle, compression).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ResourceClass {
    #[default]
    Color,
    Normal,
    Material,
    Luminance,
}

/// Confirmed resident cost reported by a completed instantiation.
#[derive(Debug, Clone, Copy)]
pub struct CostReport {
    pub id: ResourceId,
    pub cost: Cost,
}

/// One registered resource and its residency state.
///
/// `consumed` is confirmed resident cost; `pending` is cost reserved when
/// instantiation is dispatched and cleared when the cost report lands.
/// A record is resident while either is non-zero.
#[derive(Debug)]
pub struct ResourceRecord {
    pub id: ResourceId,
    pub handle: Arc<SourceHandle>,
    pub class: ResourceClass,
    pub priority: i32,
    pub consumed: Cost,
    pub pending: Cost,
    pub last_used: u64,
    pub path_hash: Option<u64>,
}

impl ResourceRecord {
    pub(crate) fn new(
        id: ResourceId,
        handle: Arc<SourceHandle>,
        class: ResourceClass,
        priority: i32,
    ) -> Self {
        Self {
            id,
            handle,
            class,
            priority,
            consumed: 0,
            pending: 0,
            last_used: 0,
            path_hash: None,
        }
    }

    /// Whether the resource currently occupies (or is about to occupy)
    /// GPU memory.
    pub fn is_resident(&self) -> bool {
        self.consumed != 0 || self.pending != 0
    }
}

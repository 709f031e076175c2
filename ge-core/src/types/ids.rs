//! Strongly-typed identifiers for graphs, sessions and device resources.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller-supplied identifier of a registered graph.
///
/// Unique among the graphs currently registered with a manager. Once a graph
/// is removed its id may be reused by a later `add_graph`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct GraphId(u32);

impl GraphId {
    /// Create a graph ID from a raw value.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "graph_{}", self.0)
    }
}

impl From<u32> for GraphId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Identifier of the session a run request was issued from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SessionId(u64);

impl SessionId {
    /// Create a session ID from a raw value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session_{}", self.0)
    }
}

/// Opaque handle to a caller-owned device stream.
///
/// Streams are never created or destroyed by the manager; the handle is only
/// forwarded to the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamHandle(u64);

impl StreamHandle {
    /// Wrap a raw driver stream handle.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw driver handle.
    #[must_use]
    pub const fn as_raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream_{:#x}", self.0)
    }
}

/// A device memory address. Zero is the null address.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct DeviceAddr(u64);

impl DeviceAddr {
    /// The null device address.
    pub const NULL: Self = Self(0);

    /// Create an address from a raw value.
    #[must_use]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Get the raw address value.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Whether this is the null address.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for DeviceAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u64> for DeviceAddr {
    fn from(addr: u64) -> Self {
        Self(addr)
    }
}

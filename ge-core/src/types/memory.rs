//! Device memory classes and memory-base descriptors.

use super::ids::DeviceAddr;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Device memory pool a feature-memory base belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MemoryClass {
    /// Ordinary device memory.
    Default,
    /// Peer-to-peer memory pool.
    P2p,
}

impl MemoryClass {
    /// All memory classes, in a stable order.
    pub const ALL: [MemoryClass; 2] = [MemoryClass::Default, MemoryClass::P2p];
}

impl fmt::Display for MemoryClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::P2p => write!(f, "p2p"),
        }
    }
}

/// Whether a feature-memory base may be rebound after it is first set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mutability {
    /// Assigned once, never reassigned.
    Fixed,
    /// May be rebound across runs.
    Refreshable,
}

impl fmt::Display for Mutability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed => write!(f, "fixed"),
            Self::Refreshable => write!(f, "refreshable"),
        }
    }
}

/// Which memory-base slot an operation addressed. Used for error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryKind {
    /// Constant-weight memory.
    Const,
    /// Feature memory of a class, with its mutability.
    Feature(MemoryClass, Mutability),
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const => write!(f, "const memory"),
            Self::Feature(class, mutability) => {
                write!(f, "{mutability} {class} feature memory")
            }
        }
    }
}

/// An address/size pair handed to the manager by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MemoryBase {
    /// Base address.
    pub addr: DeviceAddr,
    /// Size in bytes.
    pub size: u64,
}

impl MemoryBase {
    /// Create a memory base.
    #[must_use]
    pub const fn new(addr: DeviceAddr, size: u64) -> Self {
        Self { addr, size }
    }

    /// A null address must come with a zero size and vice versa.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        self.addr.is_null() == (self.size == 0)
    }

    /// Whether this base is the null base.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.addr.is_null()
    }
}

impl fmt::Display for MemoryBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.addr, self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_and_size_must_agree() {
        assert!(MemoryBase::new(DeviceAddr::NULL, 0).is_consistent());
        assert!(MemoryBase::new(DeviceAddr::new(0x10), 64).is_consistent());
        assert!(!MemoryBase::new(DeviceAddr::NULL, 64).is_consistent());
        assert!(!MemoryBase::new(DeviceAddr::new(0x10), 0).is_consistent());
    }

    #[test]
    fn memory_kind_display() {
        let kind = MemoryKind::Feature(MemoryClass::P2p, Mutability::Fixed);
        assert_eq!(kind.to_string(), "fixed p2p feature memory");
        assert_eq!(MemoryKind::Const.to_string(), "const memory");
    }
}

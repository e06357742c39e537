//! Network port management library.
//!
//! Workspaces consume two kinds of host ports: one remote-shell port per
//! workspace and one traffic port per started service. Both are handed out
//! from fixed, disjoint ranges by a single [`PortAllocator`].

pub mod allocator;
pub mod error;
pub mod range;

pub use allocator::{PortAllocator, PortKind};
pub use error::{PortError, Result};
pub use range::PortRange;

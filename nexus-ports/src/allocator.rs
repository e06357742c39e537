//! Lowest-available port allocation over the shell and service ranges.

use std::collections::BTreeSet;
use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PortError, Result};
use crate::range::PortRange;

/// Which of the two ranges a port is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortKind {
    /// Remote-shell access, one per workspace.
    Shell,
    /// Service traffic, one per started service.
    Service,
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortKind::Shell => write!(f, "shell"),
            PortKind::Service => write!(f, "service"),
        }
    }
}

/// Shared allocator for every workspace on this host.
///
/// Allocation always returns the lowest free port of the requested range, so
/// allocation order is reproducible. The lock is only held for the scan or the
/// removal itself.
#[derive(Debug)]
pub struct PortAllocator {
    shell: PortRange,
    service: PortRange,
    allocated: Mutex<BTreeSet<u16>>,
}

impl PortAllocator {
    pub fn new(shell: PortRange, service: PortRange) -> Result<Self> {
        if shell.overlaps_with(&service) {
            return Err(PortError::OverlappingRanges { shell, service });
        }
        Ok(Self {
            shell,
            service,
            allocated: Mutex::new(BTreeSet::new()),
        })
    }

    pub fn range(&self, kind: PortKind) -> PortRange {
        match kind {
            PortKind::Shell => self.shell,
            PortKind::Service => self.service,
        }
    }

    pub fn allocate_shell_port(&self) -> Result<u16> {
        self.allocate(PortKind::Shell)
    }

    pub fn allocate_service_port(&self) -> Result<u16> {
        self.allocate(PortKind::Service)
    }

    pub fn allocate(&self, kind: PortKind) -> Result<u16> {
        let range = self.range(kind);
        let mut allocated = self.allocated.lock();

        let port = range
            .iter()
            .find(|port| !allocated.contains(port))
            .ok_or(PortError::Exhausted { kind, range })?;
        allocated.insert(port);

        debug!(port, %kind, "allocated port");
        Ok(port)
    }

    /// Returns the port to the pool. Releasing a free port is a no-op; the
    /// return value says whether anything changed.
    pub fn release_port(&self, port: u16) -> bool {
        let released = self.allocated.lock().remove(&port);
        if released {
            debug!(port, "released port");
        }
        released
    }

    /// Releases several ports under a single lock acquisition so no other
    /// allocation can observe a partially released set.
    pub fn release_ports<I>(&self, ports: I) -> usize
    where
        I: IntoIterator<Item = u16>,
    {
        let mut allocated = self.allocated.lock();
        ports
            .into_iter()
            .filter(|port| allocated.remove(port))
            .count()
    }

    pub fn is_allocated(&self, port: u16) -> bool {
        self.allocated.lock().contains(&port)
    }

    pub fn allocated_count(&self) -> usize {
        self.allocated.lock().len()
    }
}

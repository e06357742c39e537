use crate::allocator::PortKind;
use crate::range::PortRange;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PortError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PortError {
    #[error("no available {kind} ports in range {range}")]
    Exhausted { kind: PortKind, range: PortRange },

    #[error("invalid port range: {0}")]
    InvalidRange(String),

    #[error("shell port range {shell} overlaps service port range {service}")]
    OverlappingRanges { shell: PortRange, service: PortRange },
}

impl PortError {
    /// True when the error means "try again after something is released".
    pub fn is_exhausted(&self) -> bool {
        matches!(self, PortError::Exhausted { .. })
    }
}

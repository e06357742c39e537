use crate::error::{PortError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An inclusive `start-end` range of host ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub fn parse(range_str: &str) -> Result<Self> {
        let (start, end) = range_str.trim().split_once('-').ok_or_else(|| {
            PortError::InvalidRange(format!(
                "{range_str} (expected START-END, e.g. 2222-2299)"
            ))
        })?;

        let start: u16 = start
            .trim()
            .parse()
            .map_err(|_| PortError::InvalidRange(format!("invalid start port: {start}")))?;
        let end: u16 = end
            .trim()
            .parse()
            .map_err(|_| PortError::InvalidRange(format!("invalid end port: {end}")))?;

        Self::new(start, end)
    }

    /// A single-port range (`start == end`) is allowed.
    pub fn new(start: u16, end: u16) -> Result<Self> {
        if start == 0 {
            return Err(PortError::InvalidRange("port 0 cannot be allocated".into()));
        }
        if start > end {
            return Err(PortError::InvalidRange(format!(
                "start ({start}) must not be greater than end ({end})"
            )));
        }
        Ok(PortRange { start, end })
    }

    pub fn overlaps_with(&self, other: &PortRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.start..=self.end).contains(&port)
    }

    pub fn size(&self) -> u32 {
        u32::from(self.end) - u32::from(self.start) + 1
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> {
        self.start..=self.end
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl FromStr for PortRange {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PortRange {
    type Error = PortError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<PortRange> for String {
    fn from(range: PortRange) -> Self {
        range.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_range() {
        let range = PortRange::parse("2222-2299").unwrap();
        assert_eq!(range.start, 2222);
        assert_eq!(range.end, 2299);
        assert_eq!(range.size(), 78);
    }

    #[test]
    fn test_parse_single_port_range() {
        let range = PortRange::parse("23000-23000").unwrap();
        assert_eq!(range.size(), 1);
        assert!(range.contains(23000));
    }

    #[test]
    fn test_parse_invalid_format() {
        assert!(PortRange::parse("3000").is_err());
        assert!(PortRange::parse("3000-3009-3010").is_err());
        assert!(PortRange::parse("invalid-range").is_err());
        assert!(PortRange::parse("0-10").is_err());
    }

    #[test]
    fn test_parse_reversed_range() {
        assert!(PortRange::parse("3009-3000").is_err());
    }

    #[test]
    fn test_overlap_detection() {
        let range1 = PortRange::new(3000, 3009).unwrap();
        let range2 = PortRange::new(3005, 3015).unwrap();
        let range3 = PortRange::new(3010, 3019).unwrap();

        assert!(range1.overlaps_with(&range2));
        assert!(range2.overlaps_with(&range1));
        assert!(!range1.overlaps_with(&range3));
        assert!(!range3.overlaps_with(&range1));
    }

    #[test]
    fn test_serde_as_string() {
        let range = PortRange::new(2222, 2299).unwrap();
        let json = serde_json::to_string(&range).unwrap();
        assert_eq!(json, "\"2222-2299\"");

        let parsed: PortRange = serde_json::from_str("\"23000-30000\"").unwrap();
        assert_eq!(parsed, PortRange::new(23000, 30000).unwrap());
        assert!(serde_json::from_str::<PortRange>("\"nope\"").is_err());
    }
}

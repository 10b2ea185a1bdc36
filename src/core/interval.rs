use crate::{error::VarstoreError, utils::util::Result};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// A 1-based, closed genomic region `contig:start-end`.
///
/// Construction validates the region, so every `Interval` in the program has a
/// non-empty contig, `start >= 1` and `start <= end`. A bare contig has no end
/// and covers everything from position 1.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    contig: String,
    start: u64,
    end: Option<u64>,
}

impl Interval {
    pub fn new(contig: impl Into<String>, start: u64, end: u64) -> Result<Self> {
        let contig = contig.into();
        if contig.is_empty() {
            return Err(VarstoreError::invalid_interval(
                format!(":{start}-{end}"),
                "contig name is empty",
            ));
        }
        if start == 0 {
            return Err(VarstoreError::invalid_interval(
                format!("{contig}:{start}-{end}"),
                "positions are 1-based",
            ));
        }
        if end < start {
            return Err(VarstoreError::invalid_interval(
                format!("{contig}:{start}-{end}"),
                format!("end ({end}) is before start ({start})"),
            ));
        }
        Ok(Self {
            contig,
            start,
            end: Some(end),
        })
    }

    pub fn whole_contig(contig: impl Into<String>) -> Result<Self> {
        let contig = contig.into();
        if contig.is_empty() {
            return Err(VarstoreError::invalid_interval("", "contig name is empty"));
        }
        Ok(Self {
            contig,
            start: 1,
            end: None,
        })
    }

    pub fn is_whole_contig(&self) -> bool {
        self.end.is_none()
    }

    pub fn contig(&self) -> &str {
        &self.contig
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    /// Last covered position; `u64::MAX` for a whole contig.
    pub fn end(&self) -> u64 {
        self.end.unwrap_or(u64::MAX)
    }

    /// Explicit end, `None` for a whole contig.
    pub fn bounded_end(&self) -> Option<u64> {
        self.end
    }

    pub fn overlaps(&self, contig: &str, start: u64, end: u64) -> bool {
        self.contig == contig && start <= self.end() && end >= self.start
    }

    pub fn overlaps_interval(&self, other: &Interval) -> bool {
        self.overlaps(&other.contig, other.start, other.end())
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            None => write!(f, "{}", self.contig),
            Some(end) => write!(f, "{}:{}-{}", self.contig, self.start, end),
        }
    }
}

fn parse_coordinate(value: &str, region: &str) -> Result<u64> {
    value.replace(',', "").parse::<u64>().map_err(|e| {
        VarstoreError::invalid_interval(region, format!("`{value}` is not a valid position: {e}"))
    })
}

impl FromStr for Interval {
    type Err = VarstoreError;

    /// Parses `contig`, `contig:pos` or `contig:start-end`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let Some((contig, range)) = s.rsplit_once(':') else {
            return Self::whole_contig(s);
        };
        match range.split_once('-') {
            Some((start, end)) => {
                let start = parse_coordinate(start, s)?;
                let end = parse_coordinate(end, s)?;
                Self::new(contig, start, end)
            }
            None => {
                let pos = parse_coordinate(range, s)?;
                Self::new(contig, pos, pos)
            }
        }
    }
}

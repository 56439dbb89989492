//! Candidate split points for chunking a table.
//!
//! Which source is used depends on what the server can do:
//!
//! - [`sample`]: exact key tuples from `TABLESAMPLE REGIONS()`
//! - [`region`]: row handles decoded from storage region start keys
//! - [`legacy`]: region handles matched to tables through histogram IDs
//! - [`range`]: evenly spaced cut points between `MIN` and `MAX` of an integer key
//!
//! Every source yields sorted [`BoundaryTuple`]s for the range partitioner.

pub mod legacy;
pub mod range;
pub mod region;
pub mod region_key;
pub mod sample;

pub use legacy::LegacyRegionMap;
pub use range::{integer_range_boundaries, integer_range_cutoffs};
pub use region::{decoded_table_boundaries, partition_region_boundaries};
pub use sample::sample_boundaries;

use std::fmt;

use crate::core::schema::BoundaryTuple;
use crate::server::ServerCapabilities;

/// Fewest sampled or region tuples worth splitting on.
pub const MIN_USABLE_BOUNDARIES: usize = 2;

/// Strategy for obtaining boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryMode {
    TableSample,
    RegionDecoded,
    RegionLegacy,
    IntegerRange,
}

impl BoundaryMode {
    pub fn resolve(caps: &ServerCapabilities) -> Self {
        if caps.supports_table_sample {
            BoundaryMode::TableSample
        } else if caps.supports_region_scan && caps.decodes_region_keys {
            BoundaryMode::RegionDecoded
        } else if caps.supports_region_scan {
            BoundaryMode::RegionLegacy
        } else {
            BoundaryMode::IntegerRange
        }
    }
}

impl fmt::Display for BoundaryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BoundaryMode::TableSample => "table-sample",
            BoundaryMode::RegionDecoded => "region",
            BoundaryMode::RegionLegacy => "legacy-region",
            BoundaryMode::IntegerRange => "integer-range",
        };
        f.write_str(name)
    }
}

/// Sampled or region tuples, or `None` when too few to split on.
pub fn usable(tuples: Vec<BoundaryTuple>) -> Option<Vec<BoundaryTuple>> {
    if tuples.len() < MIN_USABLE_BOUNDARIES {
        None
    } else {
        Some(tuples)
    }
}

//! Runtime capability discovery.
//!
//! Facets are optional interfaces a dialect may add to [`GridDialect`].
//! Querying one on a dialect that lacks it yields `None`; the answer is a
//! property of the dialect and never changes between calls.

use std::fmt;

use crate::dialect::traits::{
    BatchableGridDialect, GridDialect, OptimisticLockingAwareGridDialect,
};

/// The optional capabilities a dialect may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FacetKind {
    Batchable,
    OptimisticLockingAware,
}

impl FacetKind {
    pub const ALL: [FacetKind; 2] = [FacetKind::Batchable, FacetKind::OptimisticLockingAware];

    pub fn name(self) -> &'static str {
        match self {
            FacetKind::Batchable => "batchable",
            FacetKind::OptimisticLockingAware => "optimistic-locking-aware",
        }
    }
}

impl fmt::Display for FacetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether `dialect` exposes the given facet.
pub fn has_facet(dialect: &dyn GridDialect, facet: FacetKind) -> bool {
    match facet {
        FacetKind::Batchable => dialect.as_batchable().is_some(),
        FacetKind::OptimisticLockingAware => dialect.as_optimistic_locking_aware().is_some(),
    }
}

/// All facets `dialect` exposes, in [`FacetKind::ALL`] order.
pub fn supported_facets(dialect: &dyn GridDialect) -> Vec<FacetKind> {
    FacetKind::ALL
        .into_iter()
        .filter(|facet| has_facet(dialect, *facet))
        .collect()
}

pub fn batchable(dialect: &dyn GridDialect) -> Option<&dyn BatchableGridDialect> {
    dialect.as_batchable()
}

pub fn optimistic_locking_aware(
    dialect: &dyn GridDialect,
) -> Option<&dyn OptimisticLockingAwareGridDialect> {
    dialect.as_optimistic_locking_aware()
}

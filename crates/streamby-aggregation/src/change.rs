//! Per-cycle change tracking

use crate::error::{AggregationError, Result};
use streamby_core::{Destination, RowSet, RowSetBuilder, Update};

/// How an operator learns which destinations to report at the end of a cycle.
///
/// Selected once by `reset_for_step` and consumed once by `propagate_updates`.
#[derive(Debug, Default)]
pub enum ChangeTracking {
    /// Outside an update cycle (construction and the initial snapshot)
    #[default]
    Idle,
    /// Standalone: the changed set is the downstream `modified ∪ added`
    Implicit,
    /// Combo: destinations are accumulated as they are committed
    Explicit(RowSetBuilder),
}

impl ChangeTracking {
    /// Tracking mode for a new cycle
    pub fn for_step(is_combo: bool) -> Self {
        if is_combo {
            ChangeTracking::Explicit(RowSetBuilder::new())
        } else {
            ChangeTracking::Implicit
        }
    }

    pub fn is_explicit(&self) -> bool {
        matches!(self, ChangeTracking::Explicit(_))
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, ChangeTracking::Idle)
    }

    /// Note a committed destination; a no-op unless explicit
    #[inline]
    pub fn record(&mut self, destination: Destination) {
        if let ChangeTracking::Explicit(builder) = self {
            builder.add_key(destination.into());
        }
    }

    /// Consume the tracker and produce the destinations changed this cycle
    pub fn into_changed(self, downstream: &Update) -> Result<RowSet> {
        match self {
            ChangeTracking::Idle => Err(AggregationError::NoActiveCycle("propagate_updates")),
            ChangeTracking::Implicit => Ok(downstream.modified.union(&downstream.added)),
            ChangeTracking::Explicit(builder) => Ok(builder.build()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_implicit_uses_downstream_update() {
        let downstream = Update {
            added: RowSet::from_destinations([4u32]),
            modified: RowSet::from_destinations([1u32, 2]),
            ..Default::default()
        };
        let mut tracking = ChangeTracking::for_step(false);
        tracking.record(9);
        let changed = tracking.into_changed(&downstream).unwrap();
        assert_eq!(changed.destinations().collect::<Vec<_>>(), vec![1, 2, 4]);
    }

    #[test]
    fn test_explicit_ignores_downstream_update() {
        let downstream = Update {
            modified: RowSet::from_destinations([2u32, 9]),
            ..Default::default()
        };
        let mut tracking = ChangeTracking::for_step(true);
        assert!(tracking.is_explicit());
        tracking.record(7);
        tracking.record(2);
        tracking.record(7);
        let changed = tracking.into_changed(&downstream).unwrap();
        assert_eq!(changed.destinations().collect::<Vec<_>>(), vec![2, 7]);
    }

    #[test]
    fn test_idle_cannot_propagate() {
        let tracking = ChangeTracking::default();
        assert!(tracking.is_idle());
        assert!(matches!(
            tracking.into_changed(&Update::default()),
            Err(AggregationError::NoActiveCycle(_))
        ));
    }
}

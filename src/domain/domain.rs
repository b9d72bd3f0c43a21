use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::axis::Axis;
use super::bounds::AxisBounds;
use crate::error::RequestError;

/// A named set of per-axis coordinate bounds: one geographic/temporal window.
///
/// Domains are created once from the request's declarations and never mutated;
/// intersection and rename produce fresh values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub name: String,
    pub axes: BTreeMap<Axis, AxisBounds>,
}

impl Domain {
    pub fn new(name: impl Into<String>) -> Self {
        Domain {
            name: name.into(),
            axes: BTreeMap::new(),
        }
    }

    pub fn with_axis(mut self, bounds: AxisBounds) -> Self {
        self.axes.insert(bounds.axis, bounds);
        self
    }

    pub fn axis(&self, axis: Axis) -> Option<&AxisBounds> {
        self.axes.get(&axis)
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }

    /// Per-axis pairwise intersection under a new name. Axes present on only
    /// one side pass through unless broadcast suppression drops them.
    pub fn intersect(
        &self,
        new_name: impl Into<String>,
        other: &Domain,
        allow_broadcast: bool,
    ) -> Result<Domain, RequestError> {
        let mut result = Domain::new(new_name);
        for (axis, bounds) in &self.axes {
            match other.axes.get(axis) {
                Some(other_bounds) => {
                    result
                        .axes
                        .insert(*axis, bounds.intersect(other_bounds, allow_broadcast)?);
                }
                None => {
                    if !(allow_broadcast && bounds.is_broadcast()) {
                        result.axes.insert(*axis, bounds.clone());
                    }
                }
            }
        }
        for (axis, bounds) in &other.axes {
            if !self.axes.contains_key(axis) && !(allow_broadcast && bounds.is_broadcast()) {
                result.axes.insert(*axis, bounds.clone());
            }
        }
        Ok(result)
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bounds::{BoundValue, CoordSystem};

    fn bounds(axis: Axis, name: &str, start: f64, end: f64) -> AxisBounds {
        AxisBounds::new(
            axis,
            name,
            BoundValue::Number(start),
            BoundValue::Number(end),
            CoordSystem::Values,
        )
        .unwrap()
    }

    #[test]
    fn test_intersect_overlapping_axes() {
        let d1 = Domain::new("d1")
            .with_axis(bounds(Axis::Y, "lat", 0.0, 60.0))
            .with_axis(bounds(Axis::X, "lon", 10.0, 50.0));
        let d2 = Domain::new("d2").with_axis(bounds(Axis::Y, "lat", 30.0, 90.0));

        let i = d1.intersect("i", &d2, false).unwrap();
        assert_eq!(i.axis(Axis::Y).unwrap().start, BoundValue::Number(30.0));
        assert_eq!(i.axis(Axis::Y).unwrap().end, BoundValue::Number(60.0));
        // lon passes through
        assert_eq!(i.axis(Axis::X).unwrap().start, BoundValue::Number(10.0));
    }

    #[test]
    fn test_intersect_commutes_without_broadcast() {
        let d1 = Domain::new("d1")
            .with_axis(bounds(Axis::Y, "lat", 0.0, 60.0))
            .with_axis(bounds(Axis::T, "time", 5.0, 20.0));
        let d2 = Domain::new("d2")
            .with_axis(bounds(Axis::Y, "lat", 30.0, 90.0))
            .with_axis(bounds(Axis::T, "time", 0.0, 10.0));

        let a = d1.intersect("a", &d2, false).unwrap();
        let b = d2.intersect("b", &d1, false).unwrap();
        for axis in [Axis::Y, Axis::T] {
            assert_eq!(a.axis(axis).unwrap().start, b.axis(axis).unwrap().start);
            assert_eq!(a.axis(axis).unwrap().end, b.axis(axis).unwrap().end);
        }
    }

    #[test]
    fn test_broadcast_axis_suppressed_from_passthrough() {
        let d1 = Domain::new("d1").with_axis(bounds(Axis::Z, "lev", 500.0, 500.0));
        let d2 = Domain::new("d2").with_axis(bounds(Axis::Y, "lat", 0.0, 10.0));
        let i = d1.intersect("i", &d2, true).unwrap();
        assert!(i.axis(Axis::Z).is_none());
        assert!(i.axis(Axis::Y).is_some());
    }
}

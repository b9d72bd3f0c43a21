//! Labeled multi-dimensional arrays and datasets.
//!
//! Arrays arrive from the data-loader collaborator with named coordinate
//! axes; the engine subsets, aligns, and reduces them before kernels run.
//! Values are stored row-major in a flat `Vec<f64>` with a parallel list of
//! coordinate axes.

use std::collections::{HashMap, HashSet};
use std::ops::Range;

use serde_json::Value;

use crate::domain::bounds::{parse_instant, BoundValue, CoordSystem, TimeOffset};
use crate::domain::{Axis, Domain};
use crate::error::RequestError;

/// One coordinate axis of a [`DataArray`].
#[derive(Debug, Clone, PartialEq)]
pub struct CoordAxis {
    pub axis: Axis,
    pub name: String,
    pub system: CoordSystem,
    pub values: Vec<BoundValue>,
}

impl CoordAxis {
    pub fn numeric(axis: Axis, name: impl Into<String>, values: Vec<f64>) -> Self {
        CoordAxis {
            axis,
            name: name.into(),
            system: CoordSystem::Values,
            values: values.into_iter().map(BoundValue::Number).collect(),
        }
    }

    pub fn timestamps(name: impl Into<String>, values: Vec<String>) -> Self {
        CoordAxis {
            axis: Axis::T,
            name: name.into(),
            system: CoordSystem::Timestamps,
            values: values.into_iter().map(BoundValue::Time).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// First and last coordinate (coordinates are stored monotonically).
    pub fn extent(&self) -> Result<(BoundValue, BoundValue), RequestError> {
        match (self.values.first(), self.values.last()) {
            (Some(first), Some(last)) => Ok((first.clone(), last.clone())),
            _ => Err(RequestError::InternalError(format!(
                "axis '{}' has no coordinates",
                self.name
            ))),
        }
    }

    /// Coordinates as numbers; timestamps become epoch seconds.
    pub fn as_numbers(&self) -> Result<Vec<f64>, RequestError> {
        self.values
            .iter()
            .map(|v| match v {
                BoundValue::Number(n) => Ok(*n),
                BoundValue::Time(s) => Ok(parse_instant(s)?.and_utc().timestamp() as f64),
            })
            .collect()
    }
}

/// A labeled multi-dimensional array.
#[derive(Debug, Clone)]
pub struct DataArray {
    pub name: String,
    /// Dimension roles, parallel to `shape` and `coords`.
    pub dims: Vec<Axis>,
    pub shape: Vec<usize>,
    /// Row-major values.
    pub values: Vec<f64>,
    pub coords: Vec<CoordAxis>,
    pub attributes: HashMap<String, Value>,
    /// Declared domain of the array's source, if any.
    pub domain_id: Option<String>,
    /// Names of every domain already applied to this array, so subsetting is
    /// never repeated.
    pub applied_domains: HashSet<String>,
}

impl DataArray {
    pub fn new(
        name: impl Into<String>,
        coords: Vec<CoordAxis>,
        values: Vec<f64>,
    ) -> Result<Self, RequestError> {
        let shape: Vec<usize> = coords.iter().map(|c| c.len()).collect();
        let expected: usize = shape.iter().product();
        if values.len() != expected {
            return Err(RequestError::InternalError(format!(
                "array value count {} does not match shape {:?}",
                values.len(),
                shape
            )));
        }
        Ok(DataArray {
            name: name.into(),
            dims: coords.iter().map(|c| c.axis).collect(),
            shape,
            values,
            coords,
            attributes: HashMap::new(),
            domain_id: None,
            applied_domains: HashSet::new(),
        })
    }

    pub fn element_count(&self) -> usize {
        self.values.len()
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn coord(&self, axis: Axis) -> Option<&CoordAxis> {
        self.coords.iter().find(|c| c.axis == axis)
    }

    fn dim_index(&self, axis: Axis) -> Option<usize> {
        self.dims.iter().position(|d| *d == axis)
    }

    /// Row-major strides.
    fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1usize; self.shape.len()];
        for i in (0..self.shape.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * self.shape[i + 1];
        }
        strides
    }

    /// Slice the array to per-dimension index ranges.
    pub fn slice(&self, ranges: &[Range<usize>]) -> Result<DataArray, RequestError> {
        if ranges.len() != self.shape.len() {
            return Err(RequestError::InternalError(format!(
                "slice rank {} does not match array rank {}",
                ranges.len(),
                self.shape.len()
            )));
        }
        for (i, r) in ranges.iter().enumerate() {
            if r.start > r.end || r.end > self.shape[i] {
                return Err(RequestError::InternalError(format!(
                    "slice {:?} out of range for dimension {} (len {})",
                    r, i, self.shape[i]
                )));
            }
        }
        let out_shape: Vec<usize> = ranges.iter().map(|r| r.len()).collect();
        let out_len: usize = out_shape.iter().product();
        let strides = self.strides();

        let mut out_values = Vec::with_capacity(out_len);
        let mut index: Vec<usize> = ranges.iter().map(|r| r.start).collect();
        if out_len > 0 {
            loop {
                let flat: usize = index.iter().zip(&strides).map(|(i, s)| i * s).sum();
                out_values.push(self.values[flat]);
                // odometer increment over the slice window
                let mut done = true;
                for dim in (0..index.len()).rev() {
                    index[dim] += 1;
                    if index[dim] < ranges[dim].end {
                        done = false;
                        break;
                    }
                    index[dim] = ranges[dim].start;
                }
                if done {
                    break;
                }
            }
        }

        let out_coords: Vec<CoordAxis> = self
            .coords
            .iter()
            .zip(ranges)
            .map(|(c, r)| CoordAxis {
                axis: c.axis,
                name: c.name.clone(),
                system: c.system,
                values: c.values[r.clone()].to_vec(),
            })
            .collect();

        let mut out = DataArray::new(self.name.clone(), out_coords, out_values)?;
        out.attributes = self.attributes.clone();
        out.domain_id = self.domain_id.clone();
        out.applied_domains = self.applied_domains.clone();
        Ok(out)
    }

    /// Subset the array to a domain: for every domain axis present in the
    /// array, resolve the bound to an index range and slice.
    pub fn subset(&self, domain: &Domain) -> Result<DataArray, RequestError> {
        let mut ranges: Vec<Range<usize>> = self.shape.iter().map(|len| 0..*len).collect();
        for (axis, bounds) in &domain.axes {
            let Some(dim) = self.dim_index(*axis) else {
                continue;
            };
            let coord = &self.coords[dim];
            ranges[dim] = resolve_range(coord, bounds)?;
        }
        self.slice(&ranges)
    }

    /// Subtract a previously applied time offset from the time coordinates,
    /// making the lag invisible to downstream consumers.
    pub fn revert_axis(&mut self, offset: &TimeOffset) -> Result<(), RequestError> {
        let Some(dim) = self.dim_index(Axis::T) else {
            return Ok(());
        };
        let inverse = offset.invert();
        let coord = &mut self.coords[dim];
        for value in &mut coord.values {
            if let BoundValue::Time(s) = value {
                let reverted = inverse.apply(parse_instant(s)?)?;
                *s = reverted.format("%Y-%m-%dT%H:%M:%S").to_string();
            }
        }
        Ok(())
    }

    /// Reduce over a set of axes with an elementwise accumulator, optionally
    /// weighting along one axis (e.g. cos-lat weights along Y).
    pub fn reduce_axes(
        &self,
        axes: &[Axis],
        op: ReduceOp,
        weights: Option<(Axis, &[f64])>,
    ) -> Result<DataArray, RequestError> {
        let reduced: Vec<bool> = self.dims.iter().map(|d| axes.contains(d)).collect();
        if !reduced.iter().any(|r| *r) {
            return Ok(self.clone());
        }
        let out_coords: Vec<CoordAxis> = self
            .coords
            .iter()
            .zip(&reduced)
            .filter(|(_, r)| !**r)
            .map(|(c, _)| c.clone())
            .collect();
        let out_shape: Vec<usize> = out_coords.iter().map(|c| c.len()).collect();
        let out_len: usize = out_shape.iter().product::<usize>().max(1);

        let weight_dim = weights.and_then(|(axis, _)| self.dim_index(axis));
        if let (Some((axis, w)), Some(dim)) = (weights, weight_dim) {
            if w.len() != self.shape[dim] {
                return Err(RequestError::InternalError(format!(
                    "weight count {} does not match axis {} length {}",
                    w.len(),
                    axis.token(),
                    self.shape[dim]
                )));
            }
        }

        let mut acc = vec![ReduceAcc::new(op); out_len];

        // Map each input multi-index onto its output cell.
        let strides = self.strides();
        let mut out_strides = vec![0usize; self.shape.len()];
        {
            let mut stride = 1usize;
            for i in (0..self.shape.len()).rev() {
                if !reduced[i] {
                    out_strides[i] = stride;
                    stride *= self.shape[i];
                }
            }
        }

        for flat in 0..self.values.len() {
            let mut rem = flat;
            let mut out_flat = 0usize;
            let mut weight = 1.0f64;
            for (dim, stride) in strides.iter().enumerate() {
                let idx = rem / stride;
                rem %= stride;
                if !reduced[dim] {
                    out_flat += idx * out_strides[dim];
                } else if Some(dim) == weight_dim {
                    weight = weights.map(|(_, w)| w[idx]).unwrap_or(1.0);
                }
            }
            acc[out_flat].push(self.values[flat], weight);
        }

        let out_values: Vec<f64> = acc.into_iter().map(|a| a.finish()).collect();
        let mut out = DataArray::new(self.name.clone(), out_coords, out_values)?;
        out.attributes = self.attributes.clone();
        out.domain_id = self.domain_id.clone();
        out.applied_domains = self.applied_domains.clone();
        Ok(out)
    }
}

/// Resolve one axis bound to an index range over a coordinate axis.
fn resolve_range(
    coord: &CoordAxis,
    bounds: &crate::domain::AxisBounds,
) -> Result<Range<usize>, RequestError> {
    use std::cmp::Ordering;
    match bounds.system {
        CoordSystem::Indices => {
            let start = bounds
                .start
                .as_number()
                .ok_or_else(|| RequestError::ConfigError(format!(
                    "axis '{}': index bound must be numeric",
                    bounds.name
                )))? as usize;
            let end = bounds
                .end
                .as_number()
                .ok_or_else(|| RequestError::ConfigError(format!(
                    "axis '{}': index bound must be numeric",
                    bounds.name
                )))? as usize;
            let end = end.min(coord.len().saturating_sub(1));
            if start > end || start >= coord.len() {
                return Err(RequestError::EmptyIntersection {
                    axis: bounds.name.clone(),
                    detail: format!("index range [{start}, {end}] outside axis of length {}", coord.len()),
                });
            }
            Ok(start..end + 1)
        }
        CoordSystem::Values | CoordSystem::Timestamps => {
            let mut first = None;
            let mut last = None;
            for (i, value) in coord.values.iter().enumerate() {
                let ge_start = bounds.start.compare(value)? != Ordering::Greater;
                let le_end = bounds.end.compare(value)? != Ordering::Less;
                if ge_start && le_end {
                    if first.is_none() {
                        first = Some(i);
                    }
                    last = Some(i);
                }
            }
            match (first, last) {
                (Some(first), Some(last)) => Ok(first..last + 1),
                _ => Err(RequestError::EmptyIntersection {
                    axis: bounds.name.clone(),
                    detail: format!(
                        "no coordinates inside [{}, {}]",
                        bounds.start, bounds.end
                    ),
                }),
            }
        }
    }
}

/// Reduction operator applied over one or more axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Mean,
    Max,
    Min,
}

#[derive(Debug, Clone, Copy)]
struct ReduceAcc {
    op: ReduceOp,
    sum: f64,
    weight: f64,
    extreme: f64,
    seen: bool,
}

impl ReduceAcc {
    fn new(op: ReduceOp) -> Self {
        ReduceAcc {
            op,
            sum: 0.0,
            weight: 0.0,
            extreme: f64::NAN,
            seen: false,
        }
    }

    fn push(&mut self, value: f64, weight: f64) {
        match self.op {
            ReduceOp::Sum | ReduceOp::Mean => {
                self.sum += value * weight;
                self.weight += weight;
            }
            ReduceOp::Max => {
                if !self.seen || value > self.extreme {
                    self.extreme = value;
                }
            }
            ReduceOp::Min => {
                if !self.seen || value < self.extreme {
                    self.extreme = value;
                }
            }
        }
        self.seen = true;
    }

    fn finish(self) -> f64 {
        match self.op {
            ReduceOp::Sum => self.sum,
            ReduceOp::Mean => {
                if self.weight > 0.0 {
                    self.sum / self.weight
                } else {
                    f64::NAN
                }
            }
            ReduceOp::Max | ReduceOp::Min => self.extreme,
        }
    }
}

/// A named set of result arrays with request-level attributes.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub id: String,
    pub arrays: Vec<DataArray>,
    pub attributes: HashMap<String, Value>,
}

impl Dataset {
    pub fn new(id: impl Into<String>) -> Self {
        Dataset {
            id: id.into(),
            arrays: Vec::new(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_arrays(id: impl Into<String>, arrays: Vec<DataArray>) -> Self {
        Dataset {
            id: id.into(),
            arrays,
            attributes: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bounds::AxisBounds;

    fn grid_3x4() -> DataArray {
        // lat 3 x lon 4, values 0..12
        DataArray::new(
            "tas",
            vec![
                CoordAxis::numeric(Axis::Y, "lat", vec![10.0, 20.0, 30.0]),
                CoordAxis::numeric(Axis::X, "lon", vec![100.0, 110.0, 120.0, 130.0]),
            ],
            (0..12).map(|v| v as f64).collect(),
        )
        .unwrap()
    }

    fn value_bounds(axis: Axis, name: &str, start: f64, end: f64) -> AxisBounds {
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
    fn test_shape_mismatch_rejected() {
        assert!(DataArray::new(
            "bad",
            vec![CoordAxis::numeric(Axis::X, "lon", vec![0.0, 1.0])],
            vec![1.0, 2.0, 3.0],
        )
        .is_err());
    }

    #[test]
    fn test_slice_by_index() {
        let arr = grid_3x4();
        let sliced = arr.slice(&[1..3, 0..2]).unwrap();
        assert_eq!(sliced.shape, vec![2, 2]);
        assert_eq!(sliced.values, vec![4.0, 5.0, 8.0, 9.0]);
        assert_eq!(
            sliced.coord(Axis::Y).unwrap().values,
            vec![BoundValue::Number(20.0), BoundValue::Number(30.0)]
        );
    }

    #[test]
    fn test_subset_by_values_matches_direct_slice() {
        let arr = grid_3x4();
        let domain = Domain::new("d0")
            .with_axis(value_bounds(Axis::Y, "lat", 20.0, 30.0))
            .with_axis(value_bounds(Axis::X, "lon", 100.0, 110.0));
        let subset = arr.subset(&domain).unwrap();
        let direct = arr.slice(&[1..3, 0..2]).unwrap();
        assert_eq!(subset.values, direct.values);
        assert_eq!(subset.shape, direct.shape);
    }

    #[test]
    fn test_subset_by_indices() {
        let arr = grid_3x4();
        let mut bounds = value_bounds(Axis::X, "lon", 1.0, 2.0);
        bounds.system = CoordSystem::Indices;
        let domain = Domain::new("d0").with_axis(bounds);
        let subset = arr.subset(&domain).unwrap();
        assert_eq!(subset.shape, vec![3, 2]);
        assert_eq!(
            subset.coord(Axis::X).unwrap().values,
            vec![BoundValue::Number(110.0), BoundValue::Number(120.0)]
        );
    }

    #[test]
    fn test_subset_empty_fails() {
        let arr = grid_3x4();
        let domain = Domain::new("d0").with_axis(value_bounds(Axis::Y, "lat", 500.0, 600.0));
        assert!(matches!(
            arr.subset(&domain),
            Err(RequestError::EmptyIntersection { .. })
        ));
    }

    #[test]
    fn test_reduce_mean_unweighted() {
        let arr = grid_3x4();
        let reduced = arr.reduce_axes(&[Axis::X], ReduceOp::Mean, None).unwrap();
        assert_eq!(reduced.shape, vec![3]);
        assert_eq!(reduced.values, vec![1.5, 5.5, 9.5]);
    }

    #[test]
    fn test_reduce_all_axes_to_scalar() {
        let arr = grid_3x4();
        let reduced = arr
            .reduce_axes(&[Axis::X, Axis::Y], ReduceOp::Sum, None)
            .unwrap();
        assert_eq!(reduced.shape, Vec::<usize>::new());
        assert_eq!(reduced.values, vec![66.0]);
    }

    #[test]
    fn test_reduce_weighted_mean() {
        // 2x2 grid, weights favor the second row entirely
        let arr = DataArray::new(
            "v",
            vec![
                CoordAxis::numeric(Axis::Y, "lat", vec![0.0, 45.0]),
                CoordAxis::numeric(Axis::X, "lon", vec![0.0, 10.0]),
            ],
            vec![1.0, 3.0, 5.0, 7.0],
        )
        .unwrap();
        let reduced = arr
            .reduce_axes(&[Axis::Y], ReduceOp::Mean, Some((Axis::Y, &[0.0, 1.0])))
            .unwrap();
        assert_eq!(reduced.values, vec![5.0, 7.0]);
    }

    #[test]
    fn test_reduce_max_min() {
        let arr = grid_3x4();
        let max = arr.reduce_axes(&[Axis::Y], ReduceOp::Max, None).unwrap();
        assert_eq!(max.values, vec![8.0, 9.0, 10.0, 11.0]);
        let min = arr.reduce_axes(&[Axis::Y], ReduceOp::Min, None).unwrap();
        assert_eq!(min.values, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_revert_axis_restores_time_coords() {
        let mut arr = DataArray::new(
            "v",
            vec![CoordAxis::timestamps(
                "time",
                vec!["2001-01-01T00:00:00".into(), "2001-02-01T00:00:00".into()],
            )],
            vec![1.0, 2.0],
        )
        .unwrap();
        let offset = TimeOffset::parse("1y").unwrap();
        // Simulate coords that were loaded under the shifted window
        for value in &mut arr.coords[0].values {
            if let BoundValue::Time(s) = value {
                let shifted = offset.apply(parse_instant(s).unwrap()).unwrap();
                *s = shifted.format("%Y-%m-%dT%H:%M:%S").to_string();
            }
        }
        arr.revert_axis(&offset).unwrap();
        assert_eq!(
            arr.coords[0].values,
            vec![
                BoundValue::Time("2001-01-01T00:00:00".into()),
                BoundValue::Time("2001-02-01T00:00:00".into()),
            ]
        );
    }
}

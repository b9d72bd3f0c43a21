//! Pre-kernel input conditioning: pending-domain subsetting, time-axis
//! alignment, and calendar grouping/resampling.
//!
//! Each step runs uniformly over one cross-section group so every array a
//! kernel sees has been cut, aligned, and binned the same way.

use std::collections::BTreeMap;

use crate::data::{CoordAxis, DataArray};
use crate::domain::bounds::{parse_instant, BoundValue, CoordSystem, TimeOffset};
use crate::domain::{Axis, Domain};
use crate::error::RequestError;
use crate::graph::types::{AlignStrategy, Frequency, GroupSpec};

use super::context::RequestContext;

/// Apply every not-yet-applied domain to each array of a group.
///
/// The pending set is the array's declared source domain plus the
/// operation's domain, minus provenance. Pending domains are intersected
/// with broadcasting off, cropped against the actual coordinate extents,
/// and applied in one subset; applied names are recorded so re-visiting a
/// shared array never subsets twice. A time offset carried by the domain is
/// reverted on the subset coordinates immediately, keeping the lag invisible
/// downstream.
pub fn subset_group(
    ctx: &mut RequestContext,
    op_domain: Option<&str>,
    group: &mut [DataArray],
) -> Result<(), RequestError> {
    for array in group.iter_mut() {
        let mut pending: Vec<String> = Vec::new();
        if let Some(id) = &array.domain_id {
            if !array.applied_domains.contains(id) {
                pending.push(id.clone());
            }
        }
        if let Some(id) = op_domain {
            if !array.applied_domains.contains(id) && !pending.iter().any(|p| p == id) {
                pending.push(id.to_string());
            }
        }
        if pending.is_empty() {
            continue;
        }

        let target_id = ctx
            .domains
            .intersect_domains(&pending, false)?
            .ok_or_else(|| RequestError::InternalError("empty pending domain set".into()))?;
        let domain = ctx.domains.get(&target_id)?.clone();

        let mut cropped = Domain::new(domain.name.clone());
        let mut offset: Option<TimeOffset> = None;
        for (axis, bounds) in &domain.axes {
            let next = match array.coord(*axis) {
                // Index windows are positions, not coordinate values; they
                // are clamped during range resolution instead.
                Some(coord) if bounds.system != CoordSystem::Indices => {
                    let (min, max) = coord.extent()?;
                    bounds.crop(&min, &max)?
                }
                _ => bounds.clone(),
            };
            if *axis == Axis::T {
                offset = next.offset.clone();
            }
            cropped = cropped.with_axis(next);
        }

        *array = array.subset(&cropped)?;
        if let Some(offset) = &offset {
            array.revert_axis(offset)?;
        }
        for id in pending {
            array.applied_domains.insert(id);
        }
        array.applied_domains.insert(target_id);
    }
    Ok(())
}

/// Align a group's time axes onto one target array's time coordinates.
///
/// The extremity policy picks the time-bearing array with the largest or
/// smallest element count as the target; every other time-bearing array is
/// linearly resampled onto the target coordinates, clamping outside the
/// source extent. Arrays without a time axis pass through.
pub fn align_group(
    group: Vec<DataArray>,
    strategy: AlignStrategy,
) -> Result<Vec<DataArray>, RequestError> {
    let sizes: Vec<Option<usize>> = group
        .iter()
        .map(|a| a.coord(Axis::T).map(|_| a.element_count()))
        .collect();
    if sizes.iter().flatten().count() < 2 {
        return Ok(group);
    }
    let target_index = match strategy {
        AlignStrategy::Largest => sizes
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.map(|s| (i, s)))
            .max_by_key(|(_, s)| *s),
        AlignStrategy::Smallest => sizes
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.map(|s| (i, s)))
            .min_by_key(|(_, s)| *s),
    }
    .map(|(i, _)| i)
    .unwrap_or(0);

    let target_coord = group[target_index]
        .coord(Axis::T)
        .cloned()
        .ok_or_else(|| RequestError::InternalError("alignment target lost its time axis".into()))?;
    let target_times = target_coord.as_numbers()?;

    group
        .into_iter()
        .enumerate()
        .map(|(i, array)| {
            if i == target_index || array.coord(Axis::T).is_none() {
                Ok(array)
            } else {
                interpolate_time(&array, &target_times, &target_coord)
            }
        })
        .collect()
}

fn row_major_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

/// Linear interpolation of one array onto target time coordinates.
fn interpolate_time(
    array: &DataArray,
    target_times: &[f64],
    target_coord: &CoordAxis,
) -> Result<DataArray, RequestError> {
    let dim = array
        .dims
        .iter()
        .position(|d| *d == Axis::T)
        .ok_or_else(|| RequestError::InternalError("interpolation needs a time axis".into()))?;
    let source_times = array.coords[dim].as_numbers()?;
    if source_times.is_empty() {
        return Err(RequestError::EmptyIntersection {
            axis: array.coords[dim].name.clone(),
            detail: "no source time coordinates to interpolate from".into(),
        });
    }
    if source_times == target_times {
        return Ok(array.clone());
    }

    let last = source_times.len() - 1;
    let brackets: Vec<(usize, usize, f64)> = target_times
        .iter()
        .map(|&t| {
            if t <= source_times[0] {
                (0, 0, 0.0)
            } else if t >= source_times[last] {
                (last, last, 0.0)
            } else {
                let upper = source_times.partition_point(|&s| s < t);
                let lower = upper - 1;
                let span = source_times[upper] - source_times[lower];
                let weight = if span > 0.0 {
                    (t - source_times[lower]) / span
                } else {
                    0.0
                };
                (lower, upper, weight)
            }
        })
        .collect();

    let mut out_shape = array.shape.clone();
    out_shape[dim] = target_times.len();
    let out_len: usize = out_shape.iter().product();
    let out_strides = row_major_strides(&out_shape);
    let source_strides = row_major_strides(&array.shape);

    let mut values = vec![0.0f64; out_len];
    for (flat, value) in values.iter_mut().enumerate() {
        let mut rem = flat;
        let mut lower_flat = 0usize;
        let mut upper_flat = 0usize;
        let mut weight = 0.0f64;
        for (d, stride) in out_strides.iter().enumerate() {
            let idx = rem / stride;
            rem %= stride;
            if d == dim {
                let (lower, upper, w) = brackets[idx];
                lower_flat += lower * source_strides[d];
                upper_flat += upper * source_strides[d];
                weight = w;
            } else {
                lower_flat += idx * source_strides[d];
                upper_flat += idx * source_strides[d];
            }
        }
        *value = array.values[lower_flat] * (1.0 - weight) + array.values[upper_flat] * weight;
    }

    let mut coords = array.coords.clone();
    coords[dim] = CoordAxis {
        axis: Axis::T,
        name: coords[dim].name.clone(),
        system: target_coord.system,
        values: target_coord.values.clone(),
    };
    let mut out = DataArray::new(array.name.clone(), coords, values)?;
    out.attributes = array.attributes.clone();
    out.domain_id = array.domain_id.clone();
    out.applied_domains = array.applied_domains.clone();
    Ok(out)
}

/// Bin an array along its time axis and average each bin.
///
/// Climatology mode (`groupby`) folds all years into calendar bins labeled
/// with numeric month (1-12), season (1-4, DJF first), or year values.
/// Resample mode keeps one bin per (year, period) labeled with the first
/// timestamp of the bin.
pub fn group_along_time(
    array: &DataArray,
    spec: &GroupSpec,
    climatology: bool,
) -> Result<DataArray, RequestError> {
    let Some(dim) = array.dims.iter().position(|d| *d == Axis::T) else {
        return Ok(array.clone());
    };
    let coord = &array.coords[dim];

    use chrono::Datelike;

    let mut keys = Vec::with_capacity(coord.len());
    for value in &coord.values {
        let token = match value {
            BoundValue::Time(s) => s,
            BoundValue::Number(n) => {
                return Err(RequestError::ConfigError(format!(
                    "grouping requires timestamp coordinates on '{}', got {n}",
                    coord.name
                )))
            }
        };
        let instant = parse_instant(token)?;
        let (year, month) = (instant.year() as i64, instant.month() as i64);
        let (season_year, season) = match month {
            12 => (year + 1, 1),
            1 | 2 => (year, 1),
            3..=5 => (year, 2),
            6..=8 => (year, 3),
            _ => (year, 4),
        };
        let key = match (climatology, spec.frequency) {
            (true, Frequency::Month) => month,
            (true, Frequency::Season) => season,
            (true, Frequency::Year) => year,
            (false, Frequency::Month) => year * 12 + (month - 1),
            (false, Frequency::Season) => season_year * 4 + (season - 1),
            (false, Frequency::Year) => year,
        };
        keys.push(key);
    }

    // Bin index per distinct key, chronological by key.
    let mut bins: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (t, key) in keys.iter().enumerate() {
        bins.entry(*key).or_default().push(t);
    }
    let bin_count = bins.len();
    let mut bin_of = vec![0usize; coord.len()];
    let mut labels = Vec::with_capacity(bin_count);
    for (position, (key, members)) in bins.iter().enumerate() {
        for &t in members {
            bin_of[t] = position;
        }
        labels.push(if climatology {
            BoundValue::Number(*key as f64)
        } else {
            coord.values[members[0]].clone()
        });
    }

    let mut out_shape = array.shape.clone();
    out_shape[dim] = bin_count;
    let out_len: usize = out_shape.iter().product();
    let out_strides = row_major_strides(&out_shape);
    let strides = row_major_strides(&array.shape);

    let mut sums = vec![0.0f64; out_len];
    let mut counts = vec![0usize; out_len];
    for (flat, value) in array.values.iter().enumerate() {
        let mut rem = flat;
        let mut out_flat = 0usize;
        for (d, stride) in strides.iter().enumerate() {
            let idx = rem / stride;
            rem %= stride;
            let out_idx = if d == dim { bin_of[idx] } else { idx };
            out_flat += out_idx * out_strides[d];
        }
        sums[out_flat] += value;
        counts[out_flat] += 1;
    }
    let values: Vec<f64> = sums
        .into_iter()
        .zip(&counts)
        .map(|(s, &c)| if c > 0 { s / c as f64 } else { f64::NAN })
        .collect();

    let mut coords = array.coords.clone();
    coords[dim] = CoordAxis {
        axis: Axis::T,
        name: coord.name.clone(),
        system: if climatology {
            CoordSystem::Values
        } else {
            CoordSystem::Timestamps
        },
        values: labels,
    };
    let mut out = DataArray::new(array.name.clone(), coords, values)?;
    out.attributes = array.attributes.clone();
    out.domain_id = array.domain_id.clone();
    out.applied_domains = array.applied_domains.clone();
    Ok(out)
}

/// Split reduction axes into the spatial pass and the time pass used when a
/// kernel does not handle mixed reductions internally.
pub fn split_reduction_axes(axes: &[Axis]) -> (Vec<Axis>, Vec<Axis>) {
    let spatial: Vec<Axis> = axes.iter().copied().filter(Axis::is_spatial).collect();
    let time: Vec<Axis> = axes.iter().copied().filter(|a| *a == Axis::T).collect();
    (spatial, time)
}

//! Builtin kernel set. The heavy numerics of a production deployment live in
//! external modules; these kernels cover the execution contract end to end
//! with simple, deterministic math.

use crate::data::{DataArray, ReduceOp};
use crate::domain::Axis;
use crate::error::KernelError;

use super::{Kernel, KernelArgs, KernelSpec};

/// Passthrough kernel.
pub struct NoopKernel {
    spec: KernelSpec,
}

impl NoopKernel {
    pub fn new() -> Self {
        NoopKernel {
            spec: KernelSpec::new("core", "noop", "No-op", "Returns its inputs unchanged"),
        }
    }
}

impl Default for NoopKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl Kernel for NoopKernel {
    fn spec(&self) -> &KernelSpec {
        &self.spec
    }

    fn compute(
        &self,
        _args: &KernelArgs<'_>,
        group: &[DataArray],
    ) -> Result<Vec<DataArray>, KernelError> {
        Ok(group.to_vec())
    }
}

/// Domain subsetting. The engine applies the domain intersection before any
/// kernel runs, so the compute step is a passthrough of the prepared arrays.
pub struct SubsetKernel {
    spec: KernelSpec,
}

impl SubsetKernel {
    pub fn new() -> Self {
        SubsetKernel {
            spec: KernelSpec::new(
                "core",
                "subset",
                "Subset",
                "Subsets inputs to the operation's domain",
            ),
        }
    }
}

impl Default for SubsetKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl Kernel for SubsetKernel {
    fn spec(&self) -> &KernelSpec {
        &self.spec
    }

    fn compute(
        &self,
        _args: &KernelArgs<'_>,
        group: &[DataArray],
    ) -> Result<Vec<DataArray>, KernelError> {
        Ok(group.to_vec())
    }
}

/// Axis reduction kernel: average (cos-lat weighted), sum, max, min.
pub struct ReduceKernel {
    spec: KernelSpec,
    op: ReduceOp,
    /// Weight spatial means by cos(latitude).
    weighted: bool,
}

impl ReduceKernel {
    pub fn average() -> Self {
        ReduceKernel {
            spec: KernelSpec::new(
                "core",
                "average",
                "Weighted Average",
                "Mean over the declared axes, cos-lat weighted over latitude",
            )
            .reducing(),
            op: ReduceOp::Mean,
            weighted: true,
        }
    }

    pub fn sum() -> Self {
        ReduceKernel {
            spec: KernelSpec::new("core", "sum", "Sum", "Sum over the declared axes").reducing(),
            op: ReduceOp::Sum,
            weighted: false,
        }
    }

    pub fn max() -> Self {
        ReduceKernel {
            spec: KernelSpec::new("core", "max", "Maximum", "Maximum over the declared axes")
                .reducing(),
            op: ReduceOp::Max,
            weighted: false,
        }
    }

    pub fn min() -> Self {
        ReduceKernel {
            spec: KernelSpec::new("core", "min", "Minimum", "Minimum over the declared axes")
                .reducing(),
            op: ReduceOp::Min,
            weighted: false,
        }
    }

    fn cos_lat_weights(array: &DataArray) -> Result<Option<Vec<f64>>, KernelError> {
        let Some(coord) = array.coord(Axis::Y) else {
            return Ok(None);
        };
        let lats = coord
            .as_numbers()
            .map_err(|e| KernelError::ComputeError(e.to_string()))?;
        Ok(Some(
            lats.iter()
                .map(|lat| (lat.to_radians()).cos().max(0.0))
                .collect(),
        ))
    }
}

impl Kernel for ReduceKernel {
    fn spec(&self) -> &KernelSpec {
        &self.spec
    }

    fn compute(
        &self,
        args: &KernelArgs<'_>,
        group: &[DataArray],
    ) -> Result<Vec<DataArray>, KernelError> {
        let mut outputs = Vec::with_capacity(group.len());
        for array in group {
            let weights = if self.weighted && args.axes.contains(&Axis::Y) {
                Self::cos_lat_weights(array)?
            } else {
                None
            };
            let reduced = array
                .reduce_axes(
                    args.axes,
                    self.op,
                    weights.as_deref().map(|w| (Axis::Y, w)),
                )
                .map_err(|e| KernelError::ComputeError(e.to_string()))?;
            outputs.push(reduced);
        }
        Ok(outputs)
    }
}

/// Two-input elementwise difference.
pub struct DiffKernel {
    spec: KernelSpec,
}

impl DiffKernel {
    pub fn new() -> Self {
        DiffKernel {
            spec: KernelSpec::new(
                "core",
                "diff",
                "Difference",
                "Elementwise difference of two same-shaped inputs",
            )
            .with_inputs(2, 2),
        }
    }
}

impl Default for DiffKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl Kernel for DiffKernel {
    fn spec(&self) -> &KernelSpec {
        &self.spec
    }

    fn compute(
        &self,
        _args: &KernelArgs<'_>,
        group: &[DataArray],
    ) -> Result<Vec<DataArray>, KernelError> {
        let (a, b) = (&group[0], &group[1]);
        if a.shape != b.shape {
            return Err(KernelError::ShapeMismatch(format!(
                "{:?} vs {:?}",
                a.shape, b.shape
            )));
        }
        let mut out = a.clone();
        out.values = a
            .values
            .iter()
            .zip(&b.values)
            .map(|(x, y)| x - y)
            .collect();
        out.name = format!("{}-{}", a.name, b.name);
        Ok(vec![out])
    }
}

/// Anomaly step of the composite decomposition chain: removes the time mean
/// from every spatial cell.
pub struct CorCovKernel {
    spec: KernelSpec,
}

impl CorCovKernel {
    pub fn new() -> Self {
        CorCovKernel {
            spec: KernelSpec::new(
                "decomp",
                "corcov",
                "Anomalies",
                "Removes the per-cell time mean ahead of decomposition",
            )
            .with_parent("svd"),
        }
    }
}

impl Default for CorCovKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl Kernel for CorCovKernel {
    fn spec(&self) -> &KernelSpec {
        &self.spec
    }

    fn compute(
        &self,
        _args: &KernelArgs<'_>,
        group: &[DataArray],
    ) -> Result<Vec<DataArray>, KernelError> {
        let mut outputs = Vec::with_capacity(group.len());
        for array in group {
            let means = array
                .reduce_axes(&[Axis::T], ReduceOp::Mean, None)
                .map_err(|e| KernelError::ComputeError(e.to_string()))?;
            let mut out = array.clone();
            let cell_count = means.values.len().max(1);
            for (i, value) in out.values.iter_mut().enumerate() {
                *value -= means.values[i % cell_count];
            }
            outputs.push(out);
        }
        Ok(outputs)
    }
}

/// Variance step of the composite decomposition chain.
pub struct EigenKernel {
    spec: KernelSpec,
}

impl EigenKernel {
    pub fn new() -> Self {
        EigenKernel {
            spec: KernelSpec::new(
                "decomp",
                "eigen",
                "Eigen modes",
                "Per-cell variance map of the anomaly field",
            )
            .with_parent("svd")
            .with_required(vec!["modes"]),
        }
    }
}

impl Default for EigenKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl Kernel for EigenKernel {
    fn spec(&self) -> &KernelSpec {
        &self.spec
    }

    fn compute(
        &self,
        args: &KernelArgs<'_>,
        group: &[DataArray],
    ) -> Result<Vec<DataArray>, KernelError> {
        let modes = args
            .option_usize("modes")?
            .ok_or_else(|| KernelError::MissingRequiredOption("modes".to_string()))?;
        let mut outputs = Vec::with_capacity(group.len());
        for array in group {
            let mut squared = array.clone();
            for value in &mut squared.values {
                *value *= *value;
            }
            let mut variance = squared
                .reduce_axes(&[Axis::T], ReduceOp::Mean, None)
                .map_err(|e| KernelError::ComputeError(e.to_string()))?;
            variance
                .attributes
                .insert("modes".to_string(), serde_json::json!(modes));
            outputs.push(variance);
        }
        Ok(outputs)
    }
}

/// Projection step of the composite decomposition chain: spatial sum of the
/// anomaly-weighted field, yielding one series per input.
pub struct ProjectKernel {
    spec: KernelSpec,
}

impl ProjectKernel {
    pub fn new() -> Self {
        ProjectKernel {
            spec: KernelSpec::new(
                "decomp",
                "project",
                "Projection",
                "Spatially integrates the decomposed field into series",
            )
            .with_parent("svd"),
        }
    }
}

impl Default for ProjectKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl Kernel for ProjectKernel {
    fn spec(&self) -> &KernelSpec {
        &self.spec
    }

    fn compute(
        &self,
        _args: &KernelArgs<'_>,
        group: &[DataArray],
    ) -> Result<Vec<DataArray>, KernelError> {
        let mut outputs = Vec::with_capacity(group.len());
        for array in group {
            let projected = array
                .reduce_axes(&[Axis::X, Axis::Y], ReduceOp::Sum, None)
                .map_err(|e| KernelError::ComputeError(e.to_string()))?;
            outputs.push(projected);
        }
        Ok(outputs)
    }
}

//! Data-loader collaborator: materializes leaf arrays for declared sources.
//!
//! The physical readers (collection/file/DAP/archive) live outside this
//! crate; the engine only depends on the [`DataLoader`] trait. The bundled
//! [`MemoryLoader`] serves tests and demos with deterministic synthetic
//! grids.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::data::{CoordAxis, DataArray, Dataset};
use crate::domain::{Axis, Domain};
use crate::error::RequestError;
use crate::source::VariableSource;

/// Materializes one labeled array per requested variable id, with its native
/// coordinate axes. An optional time-bounded domain enables partial reads.
#[async_trait]
pub trait DataLoader: Send + Sync {
    async fn load(
        &self,
        source: &VariableSource,
        domain: Option<&Domain>,
    ) -> Result<Dataset, RequestError>;
}

/// In-memory loader over pre-registered arrays, keyed by `(address, name)`.
#[derive(Default)]
pub struct MemoryLoader {
    arrays: RwLock<HashMap<(String, String), DataArray>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, address: impl Into<String>, array: DataArray) {
        self.arrays
            .write()
            .insert((address.into(), array.name.clone()), array);
    }

    /// Register a deterministic lat/lon/time grid for a variable: value at
    /// `(t, y, x)` is `t * 10000 + y * 100 + x`.
    pub fn insert_synthetic_grid(
        &self,
        address: impl Into<String>,
        variable: impl Into<String>,
        lat: Vec<f64>,
        lon: Vec<f64>,
        time: Vec<String>,
    ) {
        let variable = variable.into();
        let (nt, ny, nx) = (time.len(), lat.len(), lon.len());
        let mut values = Vec::with_capacity(nt * ny * nx);
        for t in 0..nt {
            for y in 0..ny {
                for x in 0..nx {
                    values.push((t * 10000 + y * 100 + x) as f64);
                }
            }
        }
        let array = DataArray::new(
            variable,
            vec![
                CoordAxis::timestamps("time", time),
                CoordAxis::numeric(Axis::Y, "lat", lat),
                CoordAxis::numeric(Axis::X, "lon", lon),
            ],
            values,
        )
        .expect("synthetic grid shape is consistent");
        self.insert(address, array);
    }
}

#[async_trait]
impl DataLoader for MemoryLoader {
    async fn load(
        &self,
        source: &VariableSource,
        domain: Option<&Domain>,
    ) -> Result<Dataset, RequestError> {
        let arrays = self.arrays.read();
        let mut dataset = Dataset::new(source.address.clone());
        for (name, id) in source.names.iter().zip(&source.ids) {
            let key = (source.address.clone(), name.clone());
            let array = arrays
                .get(&key)
                .ok_or_else(|| RequestError::DataUnavailable {
                    address: source.address.clone(),
                    detail: format!("variable '{name}' not found"),
                })?;
            tracing::debug!(address = %source.address, variable = %name, "loading array");
            // Partial read: honor only the time window here; spatial
            // subsetting happens in the execution pipeline.
            let mut loaded = match domain.and_then(|d| d.axis(Axis::T)) {
                Some(t_bounds) => {
                    let t_window = Domain::new("load-window").with_axis(t_bounds.clone());
                    array.subset(&t_window)?
                }
                None => array.clone(),
            };
            loaded.name = id.clone();
            loaded.domain_id = source.domain_id.clone();
            dataset.arrays.push(loaded);
        }
        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bounds::{AxisBounds, BoundValue, CoordSystem};
    use crate::source::SourceKind;

    fn source(ids: Vec<&str>, names: Vec<&str>) -> VariableSource {
        VariableSource {
            names: names.into_iter().map(String::from).collect(),
            ids: ids.into_iter().map(String::from).collect(),
            domain_id: Some("d0".into()),
            address: "collection://test".into(),
            kind: SourceKind::Collection,
            auth: None,
        }
    }

    fn loader_with_grid() -> MemoryLoader {
        let loader = MemoryLoader::new();
        loader.insert_synthetic_grid(
            "collection://test",
            "tas",
            vec![10.0, 20.0],
            vec![100.0, 110.0],
            vec![
                "2000-01-01T00:00:00".into(),
                "2000-02-01T00:00:00".into(),
                "2000-03-01T00:00:00".into(),
            ],
        );
        loader
    }

    #[tokio::test]
    async fn test_load_renames_to_local_id() {
        let loader = loader_with_grid();
        let ds = loader
            .load(&source(vec!["v1"], vec!["tas"]), None)
            .await
            .unwrap();
        assert_eq!(ds.arrays.len(), 1);
        assert_eq!(ds.arrays[0].name, "v1");
        assert_eq!(ds.arrays[0].shape, vec![3, 2, 2]);
        assert_eq!(ds.arrays[0].domain_id.as_deref(), Some("d0"));
    }

    #[tokio::test]
    async fn test_load_partial_time_window() {
        let loader = loader_with_grid();
        let window = Domain::new("w").with_axis(
            AxisBounds::new(
                Axis::T,
                "time",
                BoundValue::Time("2000-02-01".into()),
                BoundValue::Time("2000-03-01".into()),
                CoordSystem::Timestamps,
            )
            .unwrap(),
        );
        let ds = loader
            .load(&source(vec!["v1"], vec!["tas"]), Some(&window))
            .await
            .unwrap();
        assert_eq!(ds.arrays[0].shape, vec![2, 2, 2]);
    }

    #[tokio::test]
    async fn test_missing_variable_is_data_unavailable() {
        let loader = loader_with_grid();
        let err = loader
            .load(&source(vec!["v9"], vec!["unknown"]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::DataUnavailable { .. }));
    }
}

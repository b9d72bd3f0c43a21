//! Result merge policies for parallel branches and worker replicas.
//!
//! The default policy unions arrays keyed by `(domain id, variable name)`;
//! two distinct arrays landing on the same key is a [`ConflictingMerge`]
//! error, never a silent overwrite. The `"min:<param>"` / `"max:<param>"`
//! policies instead keep the single best candidate dataset ranked by a
//! scalar result attribute.
//!
//! [`ConflictingMerge`]: crate::error::RequestError::ConflictingMerge

use std::collections::HashMap;

use serde_json::Value;

use crate::data::{DataArray, Dataset};
use crate::error::RequestError;

/// Ranking direction for the best-candidate policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ranking {
    Min,
    Max,
}

/// How completed result datasets are combined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergePolicy {
    /// Union arrays by `(domain id, variable name)`.
    Union,
    /// Keep the one dataset with the best value of the named attribute.
    Best { ranking: Ranking, parameter: String },
}

impl MergePolicy {
    /// Parse an optional `"<method>:<parameter>"` policy token. Absence
    /// means union.
    pub fn parse(token: Option<&str>) -> Result<Self, RequestError> {
        let token = match token {
            None => return Ok(MergePolicy::Union),
            Some(t) => t.trim(),
        };
        let (method, parameter) = token
            .split_once(':')
            .ok_or_else(|| RequestError::UnknownMergeMethod(token.to_string()))?;
        let ranking = match method {
            "min" => Ranking::Min,
            "max" => Ranking::Max,
            other => return Err(RequestError::UnknownMergeMethod(other.to_string())),
        };
        if parameter.is_empty() {
            return Err(RequestError::UnknownMergeMethod(token.to_string()));
        }
        Ok(MergePolicy::Best {
            ranking,
            parameter: parameter.to_string(),
        })
    }

    /// Merge completed datasets under this policy.
    pub fn merge(&self, datasets: Vec<Dataset>) -> Result<Vec<Dataset>, RequestError> {
        match self {
            MergePolicy::Union => union_datasets(datasets),
            MergePolicy::Best { ranking, parameter } => {
                Ok(vec![best_candidate(datasets, *ranking, parameter)?])
            }
        }
    }
}

fn merge_key(array: &DataArray) -> (String, String) {
    (
        array.domain_id.clone().unwrap_or_default(),
        array.name.clone(),
    )
}

fn union_datasets(datasets: Vec<Dataset>) -> Result<Vec<Dataset>, RequestError> {
    let mut seen: HashMap<(String, String), DataArray> = HashMap::new();
    let mut merged_order: Vec<(String, String)> = Vec::new();
    let mut attributes: HashMap<String, Value> = HashMap::new();
    let mut ids: Vec<String> = Vec::new();

    for dataset in datasets {
        if !ids.contains(&dataset.id) {
            ids.push(dataset.id.clone());
        }
        attributes.extend(dataset.attributes);
        for array in dataset.arrays {
            let key = merge_key(&array);
            match seen.get(&key) {
                None => {
                    merged_order.push(key.clone());
                    seen.insert(key, array);
                }
                Some(existing) => {
                    // The same array can legitimately arrive through two
                    // branches; a different one under the same key cannot.
                    if existing.shape != array.shape || existing.values != array.values {
                        return Err(RequestError::ConflictingMerge(format!(
                            "variable '{}' in domain '{}' produced by more than one branch",
                            key.1, key.0
                        )));
                    }
                }
            }
        }
    }

    let mut merged = Dataset::new(ids.join("+"));
    merged.attributes = attributes;
    for key in merged_order {
        if let Some(array) = seen.remove(&key) {
            merged.arrays.push(array);
        }
    }
    Ok(vec![merged])
}

fn best_candidate(
    datasets: Vec<Dataset>,
    ranking: Ranking,
    parameter: &str,
) -> Result<Dataset, RequestError> {
    let mut best: Option<(f64, Dataset)> = None;
    for dataset in datasets {
        let score = dataset
            .attributes
            .get(parameter)
            .and_then(Value::as_f64)
            .or_else(|| {
                dataset
                    .arrays
                    .iter()
                    .find_map(|a| a.attributes.get(parameter).and_then(Value::as_f64))
            })
            .ok_or_else(|| {
                RequestError::ConflictingMerge(format!(
                    "candidate '{}' is missing merge attribute '{parameter}'",
                    dataset.id
                ))
            })?;
        let better = match &best {
            None => true,
            Some((incumbent, _)) => match ranking {
                Ranking::Min => score < *incumbent,
                Ranking::Max => score > *incumbent,
            },
        };
        if better {
            best = Some((score, dataset));
        }
    }
    best.map(|(_, dataset)| dataset)
        .ok_or_else(|| RequestError::ConflictingMerge("no candidate datasets to merge".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::CoordAxis;
    use crate::domain::Axis;

    fn scored(id: &str, score: f64) -> Dataset {
        let mut dataset = Dataset::new(id);
        dataset
            .attributes
            .insert("err".to_string(), serde_json::json!(score));
        dataset
    }

    fn single_array(name: &str, domain: &str, values: Vec<f64>) -> Dataset {
        let coords = vec![CoordAxis::numeric(
            Axis::X,
            "lon",
            (0..values.len()).map(|i| i as f64).collect(),
        )];
        let mut array = DataArray::new(name, coords, values).unwrap();
        array.domain_id = Some(domain.to_string());
        let mut dataset = Dataset::new(name);
        dataset.arrays.push(array);
        dataset
    }

    #[test]
    fn test_parse_policies() {
        assert_eq!(MergePolicy::parse(None).unwrap(), MergePolicy::Union);
        assert_eq!(
            MergePolicy::parse(Some("min:err")).unwrap(),
            MergePolicy::Best {
                ranking: Ranking::Min,
                parameter: "err".to_string()
            }
        );
        assert!(matches!(
            MergePolicy::parse(Some("median:err")),
            Err(RequestError::UnknownMergeMethod(_))
        ));
        assert!(matches!(
            MergePolicy::parse(Some("min:")),
            Err(RequestError::UnknownMergeMethod(_))
        ));
    }

    #[test]
    fn test_union_keeps_distinct_keys() {
        let merged = MergePolicy::Union
            .merge(vec![
                single_array("tas", "d0", vec![1.0, 2.0]),
                single_array("pr", "d0", vec![3.0, 4.0]),
            ])
            .unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].arrays.len(), 2);
        assert_eq!(merged[0].arrays[0].name, "tas");
        assert_eq!(merged[0].arrays[1].name, "pr");
    }

    #[test]
    fn test_union_identical_duplicates_collapse() {
        let merged = MergePolicy::Union
            .merge(vec![
                single_array("tas", "d0", vec![1.0, 2.0]),
                single_array("tas", "d0", vec![1.0, 2.0]),
            ])
            .unwrap();
        assert_eq!(merged[0].arrays.len(), 1);
    }

    #[test]
    fn test_union_conflict_is_fatal() {
        let err = MergePolicy::Union
            .merge(vec![
                single_array("tas", "d0", vec![1.0, 2.0]),
                single_array("tas", "d0", vec![9.0, 9.0]),
            ])
            .unwrap_err();
        assert!(matches!(err, RequestError::ConflictingMerge(_)));
    }

    #[test]
    fn test_min_policy_keeps_lowest_score() {
        let policy = MergePolicy::parse(Some("min:err")).unwrap();
        let merged = policy
            .merge(vec![
                scored("a", 0.9),
                scored("b", 0.2),
                scored("c", 0.5),
            ])
            .unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, "b");
    }

    #[test]
    fn test_missing_merge_attribute_is_fatal() {
        let policy = MergePolicy::parse(Some("max:skill")).unwrap();
        let err = policy
            .merge(vec![scored("a", 0.9), Dataset::new("bare")])
            .unwrap_err();
        assert!(matches!(err, RequestError::ConflictingMerge(_)));
    }
}

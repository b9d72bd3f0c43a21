use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::RequestError;

/// A declarative analytic request: named domains, named data sources, and a
/// list of chained operations.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RequestSchema {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub experiment: Option<String>,
    /// Identical replica evaluations dispatched to the compute substrate.
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub domain: Vec<DomainSpec>,
    #[serde(default)]
    pub input: Vec<InputSpec>,
    pub operation: Vec<OperationSpec>,
}

fn default_workers() -> usize {
    1
}

/// One named domain declaration. Every field other than `name` is an axis
/// entry keyed by its axis name (`lat`, `lon`, `time`, ...).
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct DomainSpec {
    #[serde(alias = "id")]
    pub name: String,
    #[serde(flatten)]
    pub axes: HashMap<String, AxisSpec>,
}

/// One axis's bound declaration.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct AxisSpec {
    pub start: Value,
    pub end: Value,
    #[serde(default)]
    pub step: Option<f64>,
    #[serde(default)]
    pub system: Option<String>,
    /// Calendar lag spec such as `"1y"` or `"-6m,3d"`.
    #[serde(default)]
    pub offset: Option<String>,
}

/// One data-source declaration. `name` carries one or more
/// `"<sourceVar>:<localId>"` pairs, comma separated; the local id defaults to
/// the source variable name when omitted.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct InputSpec {
    pub uri: String,
    pub name: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub auth: Option<String>,
}

impl InputSpec {
    /// Split the `name` field into `(sourceVar, localId)` pairs.
    pub fn variable_pairs(&self) -> Vec<(String, String)> {
        self.name
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(|part| match part.split_once(':') {
                Some((var, id)) => (var.trim().to_string(), id.trim().to_string()),
                None => (part.trim().to_string(), part.trim().to_string()),
            })
            .collect()
    }
}

/// One operation declaration.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OperationSpec {
    /// Kernel identifier: `"<module>.<op>"` or `"<module>:<op>"`.
    pub name: String,
    /// Named inputs: `"<id>[,<id>...]"` for one connector, or
    /// `"<id>:<outName>;..."` for several named-output connectors.
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default, alias = "axes")]
    pub axis: Option<String>,
    #[serde(default)]
    pub groupby: Option<String>,
    #[serde(default)]
    pub resample: Option<String>,
    #[serde(default)]
    pub align: Option<String>,
    /// Output id of the operation's default connector.
    #[serde(default)]
    pub result: Option<String>,
    /// Merge policy: `"<min|max>:<parameterName>"`.
    #[serde(default)]
    pub merge: Option<String>,
    /// Kernel-specific options.
    #[serde(flatten)]
    pub options: HashMap<String, Value>,
}

impl OperationSpec {
    /// Split the operation name into `(module, op)`.
    pub fn kernel_key(&self) -> Result<(String, String), RequestError> {
        let sep = if self.name.contains(':') { ':' } else { '.' };
        match self.name.split_once(sep) {
            Some((module, op)) if !module.is_empty() && !op.is_empty() => {
                Ok((module.to_string(), op.to_string()))
            }
            _ => Err(RequestError::ConfigError(format!(
                "operation name '{}' is not of the form <module>.<op>",
                self.name
            ))),
        }
    }

    /// Parse the `input` field into one connector spec per named output.
    ///
    /// `"a,b"` yields one connector with inputs `[a, b]` and the output id
    /// taken from `result` (or generated from the operation name and index).
    /// `"a:out1;b,c:out2"` yields one connector per `;`-separated part.
    pub fn connectors(&self, node_index: usize) -> Vec<ConnectorSpec> {
        let default_output = || {
            self.result
                .clone()
                .unwrap_or_else(|| format!("{}-{}", self.name, node_index))
        };
        if self.input.trim().is_empty() {
            return vec![ConnectorSpec {
                inputs: Vec::new(),
                output: default_output(),
            }];
        }
        self.input
            .split(';')
            .filter(|part| !part.trim().is_empty())
            .enumerate()
            .map(|(i, part)| {
                let (inputs_part, output) = match part.rsplit_once(':') {
                    Some((inputs, out)) => (inputs, out.trim().to_string()),
                    None if i == 0 => (part, default_output()),
                    None => (part, format!("{}-{}.{}", self.name, node_index, i)),
                };
                ConnectorSpec {
                    inputs: inputs_part
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect(),
                    output,
                }
            })
            .collect()
    }

    /// All domain-independent string options plus flattened extras, for
    /// kernel required-option validation.
    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }
}

/// Parsed connector declaration: named inputs feeding one named output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorSpec {
    pub inputs: Vec<String>,
    pub output: String,
}

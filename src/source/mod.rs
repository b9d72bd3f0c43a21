//! Variable/source registry: maps request-declared variable ids to external
//! data-source descriptors and the domain each belongs to.

use std::collections::HashMap;

use crate::dsl::InputSpec;
use crate::error::RequestError;

/// Kind of external data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Collection,
    File,
    Dap,
    Archive,
}

impl SourceKind {
    /// Classify from the uri scheme; bare paths are files.
    pub fn from_uri(uri: &str) -> Self {
        match uri.split_once("://").map(|(scheme, _)| scheme) {
            Some("collection") => SourceKind::Collection,
            Some("archive") => SourceKind::Archive,
            Some("http") | Some("https") | Some("dap") => SourceKind::Dap,
            Some("file") | None => SourceKind::File,
            Some(_) => SourceKind::File,
        }
    }
}

/// One external data source declared by the request. Read-only after
/// construction.
#[derive(Debug, Clone)]
pub struct VariableSource {
    /// Variable names as known to the source.
    pub names: Vec<String>,
    /// Request-local variable ids, parallel to `names`.
    pub ids: Vec<String>,
    pub domain_id: Option<String>,
    pub address: String,
    pub kind: SourceKind,
    pub auth: Option<String>,
}

impl VariableSource {
    /// A copy of this source narrowed to one declared variable id, so a
    /// leaf load fetches exactly the variable its node asked for.
    pub fn narrowed_to(&self, variable_id: &str) -> Result<VariableSource, RequestError> {
        let index = self
            .ids
            .iter()
            .position(|id| id == variable_id)
            .ok_or_else(|| RequestError::VariableNotFound(variable_id.to_string()))?;
        Ok(VariableSource {
            names: vec![self.names[index].clone()],
            ids: vec![self.ids[index].clone()],
            ..self.clone()
        })
    }
}

/// Registry of the variables declared by one request.
#[derive(Debug, Default)]
pub struct SourceRegistry {
    sources: Vec<VariableSource>,
    by_id: HashMap<String, usize>,
}

impl SourceRegistry {
    pub fn from_inputs(inputs: &[InputSpec]) -> Result<Self, RequestError> {
        let mut registry = SourceRegistry::default();
        for input in inputs {
            let pairs = input.variable_pairs();
            if pairs.is_empty() {
                return Err(RequestError::ConfigError(format!(
                    "input '{}' declares no variables",
                    input.uri
                )));
            }
            let source = VariableSource {
                names: pairs.iter().map(|(name, _)| name.clone()).collect(),
                ids: pairs.iter().map(|(_, id)| id.clone()).collect(),
                domain_id: input.domain.clone(),
                address: input.uri.clone(),
                kind: SourceKind::from_uri(&input.uri),
                auth: input.auth.clone(),
            };
            let index = registry.sources.len();
            for (_, id) in &pairs {
                if registry.by_id.insert(id.clone(), index).is_some() {
                    return Err(RequestError::ConfigError(format!(
                        "duplicate variable id: {id}"
                    )));
                }
            }
            registry.sources.push(source);
        }
        Ok(registry)
    }

    pub fn get(&self, variable_id: &str) -> Result<&VariableSource, RequestError> {
        self.by_id
            .get(variable_id)
            .map(|i| &self.sources[*i])
            .ok_or_else(|| RequestError::VariableNotFound(variable_id.to_string()))
    }

    /// The source variable name behind a local id.
    pub fn source_name(&self, variable_id: &str) -> Result<&str, RequestError> {
        let source = self.get(variable_id)?;
        source
            .ids
            .iter()
            .position(|id| id == variable_id)
            .map(|i| source.names[i].as_str())
            .ok_or_else(|| RequestError::VariableNotFound(variable_id.to_string()))
    }

    pub fn variable_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.by_id.keys().cloned().collect();
        ids.sort();
        ids
    }
}

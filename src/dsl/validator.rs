use std::collections::HashSet;

use super::schema::RequestSchema;
use crate::error::RequestError;

/// Validate a parsed request before graph compilation.
///
/// Structural checks only; link resolution and kernel lookup happen during
/// graph building.
pub fn validate_request_schema(schema: &RequestSchema) -> Result<(), RequestError> {
    if schema.operation.is_empty() {
        return Err(RequestError::ConfigError("no operations declared".into()));
    }
    if schema.workers == 0 {
        return Err(RequestError::ConfigError(
            "workers must be at least 1".into(),
        ));
    }

    let mut domain_names = HashSet::new();
    for domain in &schema.domain {
        if !domain_names.insert(&domain.name) {
            return Err(RequestError::ConfigError(format!(
                "duplicate domain name: {}",
                domain.name
            )));
        }
    }

    let mut variable_ids = HashSet::new();
    for input in &schema.input {
        if let Some(domain) = &input.domain {
            if !domain_names.contains(domain) {
                return Err(RequestError::ConfigError(format!(
                    "input '{}' references unknown domain '{}'",
                    input.name, domain
                )));
            }
        }
        for (_, id) in input.variable_pairs() {
            if !variable_ids.insert(id.clone()) {
                return Err(RequestError::ConfigError(format!(
                    "duplicate variable id: {id}"
                )));
            }
        }
    }

    for op in &schema.operation {
        op.kernel_key()?;
        if let Some(domain) = &op.domain {
            if !domain_names.contains(domain) {
                return Err(RequestError::ConfigError(format!(
                    "operation '{}' references unknown domain '{}'",
                    op.name, domain
                )));
            }
        }
        if let Some(merge) = &op.merge {
            crate::merge::MergePolicy::parse(Some(merge.as_str()))?;
        }
        if let Some(align) = &op.align {
            match align.as_str() {
                "largest" | "smallest" => {}
                other => {
                    return Err(RequestError::ConfigError(format!(
                        "operation '{}': unknown alignment strategy '{}'",
                        op.name, other
                    )))
                }
            }
        }
    }

    Ok(())
}

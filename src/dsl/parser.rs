//! Request parser: converts raw JSON/YAML text into [`RequestSchema`].

use super::schema::RequestSchema;
use crate::error::RequestError;

/// Supported request input formats.
#[derive(Debug, Clone, Copy)]
pub enum RequestFormat {
    /// JSON format (`.json`).
    Json,
    /// YAML format (`.yaml` / `.yml`).
    Yaml,
}

/// Parse request content into a [`RequestSchema`].
pub fn parse_request(content: &str, format: RequestFormat) -> Result<RequestSchema, RequestError> {
    match format {
        RequestFormat::Json => {
            serde_json::from_str(content).map_err(|e| RequestError::ParseError(e.to_string()))
        }
        RequestFormat::Yaml => {
            serde_yaml::from_str(content).map_err(|e| RequestError::ParseError(e.to_string()))
        }
    }
}

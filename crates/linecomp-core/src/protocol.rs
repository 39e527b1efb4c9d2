//! Request/response bodies of the completion service operations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    ContextItem, SymbolImplementationLocation, SymbolReference, SymbolSource,
    is_workspace_relative,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("path must not be empty")]
    EmptyPath,
    #[error("path {0} is not relative to the workspace")]
    PathOutsideWorkspace(String),
    #[error("start_line {start_line} is after end_line {end_line}")]
    InvertedLines { start_line: usize, end_line: usize },
    #[error("location {index} has an inverted range")]
    InvertedLocation { index: usize },
    #[error("close context must not be empty")]
    EmptyCloseContext,
}

fn check_path(path: &str) -> Result<(), ValidationError> {
    if path.trim().is_empty() {
        return Err(ValidationError::EmptyPath);
    }
    if !is_workspace_relative(path) {
        return Err(ValidationError::PathOutsideWorkspace(path.to_owned()));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestRequest {
    pub close_context: String,
    #[serde(default)]
    pub symbol_implementations: Vec<SymbolSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_context: Option<ContextItem>,
    #[serde(default)]
    pub user_context: Vec<ContextItem>,
    #[serde(default)]
    pub web_search_enabled: bool,
}

impl SuggestRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.close_context.trim().is_empty() {
            return Err(ValidationError::EmptyCloseContext);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SuggestResponse {
    pub response: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolLocationsRequest {
    pub path: String,
    pub start_line: usize,
    /// Exclusive.
    pub end_line: usize,
}

impl SymbolLocationsRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_path(&self.path)?;
        if self.start_line > self.end_line {
            return Err(ValidationError::InvertedLines {
                start_line: self.start_line,
                end_line: self.end_line,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SymbolLocationsResponse {
    pub references: Vec<SymbolReference>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SymbolSourceRequest {
    pub locations: Vec<SymbolImplementationLocation>,
}

impl SymbolSourceRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (index, location) in self.locations.iter().enumerate() {
            check_path(&location.path)?;
            if (location.start_line, location.start_col) > (location.end_line, location.end_col) {
                return Err(ValidationError::InvertedLocation { index });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SymbolSourceResponse {
    pub sources: Vec<SymbolSource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl ToString) -> Self {
        Self {
            error: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggest_request_uses_camel_case() {
        let request = SuggestRequest {
            close_context: "x = /*@@*/".to_owned(),
            web_search_enabled: true,
            ..SuggestRequest::default()
        };
        let value = serde_json::to_value(&request).expect("serialize");
        assert_eq!(value["closeContext"], "x = /*@@*/");
        assert_eq!(value["webSearchEnabled"], true);
        assert!(value.get("primaryContext").is_none());

        let parsed: SuggestRequest =
            serde_json::from_str(r#"{"closeContext":"y"}"#).expect("parse minimal");
        assert!(parsed.user_context.is_empty());
        assert!(parsed.symbol_implementations.is_empty());
    }

    #[test]
    fn locations_request_rejects_inverted_lines() {
        let request = SymbolLocationsRequest {
            path: "a.py".to_owned(),
            start_line: 9,
            end_line: 3,
        };
        assert_eq!(
            request.validate(),
            Err(ValidationError::InvertedLines {
                start_line: 9,
                end_line: 3
            })
        );

        let blank = SymbolLocationsRequest {
            path: " ".to_owned(),
            start_line: 0,
            end_line: 0,
        };
        assert_eq!(blank.validate(), Err(ValidationError::EmptyPath));
    }

    #[test]
    fn requests_reject_paths_leaving_the_workspace() {
        let absolute = SymbolLocationsRequest {
            path: "/etc/passwd".to_owned(),
            start_line: 0,
            end_line: 1,
        };
        assert_eq!(
            absolute.validate(),
            Err(ValidationError::PathOutsideWorkspace("/etc/passwd".to_owned()))
        );

        let parent = SymbolSourceRequest {
            locations: vec![SymbolImplementationLocation {
                name: "f".to_owned(),
                path: "pkg/../../secret.py".to_owned(),
                start_line: 0,
                start_col: 0,
                end_line: 1,
                end_col: 0,
                expand_to_class: false,
            }],
        };
        assert_eq!(
            parent.validate(),
            Err(ValidationError::PathOutsideWorkspace("pkg/../../secret.py".to_owned()))
        );
    }

    #[test]
    fn source_request_rejects_inverted_location() {
        let request = SymbolSourceRequest {
            locations: vec![SymbolImplementationLocation {
                name: "f".to_owned(),
                path: "a.py".to_owned(),
                start_line: 4,
                start_col: 0,
                end_line: 2,
                end_col: 0,
                expand_to_class: false,
            }],
        };
        assert_eq!(
            request.validate(),
            Err(ValidationError::InvertedLocation { index: 0 })
        );
    }
}

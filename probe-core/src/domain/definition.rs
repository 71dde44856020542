//! Job definition domain types
//!
//! Definitions are read from the definition store before dispatch and handed
//! to the adapters fully resolved. Adapters never query the store themselves.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;

use crate::domain::job::JobKind;

/// Identifier of a definition row in the definition store
pub type DefinitionId = i64;

/// Identifier of the project a definition belongs to
pub type ProjectId = i64;

/// A single HTTP-API test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiCaseDefinition {
    pub id: DefinitionId,
    pub project_id: ProjectId,
    pub name: String,
    /// HTTP method (GET, POST, PUT, PATCH, DELETE, ...)
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub params: HashMap<String, String>,
    /// JSON body, sent only for mutating methods
    #[serde(default)]
    pub body: Option<JsonValue>,
    #[serde(default)]
    pub assertions: AssertionRules,
}

impl ApiCaseDefinition {
    /// Whether the request body should be sent for this case's method
    pub fn sends_body(&self) -> bool {
        matches!(
            self.method.to_ascii_uppercase().as_str(),
            "POST" | "PUT" | "PATCH"
        )
    }
}

/// Assertion rules evaluated against an HTTP response
///
/// ```json
/// {
///   "status_code": 200,
///   "response_contains": "success",
///   "response_json": { "code": 0, "data.id": 123 }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssertionRules {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Substring that must appear in the raw response body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_contains: Option<String>,
    /// Dotted path into the JSON body mapped to the expected value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_json: Option<Map<String, JsonValue>>,
}

impl AssertionRules {
    pub fn is_empty(&self) -> bool {
        self.status_code.is_none()
            && self.response_contains.is_none()
            && self.response_json.as_ref().is_none_or(|m| m.is_empty())
    }
}

/// An ordered suite of API cases
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiSuiteDefinition {
    pub id: DefinitionId,
    pub project_id: ProjectId,
    pub name: String,
    /// Case references in suite order
    pub case_ids: Vec<DefinitionId>,
    /// Cases that resolved in the definition store, in suite order
    pub cases: Vec<ApiCaseDefinition>,
}

impl ApiSuiteDefinition {
    /// Looks up the resolved case for a reference, if it resolved
    pub fn resolved(&self, case_id: DefinitionId) -> Option<&ApiCaseDefinition> {
        self.cases.iter().find(|case| case.id == case_id)
    }
}

/// A browser-automation test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiCaseDefinition {
    pub id: DefinitionId,
    pub project_id: ProjectId,
    pub name: String,
    /// Automation script source
    pub script: String,
}

/// A load test driven by an external load-test tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceDefinition {
    pub id: DefinitionId,
    pub project_id: ProjectId,
    pub name: String,
    /// Uploaded test plan file, if any
    #[serde(default)]
    pub plan_path: Option<String>,
}

/// A fully resolved job definition, one variant per job kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobDefinition {
    ApiCase(ApiCaseDefinition),
    ApiSuite(ApiSuiteDefinition),
    UiCase(UiCaseDefinition),
    Performance(PerformanceDefinition),
}

impl JobDefinition {
    pub fn kind(&self) -> JobKind {
        match self {
            JobDefinition::ApiCase(_) => JobKind::ApiCase,
            JobDefinition::ApiSuite(_) => JobKind::ApiSuite,
            JobDefinition::UiCase(_) => JobKind::UiCase,
            JobDefinition::Performance(_) => JobKind::Performance,
        }
    }

    pub fn id(&self) -> DefinitionId {
        match self {
            JobDefinition::ApiCase(d) => d.id,
            JobDefinition::ApiSuite(d) => d.id,
            JobDefinition::UiCase(d) => d.id,
            JobDefinition::Performance(d) => d.id,
        }
    }

    pub fn project_id(&self) -> ProjectId {
        match self {
            JobDefinition::ApiCase(d) => d.project_id,
            JobDefinition::ApiSuite(d) => d.project_id,
            JobDefinition::UiCase(d) => d.project_id,
            JobDefinition::Performance(d) => d.project_id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            JobDefinition::ApiCase(d) => &d.name,
            JobDefinition::ApiSuite(d) => &d.name,
            JobDefinition::UiCase(d) => &d.name,
            JobDefinition::Performance(d) => &d.name,
        }
    }
}

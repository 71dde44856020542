//! Definition store
//!
//! Read-only access to test definitions. Suites come back with their cases
//! resolved in suite order; references to missing cases stay in `case_ids`
//! but have no entry in `cases`.

use anyhow::Context;
use async_trait::async_trait;
use probe_core::domain::definition::{
    ApiCaseDefinition, ApiSuiteDefinition, DefinitionId, JobDefinition, PerformanceDefinition,
    ProjectId, UiCaseDefinition,
};
use probe_core::domain::job::JobKind;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::error::StoreError;

/// Store trait for test definitions
#[async_trait]
pub trait DefinitionStore: Send + Sync {
    /// Fetches a definition of the given kind
    ///
    /// # Returns
    /// `None` if no definition of that kind has the id
    async fn get_definition(
        &self,
        kind: JobKind,
        id: DefinitionId,
    ) -> Result<Option<JobDefinition>, StoreError>;
}

/// Unresolved suite as stored: case references only
#[derive(Debug, Clone, Deserialize)]
pub struct SuiteSeed {
    pub id: DefinitionId,
    pub project_id: ProjectId,
    pub name: String,
    #[serde(default)]
    pub case_ids: Vec<DefinitionId>,
}

/// Definition fixture file contents
///
/// ```json
/// {
///   "api_cases": [{ "id": 1, "project_id": 1, "name": "ping", "method": "GET", "url": "..." }],
///   "api_suites": [{ "id": 1, "project_id": 1, "name": "smoke", "case_ids": [1] }],
///   "ui_cases": [],
///   "performance_tests": []
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DefinitionSeed {
    #[serde(default)]
    pub api_cases: Vec<ApiCaseDefinition>,
    #[serde(default)]
    pub api_suites: Vec<SuiteSeed>,
    #[serde(default)]
    pub ui_cases: Vec<UiCaseDefinition>,
    #[serde(default)]
    pub performance_tests: Vec<PerformanceDefinition>,
}

impl DefinitionSeed {
    /// Loads a fixture file
    pub async fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read definitions file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse definitions file {}", path.display()))
    }
}

/// In-memory implementation of DefinitionStore
#[derive(Debug, Default)]
pub struct InMemoryDefinitionStore {
    api_cases: HashMap<DefinitionId, ApiCaseDefinition>,
    api_suites: HashMap<DefinitionId, SuiteSeed>,
    ui_cases: HashMap<DefinitionId, UiCaseDefinition>,
    performance_tests: HashMap<DefinitionId, PerformanceDefinition>,
}

impl InMemoryDefinitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: DefinitionSeed) -> Self {
        let mut store = Self::new();
        for case in seed.api_cases {
            store = store.with_api_case(case);
        }
        for suite in seed.api_suites {
            store = store.with_api_suite(suite);
        }
        for case in seed.ui_cases {
            store = store.with_ui_case(case);
        }
        for test in seed.performance_tests {
            store = store.with_performance_test(test);
        }
        store
    }

    pub fn with_api_case(mut self, case: ApiCaseDefinition) -> Self {
        self.api_cases.insert(case.id, case);
        self
    }

    pub fn with_api_suite(mut self, suite: SuiteSeed) -> Self {
        self.api_suites.insert(suite.id, suite);
        self
    }

    pub fn with_ui_case(mut self, case: UiCaseDefinition) -> Self {
        self.ui_cases.insert(case.id, case);
        self
    }

    pub fn with_performance_test(mut self, test: PerformanceDefinition) -> Self {
        self.performance_tests.insert(test.id, test);
        self
    }

    fn resolve_suite(&self, suite: &SuiteSeed) -> ApiSuiteDefinition {
        let cases = suite
            .case_ids
            .iter()
            .filter_map(|case_id| self.api_cases.get(case_id).cloned())
            .collect();

        ApiSuiteDefinition {
            id: suite.id,
            project_id: suite.project_id,
            name: suite.name.clone(),
            case_ids: suite.case_ids.clone(),
            cases,
        }
    }
}

#[async_trait]
impl DefinitionStore for InMemoryDefinitionStore {
    async fn get_definition(
        &self,
        kind: JobKind,
        id: DefinitionId,
    ) -> Result<Option<JobDefinition>, StoreError> {
        let definition = match kind {
            JobKind::ApiCase => self.api_cases.get(&id).cloned().map(JobDefinition::ApiCase),
            JobKind::ApiSuite => self
                .api_suites
                .get(&id)
                .map(|suite| JobDefinition::ApiSuite(self.resolve_suite(suite))),
            JobKind::UiCase => self.ui_cases.get(&id).cloned().map(JobDefinition::UiCase),
            JobKind::Performance => self
                .performance_tests
                .get(&id)
                .cloned()
                .map(JobDefinition::Performance),
        };

        Ok(definition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_case(id: DefinitionId) -> ApiCaseDefinition {
        ApiCaseDefinition {
            id,
            project_id: 1,
            name: format!("case-{}", id),
            method: "GET".to_string(),
            url: "http://localhost/health".to_string(),
            headers: HashMap::new(),
            params: HashMap::new(),
            body: None,
            assertions: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_suite_resolves_cases_in_order() {
        let store = InMemoryDefinitionStore::new()
            .with_api_case(api_case(1))
            .with_api_case(api_case(2))
            .with_api_suite(SuiteSeed {
                id: 10,
                project_id: 1,
                name: "smoke".to_string(),
                case_ids: vec![2, 99, 1],
            });

        let definition = store
            .get_definition(JobKind::ApiSuite, 10)
            .await
            .unwrap()
            .unwrap();

        let JobDefinition::ApiSuite(suite) = definition else {
            panic!("expected a suite definition");
        };
        assert_eq!(suite.case_ids, vec![2, 99, 1]);
        let resolved: Vec<_> = suite.cases.iter().map(|c| c.id).collect();
        assert_eq!(resolved, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_lookup_is_scoped_by_kind() {
        let store = InMemoryDefinitionStore::new().with_api_case(api_case(7));

        assert!(
            store
                .get_definition(JobKind::ApiCase, 7)
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            store
                .get_definition(JobKind::UiCase, 7)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_seed_parsing() {
        let raw = r#"{
            "api_cases": [
                {"id": 1, "project_id": 3, "name": "ping", "method": "GET", "url": "http://x/ping",
                 "assertions": {"status_code": 200}}
            ],
            "api_suites": [{"id": 5, "project_id": 3, "name": "smoke", "case_ids": [1]}],
            "performance_tests": [{"id": 2, "project_id": 3, "name": "load"}]
        }"#;

        let seed: DefinitionSeed = serde_json::from_str(raw).unwrap();
        assert_eq!(seed.api_cases.len(), 1);
        assert_eq!(seed.api_cases[0].assertions.status_code, Some(200));
        assert_eq!(seed.api_suites[0].case_ids, vec![1]);
        assert!(seed.ui_cases.is_empty());
        assert!(seed.performance_tests[0].plan_path.is_none());
    }
}

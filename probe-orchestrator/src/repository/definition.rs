//! Definition Repository
//!
//! Read-only queries over the application-owned definition tables.

use probe_core::domain::definition::{
    ApiCaseDefinition, ApiSuiteDefinition, AssertionRules, PerformanceDefinition,
    UiCaseDefinition,
};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use std::collections::HashMap;

/// Find an API case by ID
pub async fn find_api_case(
    pool: &PgPool,
    id: i64,
) -> Result<Option<ApiCaseDefinition>, sqlx::Error> {
    let row = sqlx::query_as::<_, ApiCaseRow>(
        r#"
        SELECT id, project_id, name, method, url, headers, params, body, assertions
        FROM api_test_cases
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// Find an API suite by ID with its cases resolved in suite order
pub async fn find_api_suite(
    pool: &PgPool,
    id: i64,
) -> Result<Option<ApiSuiteDefinition>, sqlx::Error> {
    let Some(suite) = sqlx::query_as::<_, SuiteRow>(
        "SELECT id, project_id, name FROM api_test_suites WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    else {
        return Ok(None);
    };

    let case_ids: Vec<i64> = sqlx::query_scalar(
        r#"
        SELECT case_id
        FROM api_test_suite_cases
        WHERE suite_id = $1
        ORDER BY order_index ASC, id ASC
        "#,
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    let rows = sqlx::query_as::<_, ApiCaseRow>(
        r#"
        SELECT id, project_id, name, method, url, headers, params, body, assertions
        FROM api_test_cases
        WHERE id = ANY($1)
        "#,
    )
    .bind(&case_ids)
    .fetch_all(pool)
    .await?;

    let by_id: HashMap<i64, ApiCaseDefinition> = rows
        .into_iter()
        .map(|r| (r.id, ApiCaseDefinition::from(r)))
        .collect();

    // A case referenced twice resolves twice
    let cases = case_ids
        .iter()
        .filter_map(|case_id| by_id.get(case_id).cloned())
        .collect();

    Ok(Some(ApiSuiteDefinition {
        id: suite.id,
        project_id: suite.project_id,
        name: suite.name,
        case_ids,
        cases,
    }))
}

/// Find a UI case by ID
pub async fn find_ui_case(
    pool: &PgPool,
    id: i64,
) -> Result<Option<UiCaseDefinition>, sqlx::Error> {
    let row = sqlx::query_as::<_, UiCaseRow>(
        "SELECT id, project_id, name, script FROM ui_test_cases WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| UiCaseDefinition {
        id: r.id,
        project_id: r.project_id,
        name: r.name,
        script: r.script,
    }))
}

/// Find a performance test by ID
pub async fn find_performance_test(
    pool: &PgPool,
    id: i64,
) -> Result<Option<PerformanceDefinition>, sqlx::Error> {
    let row = sqlx::query_as::<_, PerformanceRow>(
        "SELECT id, project_id, name, plan_path FROM performance_tests WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| PerformanceDefinition {
        id: r.id,
        project_id: r.project_id,
        name: r.name,
        plan_path: r.plan_path.filter(|p| !p.trim().is_empty()),
    }))
}

// =============================================================================
// Internal row types for database mapping
// =============================================================================

#[derive(sqlx::FromRow)]
struct ApiCaseRow {
    id: i64,
    project_id: i64,
    name: String,
    method: String,
    url: String,
    headers: Option<JsonValue>,
    params: Option<JsonValue>,
    body: Option<JsonValue>,
    assertions: Option<JsonValue>,
}

impl From<ApiCaseRow> for ApiCaseDefinition {
    fn from(row: ApiCaseRow) -> Self {
        let assertions = match row.assertions {
            Some(value) => serde_json::from_value::<AssertionRules>(value).unwrap_or_else(|e| {
                tracing::warn!("API case {} has malformed assertions: {}", row.id, e);
                AssertionRules::default()
            }),
            None => AssertionRules::default(),
        };

        ApiCaseDefinition {
            id: row.id,
            project_id: row.project_id,
            name: row.name,
            method: row.method,
            url: row.url,
            headers: string_map(row.headers),
            params: string_map(row.params),
            body: row.body.filter(|b| !b.is_null()),
            assertions,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SuiteRow {
    id: i64,
    project_id: i64,
    name: String,
}

#[derive(sqlx::FromRow)]
struct UiCaseRow {
    id: i64,
    project_id: i64,
    name: String,
    script: String,
}

#[derive(sqlx::FromRow)]
struct PerformanceRow {
    id: i64,
    project_id: i64,
    name: String,
    plan_path: Option<String>,
}

/// Flattens a JSON object into string values; non-string values keep their JSON text
fn string_map(value: Option<JsonValue>) -> HashMap<String, String> {
    match value {
        Some(JsonValue::Object(map)) => map
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    JsonValue::String(s) => s,
                    other => other.to_string(),
                };
                (key, value)
            })
            .collect(),
        _ => HashMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_map_flattens_values() {
        let map = string_map(Some(json!({"X-Token": "abc", "X-Retry": 3, "X-Debug": true})));
        assert_eq!(map["X-Token"], "abc");
        assert_eq!(map["X-Retry"], "3");
        assert_eq!(map["X-Debug"], "true");

        assert!(string_map(Some(json!([1, 2]))).is_empty());
        assert!(string_map(None).is_empty());
    }

    #[test]
    fn test_row_conversion_tolerates_bad_assertions() {
        let row = ApiCaseRow {
            id: 1,
            project_id: 2,
            name: "create user".to_string(),
            method: "POST".to_string(),
            url: "http://api/users".to_string(),
            headers: None,
            params: Some(json!({"page": 1})),
            body: Some(json!({"name": "ada"})),
            assertions: Some(json!({"status_code": "two hundred"})),
        };

        let case = ApiCaseDefinition::from(row);
        assert!(case.assertions.is_empty());
        assert_eq!(case.params["page"], "1");
        assert_eq!(case.body, Some(json!({"name": "ada"})));
    }
}

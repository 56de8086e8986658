use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::jobs::{ExecutionError, JobContext, JobExecutor, JobType, JobStep, StepTracker};

const STEPS: &[JobStep] = &[
    JobStep { name: "register", description: "Registering catalog" },
    JobStep { name: "profile", description: "Profiling datasets" },
    JobStep { name: "index", description: "Building tag index" },
    JobStep { name: "publish", description: "Publishing catalog" },
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetProfile {
    pub name: String,
    pub field_count: usize,
    pub fields: Vec<String>,
    pub tags: Vec<String>,
}

/// Registers a data catalog and profiles the datasets it lists
#[derive(Debug, Clone, Default)]
pub struct CatalogService;

impl CatalogService {
    pub fn new() -> Self {
        Self
    }
}

/// Field entries may be plain names or `{name, type}` objects
fn profile_dataset(index: usize, raw: &Value) -> Result<DatasetProfile, ExecutionError> {
    let name = raw
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ExecutionError::step("profile", format!("dataset {} has no name", index)))?;

    let fields: Vec<String> = raw
        .get("fields")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|f| match f {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(o) => o.get("name").and_then(Value::as_str).map(str::to_string),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    let mut tags: Vec<String> = raw
        .get("tags")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|t| t.trim().to_ascii_lowercase())
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default();
    tags.sort();
    tags.dedup();

    Ok(DatasetProfile {
        name: name.to_string(),
        field_count: fields.len(),
        fields,
        tags,
    })
}

#[async_trait]
impl JobExecutor for CatalogService {
    fn job_type(&self) -> JobType {
        JobType::CatalogCreation
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["catalog_name"]
    }

    fn steps(&self) -> &'static [JobStep] {
        STEPS
    }

    async fn execute(&self, ctx: &JobContext, steps: &mut StepTracker) -> Result<Value, ExecutionError> {
        steps.enter("register").await?;
        let catalog_id = Uuid::new_v4();
        let catalog_name = ctx.str_param("catalog_name").unwrap_or_default().trim().to_string();

        steps.enter("profile").await?;
        let datasets = match ctx.payload.get("datasets") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(i, raw)| profile_dataset(i, raw))
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(ExecutionError::invalid("datasets", "must be an array")),
        };

        steps.enter("index").await?;
        let mut tag_index: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for dataset in &datasets {
            for tag in &dataset.tags {
                tag_index.entry(tag.as_str()).or_default().push(dataset.name.as_str());
            }
        }

        steps.enter("publish").await?;
        let field_count: usize = datasets.iter().map(|d| d.field_count).sum();
        Ok(json!({
            "catalog_id": catalog_id,
            "catalog_name": catalog_name,
            "business_id": ctx.owner_id,
            "dataset_count": datasets.len(),
            "field_count": field_count,
            "tag_index": tag_index,
            "datasets": datasets,
            "published_at": Utc::now(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_mixed_field_shapes_and_normalizes_tags() {
        let profile = profile_dataset(
            0,
            &json!({
                "name": " beneficial_owners ",
                "fields": ["owner_id", {"name": "ownership_pct", "type": "decimal"}, 7],
                "tags": ["PII", "kyb", "pii", " "],
            }),
        )
        .unwrap();
        assert_eq!(profile.name, "beneficial_owners");
        assert_eq!(profile.fields, vec!["owner_id", "ownership_pct"]);
        assert_eq!(profile.tags, vec!["kyb", "pii"]);
    }

    #[test]
    fn dataset_without_name_is_rejected() {
        let err = profile_dataset(3, &json!({"fields": ["a"]})).unwrap_err();
        assert_eq!(err, ExecutionError::step("profile", "dataset 3 has no name"));
    }
}

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::jobs::{ExecutionError, JobContext, JobExecutor, JobType, JobStep, StepTracker};

const STEPS: &[JobStep] = &[
    JobStep { name: "parse_rules", description: "Parsing transformation rules" },
    JobStep { name: "apply_rules", description: "Applying rules to records" },
    JobStep { name: "verify", description: "Verifying transformed records" },
    JobStep { name: "summarize", description: "Summarizing transformation" },
];

/// One field-level rewrite
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TransformRule {
    Trim { field: String },
    Uppercase { field: String },
    Lowercase { field: String },
    Rename { field: String, to: String },
    Default { field: String, value: Value },
    Drop { field: String },
    Mask {
        field: String,
        #[serde(default = "default_keep_last")]
        keep_last: usize,
    },
}

fn default_keep_last() -> usize {
    4
}

impl TransformRule {
    pub fn field(&self) -> &str {
        match self {
            TransformRule::Trim { field }
            | TransformRule::Uppercase { field }
            | TransformRule::Lowercase { field }
            | TransformRule::Rename { field, .. }
            | TransformRule::Default { field, .. }
            | TransformRule::Drop { field }
            | TransformRule::Mask { field, .. } => field,
        }
    }

    /// Returns whether the record changed
    pub fn apply(&self, record: &mut Map<String, Value>) -> bool {
        match self {
            TransformRule::Trim { field } => map_string(record, field, |s| s.trim().to_string()),
            TransformRule::Uppercase { field } => map_string(record, field, |s| s.to_uppercase()),
            TransformRule::Lowercase { field } => map_string(record, field, |s| s.to_lowercase()),
            TransformRule::Rename { field, to } => match record.remove(field) {
                Some(value) => {
                    record.insert(to.clone(), value);
                    true
                }
                None => false,
            },
            TransformRule::Default { field, value } => match record.get(field) {
                None | Some(Value::Null) => {
                    record.insert(field.clone(), value.clone());
                    true
                }
                Some(_) => false,
            },
            TransformRule::Drop { field } => record.remove(field).is_some(),
            TransformRule::Mask { field, keep_last } => map_string(record, field, |s| mask(s, *keep_last)),
        }
    }
}

fn map_string(record: &mut Map<String, Value>, field: &str, f: impl Fn(&str) -> String) -> bool {
    match record.get_mut(field) {
        Some(Value::String(s)) => {
            let next = f(s);
            let changed = next != *s;
            *s = next;
            changed
        }
        _ => false,
    }
}

fn mask(value: &str, keep_last: usize) -> String {
    let chars: Vec<char> = value.chars().collect();
    let keep = keep_last.min(chars.len());
    let hidden = chars.len() - keep;
    std::iter::repeat('*')
        .take(hidden)
        .chain(chars[hidden..].iter().copied())
        .collect()
}

/// Applies ordered field rules to a batch of records
#[derive(Debug, Clone, Default)]
pub struct TransformationService;

impl TransformationService {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobExecutor for TransformationService {
    fn job_type(&self) -> JobType {
        JobType::DataTransformation
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["source_dataset", "records", "rules"]
    }

    fn steps(&self) -> &'static [JobStep] {
        STEPS
    }

    async fn execute(&self, ctx: &JobContext, steps: &mut StepTracker) -> Result<Value, ExecutionError> {
        steps.enter("parse_rules").await?;
        let rules: Vec<TransformRule> = serde_json::from_value(ctx.payload["rules"].clone())
            .map_err(|e| ExecutionError::step("parse_rules", e.to_string()))?;
        if let Some(rule) = rules.iter().find(|r| r.field().trim().is_empty()) {
            return Err(ExecutionError::step("parse_rules", format!("rule {:?} has an empty field", rule)));
        }

        steps.enter("apply_rules").await?;
        let input = ctx
            .array_param("records")
            .ok_or_else(|| ExecutionError::invalid("records", "must be an array of objects"))?;
        let mut records = Vec::with_capacity(input.len());
        let mut changes = 0usize;
        for (index, raw) in input.iter().enumerate() {
            let mut record = raw
                .as_object()
                .cloned()
                .ok_or_else(|| ExecutionError::step("apply_rules", format!("record {} is not an object", index)))?;
            for rule in &rules {
                if rule.apply(&mut record) {
                    changes += 1;
                }
            }
            records.push(record);
        }

        steps.enter("verify").await?;
        let empty_records = records.iter().filter(|r| r.is_empty()).count();

        steps.enter("summarize").await?;
        Ok(json!({
            "source_dataset": ctx.str_param("source_dataset"),
            "business_id": ctx.owner_id,
            "records_in": input.len(),
            "records_out": records.len(),
            "rules_applied": rules.len(),
            "field_changes": changes,
            "empty_records": empty_records,
            "records": records,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn rules_deserialize_from_tagged_json() {
        let rules: Vec<TransformRule> = serde_json::from_value(json!([
            {"op": "trim", "field": "name"},
            {"op": "rename", "field": "tin", "to": "tax_id"},
            {"op": "mask", "field": "account"},
        ]))
        .unwrap();
        assert_eq!(rules[1], TransformRule::Rename { field: "tin".into(), to: "tax_id".into() });
        assert_eq!(rules[2], TransformRule::Mask { field: "account".into(), keep_last: 4 });
    }

    #[test]
    fn applies_rules_in_order() {
        let mut rec = record(json!({"name": "  acme ltd ", "tin": "12-345", "notes": "x"}));
        let rules = vec![
            TransformRule::Trim { field: "name".into() },
            TransformRule::Uppercase { field: "name".into() },
            TransformRule::Rename { field: "tin".into(), to: "tax_id".into() },
            TransformRule::Drop { field: "notes".into() },
            TransformRule::Default { field: "country".into(), value: json!("US") },
        ];
        let changed = rules.iter().filter(|r| r.apply(&mut rec)).count();
        assert_eq!(changed, 5);
        assert_eq!(
            Value::Object(rec),
            json!({"name": "ACME LTD", "tax_id": "12-345", "country": "US"})
        );
    }

    #[test]
    fn mask_keeps_trailing_characters() {
        assert_eq!(mask("4111111111111111", 4), "************1111");
        assert_eq!(mask("abc", 4), "abc");
        assert_eq!(mask("secret", 0), "******");
    }

    #[test]
    fn rules_on_missing_or_non_string_fields_are_noops() {
        let mut rec = record(json!({"amount": 12}));
        assert!(!TransformRule::Uppercase { field: "amount".into() }.apply(&mut rec));
        assert!(!TransformRule::Rename { field: "missing".into(), to: "x".into() }.apply(&mut rec));
        assert!(!TransformRule::Default { field: "amount".into(), value: json!(0) }.apply(&mut rec));
    }

    #[test]
    fn unknown_ops_do_not_parse() {
        let parsed: Result<Vec<TransformRule>, _> =
            serde_json::from_value(json!([{"op": "explode", "field": "name"}]));
        assert!(parsed.is_err());
    }
}

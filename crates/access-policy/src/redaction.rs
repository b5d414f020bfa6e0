use serde::{Deserialize, Serialize};

use tree_common::Metadata;

/// Something a principal is allowed to reach but not to see.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedactionRule {
    /// Dotted path into node metadata, e.g. `owner.email`.
    MetadataField(String),
    /// Table column name.
    Column(String),
}

/// Strip redacted metadata fields in place.
pub fn redact_metadata(rules: &[RedactionRule], metadata: &mut Metadata) {
    for rule in rules {
        if let RedactionRule::MetadataField(path) = rule {
            metadata.remove_path(path);
        }
    }
}

pub fn redacted_columns(rules: &[RedactionRule]) -> Vec<&str> {
    rules
        .iter()
        .filter_map(|r| match r {
            RedactionRule::Column(name) => Some(name.as_str()),
            RedactionRule::MetadataField(_) => None,
        })
        .collect()
}

/// Drop redacted names from a column selection, keeping order.
pub fn narrow_columns(rules: &[RedactionRule], columns: Vec<String>) -> Vec<String> {
    let hidden = redacted_columns(rules);
    columns
        .into_iter()
        .filter(|c| !hidden.contains(&c.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metadata_redaction() {
        let mut metadata = Metadata::from(json!({
            "station": "north",
            "owner": {"name": "ops", "email": "ops@example.org"},
        }));
        redact_metadata(
            &[
                RedactionRule::MetadataField("owner.email".into()),
                RedactionRule::Column("pressure".into()),
                RedactionRule::MetadataField("missing.field".into()),
            ],
            &mut metadata,
        );
        assert_eq!(
            metadata.to_json(),
            json!({"station": "north", "owner": {"name": "ops"}})
        );
    }

    #[test]
    fn test_narrow_columns() {
        let rules = [RedactionRule::Column("pressure".into())];
        let narrowed = narrow_columns(&rules, vec!["temperature".into(), "pressure".into()]);
        assert_eq!(narrowed, vec!["temperature".to_string()]);
    }

    #[test]
    fn test_rule_wire_form() {
        let rule: RedactionRule = serde_json::from_value(json!({"column": "pressure"})).unwrap();
        assert_eq!(rule, RedactionRule::Column("pressure".into()));
        let rule: RedactionRule =
            serde_json::from_value(json!({"metadata_field": "owner.email"})).unwrap();
        assert_eq!(rule, RedactionRule::MetadataField("owner.email".into()));
    }
}

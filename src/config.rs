//! JSON configuration: extra fields and the table/column mapping used by
//! the SQL translator.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ast::Comparator;
use crate::schema::{DuplicateFieldError, FieldRegistry, FieldSchema, ValueType};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config file {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    DuplicateField(#[from] DuplicateFieldError),
}

/// A custom field added on top of the standard ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(default = "default_orderable")]
    pub orderable: bool,
    /// Defaults to the operators of the value type.
    #[serde(default)]
    pub operators: Option<Vec<Comparator>>,
}

fn default_orderable() -> bool {
    true
}

impl FieldDefinition {
    pub fn to_schema(&self) -> FieldSchema {
        let schema = FieldSchema::new(self.name.clone(), self.value_type)
            .with_aliases(self.aliases.iter().cloned())
            .with_orderable(self.orderable);
        match &self.operators {
            Some(operators) => schema.with_operators(operators),
            None => schema,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Table the translator selects from.
    pub table: String,
    /// Canonical field name to column name. Unmapped fields use the
    /// snake_case form of their name.
    pub columns: HashMap<String, String>,
    pub fields: Vec<FieldDefinition>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            table: "issues".to_string(),
            columns: HashMap::new(),
            fields: Vec::new(),
        }
    }
}

impl QueryConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Json {
            path: path.display().to_string(),
            source,
        })
    }

    /// The standard fields plus every configured one. A configured name or
    /// alias that clashes with an existing one is rejected.
    pub fn build_registry(&self) -> Result<FieldRegistry, ConfigError> {
        let mut builder = FieldRegistry::standard_builder();
        for field in &self.fields {
            builder.insert(field.to_schema())?;
        }
        Ok(builder.build())
    }

    pub fn column_for(&self, field: &str) -> String {
        self.columns
            .get(field)
            .cloned()
            .unwrap_or_else(|| to_snake_case(field))
    }
}

/// `storyPoints` → `story_points`.
pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else if c == ' ' || c == '-' {
            out.push('_');
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{content}").unwrap();
        file
    }

    #[test]
    fn test_load_valid_json_config() {
        let file = write_config(
            r#"{
                "table": "tickets",
                "columns": { "key": "issue_key" },
                "fields": [
                    { "name": "severity", "aliases": ["sev"], "type": "enum" },
                    {
                        "name": "estimate",
                        "type": "number",
                        "orderable": false,
                        "operators": ["=", ">"]
                    }
                ]
            }"#,
        );

        let config = QueryConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.table, "tickets");
        assert_eq!(config.column_for("key"), "issue_key");
        assert_eq!(config.column_for("createdDate"), "created_date");

        let registry = config.build_registry().unwrap();
        let severity = registry.lookup("SEV").unwrap();
        assert_eq!(severity.canonical_name, "severity");
        assert_eq!(severity.value_type, ValueType::Enum);

        let estimate = registry.lookup("estimate").unwrap();
        assert!(!estimate.orderable);
        assert!(estimate.allows(Comparator::Gt));
        assert!(!estimate.allows(Comparator::Lt));

        assert!(registry.lookup("status").is_some());
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let file = write_config("{}");
        let config = QueryConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config, QueryConfig::default());
        assert_eq!(
            config.build_registry().unwrap().fields().len(),
            FieldRegistry::standard().fields().len()
        );
    }

    #[test]
    fn test_invalid_json_config() {
        let file = write_config("invalid json");
        let err = QueryConfig::from_json_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Json { .. }));
    }

    #[test]
    fn test_unknown_value_type() {
        let file = write_config(r#"{ "fields": [ { "name": "x", "type": "color" } ] }"#);
        assert!(matches!(
            QueryConfig::from_json_file(file.path()),
            Err(ConfigError::Json { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = QueryConfig::from_json_file(dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_duplicate_field() {
        let config = QueryConfig {
            fields: vec![FieldDefinition {
                name: "points".to_string(),
                aliases: Vec::new(),
                value_type: ValueType::Number,
                orderable: true,
                operators: None,
            }],
            ..QueryConfig::default()
        };
        let err = config.build_registry().unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateField(ref e) if e.name == "points"));
    }

    #[test]
    fn test_snake_case() {
        assert_eq!(to_snake_case("storyPoints"), "story_points");
        assert_eq!(to_snake_case("key"), "key");
        assert_eq!(to_snake_case("statusCategory"), "status_category");
    }
}

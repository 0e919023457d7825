//! Field schema registry: which identifiers are queryable and how.

use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ast::{Comparator, Identifier};
use crate::error::SemanticError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    String,
    Enum,
    UserRef,
    Date,
    Number,
    Bool,
}

impl ValueType {
    /// Operators a field of this type accepts unless configured otherwise.
    /// Ordering comparisons only make sense for dates and numbers.
    pub fn default_operators(self) -> &'static [Comparator] {
        match self {
            ValueType::Date | ValueType::Number => &Comparator::ALL,
            ValueType::String | ValueType::Enum | ValueType::UserRef | ValueType::Bool => {
                &[Comparator::Eq, Comparator::NotEq]
            }
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::String => "string",
            ValueType::Enum => "enum",
            ValueType::UserRef => "user",
            ValueType::Date => "date",
            ValueType::Number => "number",
            ValueType::Bool => "boolean",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    pub canonical_name: String,
    pub aliases: Vec<String>,
    pub value_type: ValueType,
    pub orderable: bool,
    pub allowed_operators: HashSet<Comparator>,
}

impl FieldSchema {
    /// An orderable field with its type's default operators and no aliases.
    pub fn new(canonical_name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            canonical_name: canonical_name.into(),
            aliases: Vec::new(),
            value_type,
            orderable: true,
            allowed_operators: value_type.default_operators().iter().copied().collect(),
        }
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases.extend(aliases.into_iter().map(Into::into));
        self
    }

    pub fn with_orderable(mut self, orderable: bool) -> Self {
        self.orderable = orderable;
        self
    }

    pub fn with_operators(mut self, operators: &[Comparator]) -> Self {
        self.allowed_operators = operators.iter().copied().collect();
        self
    }

    pub fn allows(&self, op: Comparator) -> bool {
        self.allowed_operators.contains(&op)
    }

    /// Canonical name followed by the aliases.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.canonical_name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    fn matches(&self, raw: &str) -> bool {
        self.names().any(|name| name.eq_ignore_ascii_case(raw))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("field name '{name}' is already registered")]
pub struct DuplicateFieldError {
    pub name: String,
}

/// Immutable set of queryable fields, shared read-only across compilations.
#[derive(Debug, Clone, Default)]
pub struct FieldRegistry {
    fields: Vec<FieldSchema>,
}

static STANDARD: OnceLock<FieldRegistry> = OnceLock::new();

impl FieldRegistry {
    pub fn builder() -> FieldRegistryBuilder {
        FieldRegistryBuilder { fields: Vec::new() }
    }

    /// The built-in issue fields, built once per process.
    pub fn standard() -> &'static FieldRegistry {
        STANDARD.get_or_init(|| Self::standard_builder().build())
    }

    /// Builder pre-populated with the built-in issue fields, for hosts that
    /// register extra fields on top.
    pub fn standard_builder() -> FieldRegistryBuilder {
        Self::builder()
            .field(FieldSchema::new("key", ValueType::String).with_aliases(["issueKey", "id"]))
            .field(FieldSchema::new("summary", ValueType::String).with_aliases(["title"]))
            .field(FieldSchema::new("description", ValueType::String).with_orderable(false))
            .field(FieldSchema::new("project", ValueType::Enum))
            .field(FieldSchema::new("type", ValueType::Enum).with_aliases(["issueType"]))
            .field(FieldSchema::new("status", ValueType::Enum))
            .field(
                FieldSchema::new("statusCategory", ValueType::Enum)
                    .with_aliases(["category"])
                    .with_orderable(false),
            )
            .field(FieldSchema::new("priority", ValueType::Enum))
            .field(FieldSchema::new("resolution", ValueType::Enum))
            .field(FieldSchema::new("assignee", ValueType::UserRef))
            .field(FieldSchema::new("reporter", ValueType::UserRef))
            .field(FieldSchema::new("creator", ValueType::UserRef))
            .field(FieldSchema::new("createdDate", ValueType::Date).with_aliases(["created"]))
            .field(FieldSchema::new("updatedDate", ValueType::Date).with_aliases(["updated"]))
            .field(FieldSchema::new("resolutionDate", ValueType::Date).with_aliases(["resolved"]))
            .field(FieldSchema::new("dueDate", ValueType::Date).with_aliases(["due"]))
            .field(
                FieldSchema::new("storyPoints", ValueType::Number)
                    .with_aliases(["story points", "points"]),
            )
            .field(FieldSchema::new("votes", ValueType::Number))
            .field(FieldSchema::new("flagged", ValueType::Bool).with_orderable(false))
    }

    /// Case-insensitive lookup over canonical names and aliases.
    pub fn lookup(&self, raw: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|field| field.matches(raw))
    }

    pub fn resolve_field_name(
        &self,
        identifier: &Identifier,
    ) -> Result<&FieldSchema, SemanticError> {
        self.lookup(&identifier.name)
            .ok_or_else(|| SemanticError::UnknownField {
                identifier: identifier.name.clone(),
                span: identifier.span,
            })
    }

    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }
}

pub struct FieldRegistryBuilder {
    fields: Vec<FieldSchema>,
}

impl FieldRegistryBuilder {
    /// Adds a field without checking for clashes. Used for static definitions.
    pub fn field(mut self, schema: FieldSchema) -> Self {
        self.fields.push(schema);
        self
    }

    /// Adds a field, rejecting any name or alias already taken.
    pub fn insert(&mut self, schema: FieldSchema) -> Result<(), DuplicateFieldError> {
        if let Some(taken) = schema
            .names()
            .find(|name| self.fields.iter().any(|existing| existing.matches(name)))
        {
            return Err(DuplicateFieldError {
                name: taken.to_string(),
            });
        }
        self.fields.push(schema);
        Ok(())
    }

    pub fn build(self) -> FieldRegistry {
        FieldRegistry {
            fields: self.fields,
        }
    }
}

//! Field-by-field readers over untyped TOML documents.
//!
//! Both the identity manifest and the deployment manifest are parsed into a
//! raw `toml::Table` first and then walked with [`Fields`], which records a
//! [`FieldIssue`] for every violated constraint instead of stopping at the
//! first one. Callers turn a non-empty issue list into
//! `FleetError::ManifestInvalid`.

use std::collections::BTreeMap;
use std::fmt;
use toml::{Table, Value};

/// One violated constraint, addressed by a dotted field path such as
/// `agents[2].identity_source`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    pub field: String,
    pub message: String,
}

impl FieldIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// A view over one TOML table at a known path in the document
#[derive(Clone, Copy)]
pub struct Fields<'a> {
    table: &'a Table,
    path: &'a str,
}

impl<'a> Fields<'a> {
    pub fn new(table: &'a Table, path: &'a str) -> Self {
        Self { table, path }
    }

    /// Full path of a key inside this table
    pub fn path_of(&self, key: &str) -> String {
        if self.path.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", self.path, key)
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.table.contains_key(key)
    }

    /// Report keys that are not part of the schema (usually typos)
    pub fn reject_unknown(&self, known: &[&str], issues: &mut Vec<FieldIssue>) {
        for key in self.table.keys() {
            if !known.contains(&key.as_str()) {
                issues.push(FieldIssue::new(self.path_of(key), "unknown field"));
            }
        }
    }

    pub fn required_str(&self, key: &str, issues: &mut Vec<FieldIssue>) -> Option<String> {
        match self.table.get(key) {
            None => {
                issues.push(FieldIssue::new(self.path_of(key), "is required"));
                None
            }
            Some(_) => self.optional_str(key, issues).and_then(|s| {
                if s.trim().is_empty() {
                    issues.push(FieldIssue::new(self.path_of(key), "must not be empty"));
                    None
                } else {
                    Some(s)
                }
            }),
        }
    }

    pub fn optional_str(&self, key: &str, issues: &mut Vec<FieldIssue>) -> Option<String> {
        match self.table.get(key) {
            None => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                issues.push(type_issue(self.path_of(key), "a string", other));
                None
            }
        }
    }

    /// An optional integer constrained to `min..=max`
    pub fn optional_u32(
        &self,
        key: &str,
        min: u32,
        max: u32,
        issues: &mut Vec<FieldIssue>,
    ) -> Option<u32> {
        match self.table.get(key) {
            None => None,
            Some(Value::Integer(n)) => {
                if *n < i64::from(min) || *n > i64::from(max) {
                    issues.push(FieldIssue::new(
                        self.path_of(key),
                        format!("must be between {} and {} (got {})", min, max, n),
                    ));
                    None
                } else {
                    u32::try_from(*n).ok()
                }
            }
            Some(other) => {
                issues.push(type_issue(self.path_of(key), "an integer", other));
                None
            }
        }
    }

    pub fn required_u32(
        &self,
        key: &str,
        min: u32,
        max: u32,
        issues: &mut Vec<FieldIssue>,
    ) -> Option<u32> {
        if !self.contains(key) {
            issues.push(FieldIssue::new(self.path_of(key), "is required"));
            return None;
        }
        self.optional_u32(key, min, max, issues)
    }

    /// An optional array of strings; duplicates are reported
    pub fn str_list(&self, key: &str, issues: &mut Vec<FieldIssue>) -> Vec<String> {
        let array = match self.table.get(key) {
            None => return Vec::new(),
            Some(Value::Array(array)) => array,
            Some(other) => {
                issues.push(type_issue(self.path_of(key), "an array of strings", other));
                return Vec::new();
            }
        };

        let mut items: Vec<String> = Vec::with_capacity(array.len());
        for (i, value) in array.iter().enumerate() {
            let item_path = format!("{}[{}]", self.path_of(key), i);
            match value {
                Value::String(s) if s.trim().is_empty() => {
                    issues.push(FieldIssue::new(item_path, "must not be empty"));
                }
                Value::String(s) => {
                    if items.contains(s) {
                        issues.push(FieldIssue::new(item_path, format!("duplicate entry '{}'", s)));
                    } else {
                        items.push(s.clone());
                    }
                }
                other => issues.push(type_issue(item_path, "a string", other)),
            }
        }
        items
    }

    /// An optional table whose values must all be strings
    pub fn string_map(&self, key: &str, issues: &mut Vec<FieldIssue>) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        let Some(inner) = self.table_value(key, issues) else {
            return map;
        };
        for (k, v) in inner {
            match v {
                Value::String(s) => {
                    map.insert(k.clone(), s.clone());
                }
                other => issues.push(type_issue(
                    format!("{}.{}", self.path_of(key), k),
                    "a string",
                    other,
                )),
            }
        }
        map
    }

    /// An optional table of tables holding arbitrary scalar values, e.g.
    /// per-plugin configuration
    pub fn nested_value_map(
        &self,
        key: &str,
        issues: &mut Vec<FieldIssue>,
    ) -> BTreeMap<String, BTreeMap<String, Value>> {
        let mut map = BTreeMap::new();
        let Some(inner) = self.table_value(key, issues) else {
            return map;
        };
        for (name, v) in inner {
            match v {
                Value::Table(t) => {
                    map.insert(
                        name.clone(),
                        t.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                    );
                }
                other => issues.push(type_issue(
                    format!("{}.{}", self.path_of(key), name),
                    "a table",
                    other,
                )),
            }
        }
        map
    }

    /// An optional nested table
    pub fn table(&self, key: &str, issues: &mut Vec<FieldIssue>) -> Option<&'a Table> {
        self.table_value(key, issues)
    }

    /// An optional array of tables (`[[key]]`)
    pub fn array_of_tables(&self, key: &str, issues: &mut Vec<FieldIssue>) -> Vec<&'a Table> {
        match self.table.get(key) {
            None => Vec::new(),
            Some(Value::Array(array)) => {
                let mut tables = Vec::with_capacity(array.len());
                for (i, value) in array.iter().enumerate() {
                    match value {
                        Value::Table(t) => tables.push(t),
                        other => issues.push(type_issue(
                            format!("{}[{}]", self.path_of(key), i),
                            "a table",
                            other,
                        )),
                    }
                }
                tables
            }
            Some(other) => {
                issues.push(type_issue(self.path_of(key), "an array of tables", other));
                Vec::new()
            }
        }
    }

    fn table_value(&self, key: &str, issues: &mut Vec<FieldIssue>) -> Option<&'a Table> {
        match self.table.get(key) {
            None => None,
            Some(Value::Table(t)) => Some(t),
            Some(other) => {
                issues.push(type_issue(self.path_of(key), "a table", other));
                None
            }
        }
    }
}

fn type_issue(path: String, expected: &str, found: &Value) -> FieldIssue {
    FieldIssue::new(
        path,
        format!("must be {} (found {})", expected, found.type_str()),
    )
}

/// Lowercase slug: `[a-z0-9-]+`, not starting or ending with '-'
pub fn is_slug(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with('-')
        && !s.ends_with('-')
        && s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Template variable name: `[A-Z][A-Z0-9_]*`
pub fn is_var_name(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Secret key: `[a-zA-Z0-9_-]+`
pub fn is_secret_key(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

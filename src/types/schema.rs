//! Host schema: the categorized list of hostnames a session probes.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Read;
use std::path::Path;

/// One named group of hostnames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub category: String,
    #[serde(default)]
    pub hosts: Vec<String>,
}

impl Category {
    /// Create a new category.
    pub fn new<I, S>(category: impl Into<String>, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            category: category.into(),
            hosts: hosts.into_iter().map(Into::into).collect(),
        }
    }
}

/// Ordered categories of hostnames.
///
/// Serializes as a bare JSON array, which is also the hosts file format:
///
/// ```json
/// [
///   {"category": "core", "hosts": ["gw.example", "dns.example"]},
///   {"category": "edge", "hosts": ["cdn.example"]}
/// ]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostSchema(Vec<Category>);

/// Error type for schema loading.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("could not read hosts file {path}: {reason}")]
    ReadFailed { path: String, reason: String },
    #[error("could not decode schema: {0}")]
    Decode(#[from] serde_json::Error),
}

impl HostSchema {
    /// Create a schema from categories.
    pub fn new(categories: Vec<Category>) -> Self {
        Self(categories)
    }

    /// Parse a schema from a JSON reader.
    pub fn from_reader(reader: impl Read) -> Result<Self, SchemaError> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Read and parse a hosts file.
    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        let content = fs::read(path).map_err(|e| SchemaError::ReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_reader(content.as_slice())
    }

    /// Categories in schema order.
    pub fn categories(&self) -> &[Category] {
        &self.0
    }

    /// Every hostname of every category, in schema order.
    pub fn hostnames(&self) -> impl Iterator<Item = &str> {
        self.0
            .iter()
            .flat_map(|c| c.hosts.iter().map(String::as_str))
    }

    /// Total number of hostnames.
    pub fn host_count(&self) -> usize {
        self.0.iter().map(|c| c.hosts.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_hostnames_follow_schema_order() {
        let schema = HostSchema::new(vec![
            Category::new("core", ["b.example", "a.example"]),
            Category::new("edge", ["c.example"]),
        ]);
        let hosts: Vec<&str> = schema.hostnames().collect();
        assert_eq!(hosts, vec!["b.example", "a.example", "c.example"]);
        assert_eq!(schema.host_count(), 3);
    }

    #[test]
    fn test_parse_hosts_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"category": "core", "hosts": ["gw.example"]}}, {{"category": "empty"}}]"#
        )
        .unwrap();

        let schema = HostSchema::load(file.path()).unwrap();
        assert_eq!(schema.categories().len(), 2);
        assert_eq!(schema.categories()[0].hosts, vec!["gw.example"]);
        assert!(schema.categories()[1].hosts.is_empty());
    }

    #[test]
    fn test_missing_file() {
        let err = HostSchema::load(Path::new("/nonexistent/hosts.json")).unwrap_err();
        assert!(matches!(err, SchemaError::ReadFailed { .. }));
    }

    #[test]
    fn test_malformed_schema() {
        let err = HostSchema::from_reader(&b"{\"category\": 1}"[..]).unwrap_err();
        assert!(matches!(err, SchemaError::Decode(_)));
    }
}

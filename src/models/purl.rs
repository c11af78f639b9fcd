//! Package URL parsing and encoding.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SnykError;

/// A package URL such as `pkg:npm/lodash@4.17.21` or
/// `pkg:maven/org.apache.commons/commons-lang3@3.12.0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageUrl {
    /// Package ecosystem (`npm`, `maven`, `pypi`, ...).
    #[serde(rename = "type")]
    pub package_type: String,
    /// Optional name prefix, e.g. a Maven group id or npm scope.
    #[serde(default)]
    pub namespace: Option<String>,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub qualifiers: BTreeMap<String, String>,
    #[serde(default)]
    pub subpath: Option<String>,
}

impl PackageUrl {
    pub fn new(
        package_type: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            package_type: package_type.into(),
            namespace: None,
            name: name.into(),
            version: version.into(),
            qualifiers: BTreeMap::new(),
            subpath: None,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_qualifier(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.qualifiers.insert(key.into(), value.into());
        self
    }

    /// The purl percent-encoded as a single path segment, as the packages
    /// endpoints expect.
    pub fn encoded(&self) -> String {
        urlencoding::encode(&self.to_string()).into_owned()
    }
}

impl fmt::Display for PackageUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pkg:{}/", self.package_type)?;
        if let Some(namespace) = &self.namespace {
            write!(f, "{namespace}/")?;
        }
        write!(f, "{}@{}", self.name, self.version)?;

        if !self.qualifiers.is_empty() {
            let qualifiers: Vec<String> = self
                .qualifiers
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            write!(f, "?{}", qualifiers.join("&"))?;
        }
        if let Some(subpath) = &self.subpath {
            write!(f, "#{subpath}")?;
        }
        Ok(())
    }
}

impl FromStr for PackageUrl {
    type Err = SnykError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SnykError::InvalidPurl(s.to_string());

        let rest = s.trim().strip_prefix("pkg:").ok_or_else(invalid)?;

        let (rest, subpath) = match rest.split_once('#') {
            Some((head, sub)) => (head, Some(sub.to_string())),
            None => (rest, None),
        };

        let (rest, qualifiers) = match rest.split_once('?') {
            Some((head, query)) => {
                let mut qualifiers = BTreeMap::new();
                for pair in query.split('&').filter(|p| !p.is_empty()) {
                    let (k, v) = pair.split_once('=').ok_or_else(invalid)?;
                    qualifiers.insert(k.to_string(), v.to_string());
                }
                (head, qualifiers)
            }
            None => (rest, BTreeMap::new()),
        };

        let (package_type, path) = rest.split_once('/').ok_or_else(invalid)?;
        let (path, version) = path.rsplit_once('@').ok_or_else(invalid)?;
        let (namespace, name) = match path.rsplit_once('/') {
            Some((ns, name)) => (Some(ns.to_string()), name),
            None => (None, path),
        };

        if package_type.is_empty() || name.is_empty() || version.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            package_type: package_type.to_lowercase(),
            namespace,
            name: name.to_string(),
            version: version.to_string(),
            qualifiers,
            subpath,
        })
    }
}

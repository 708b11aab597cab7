//! Version catalog: the declared matrix of external versions.
//!
//! A catalog document maps matrix names to version maps:
//!
//! ```json
//! {
//!   "testedVersions": {
//!     "7.1.0": ["7.2"],
//!     "8.1.4": { "hints": ["8.2"], "min": "8.1.0", "max": "8.2.0" }
//!   }
//! }
//! ```
//!
//! Each value is either a list of toolchain hints or an object carrying the
//! hints plus the entry's inclusive lower and exclusive upper bound.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use super::error::{MatrixError, Result};
use super::version::Version;

/// Name of the matrix exercised by verification tasks.
pub const DEFAULT_TESTED_MATRIX: &str = "testedVersions";

/// The value side of one catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CatalogValue {
    Hints(Vec<String>),
    Bounded {
        #[serde(default)]
        hints: Vec<String>,
        #[serde(default)]
        min: Option<String>,
        #[serde(default)]
        max: Option<String>,
    },
}

impl CatalogValue {
    fn hints(&self) -> &[String] {
        match self {
            CatalogValue::Hints(h) => h,
            CatalogValue::Bounded { hints, .. } => hints,
        }
    }
}

/// One matrix as written, in document order, duplicates preserved.
///
/// `serde_json::Map` silently keeps the last of two equal keys, so the
/// entries are collected through a visitor instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatrixDocument {
    entries: Vec<(String, CatalogValue)>,
}

impl MatrixDocument {
    pub fn entries(&self) -> &[(String, CatalogValue)] {
        &self.entries
    }
}

impl<'de> Deserialize<'de> for MatrixDocument {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct MatrixVisitor;

        impl<'de> Visitor<'de> for MatrixVisitor {
            type Value = MatrixDocument;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of version identifiers to toolchain hints")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut entries = Vec::new();
                while let Some((key, value)) = map.next_entry::<String, CatalogValue>()? {
                    entries.push((key, value));
                }
                Ok(MatrixDocument { entries })
            }
        }

        deserializer.deserialize_map(MatrixVisitor)
    }
}

/// A parsed catalog document: matrix name to matrix.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct CatalogDocument {
    matrices: BTreeMap<String, MatrixDocument>,
}

impl CatalogDocument {
    pub fn parse(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| MatrixError::MalformedCatalog(format!("unreadable document: {}", e)))
    }

    pub fn matrix(&self, name: &str) -> Option<&MatrixDocument> {
        self.matrices.get(name)
    }

    pub fn matrix_names(&self) -> impl Iterator<Item = &str> {
        self.matrices.keys().map(String::as_str)
    }
}

/// A single declared external version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub identifier: String,
    pub version: Version,
    pub min_inclusive: Version,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_exclusive: Option<Version>,
    #[serde(default)]
    pub toolchain_hints: Vec<String>,
}

impl VersionEntry {
    /// Entry whose bounds collapse onto the identifier itself.
    pub fn new(identifier: &str) -> Result<Self> {
        let version = Version::parse(identifier)?;
        Ok(Self {
            identifier: version.as_str().to_string(),
            min_inclusive: version.clone(),
            version,
            max_exclusive: None,
            toolchain_hints: Vec::new(),
        })
    }

    fn from_value(identifier: &str, value: &CatalogValue) -> Result<Self> {
        if identifier.trim().is_empty() {
            return Err(MatrixError::MalformedCatalog(
                "entry without an identifier".to_string(),
            ));
        }
        let mut entry = Self::new(identifier)?;
        entry.toolchain_hints = value.hints().to_vec();

        if let CatalogValue::Bounded { min, max, .. } = value {
            if let Some(min) = min {
                entry.min_inclusive = Version::parse(min)?;
            }
            entry.max_exclusive = max.as_deref().map(Version::parse).transpose()?;
        }

        if let Some(max) = &entry.max_exclusive {
            if *max <= entry.min_inclusive {
                return Err(MatrixError::MalformedCatalog(format!(
                    "entry {}: upper bound {} is not above lower bound {}",
                    entry.identifier, max, entry.min_inclusive
                )));
            }
        }
        Ok(entry)
    }

    /// Whether `version` falls within `[min_inclusive, max_exclusive)`.
    pub fn contains(&self, version: &Version) -> bool {
        *version >= self.min_inclusive
            && self.max_exclusive.as_ref().map_or(true, |max| version < max)
    }
}

/// A validated matrix: unique identifiers, sorted ascending by version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionCatalog {
    matrix: String,
    entries: Vec<VersionEntry>,
}

impl VersionCatalog {
    /// Parse `json` and select `matrix`.
    pub fn load(json: &str, matrix: &str) -> Result<Self> {
        let doc = CatalogDocument::parse(json)?;
        Self::from_document(&doc, matrix)
    }

    pub fn load_file(path: &Path, matrix: &str) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::load(&json, matrix)
    }

    pub fn from_document(doc: &CatalogDocument, matrix: &str) -> Result<Self> {
        let raw = doc.matrix(matrix).ok_or_else(|| {
            MatrixError::MalformedCatalog(format!("matrix '{}' not found in catalog", matrix))
        })?;

        let entries = raw
            .entries()
            .iter()
            .map(|(id, value)| VersionEntry::from_value(id, value))
            .collect::<Result<Vec<_>>>()?;

        let catalog = Self::from_entries(matrix, entries)?;
        debug!(matrix = %matrix, entries = catalog.len(), "catalog loaded");
        Ok(catalog)
    }

    /// Build from already-parsed entries, enforcing uniqueness.
    pub fn from_entries(matrix: &str, mut entries: Vec<VersionEntry>) -> Result<Self> {
        let mut seen = HashSet::new();
        for entry in &entries {
            if entry.identifier.trim().is_empty() {
                return Err(MatrixError::MalformedCatalog(
                    "entry without an identifier".to_string(),
                ));
            }
            if !seen.insert(entry.identifier.as_str()) {
                return Err(MatrixError::MalformedCatalog(format!(
                    "duplicate identifier {}",
                    entry.identifier
                )));
            }
        }

        entries.sort_by(|a, b| a.version.cmp(&b.version));
        if let Some(pair) = entries.windows(2).find(|w| w[0].version == w[1].version) {
            return Err(MatrixError::MalformedCatalog(format!(
                "identifiers {} and {} denote the same version",
                pair[0].identifier, pair[1].identifier
            )));
        }

        Ok(Self {
            matrix: matrix.to_string(),
            entries,
        })
    }

    /// Fail fast when the declared latest version is not exercised.
    pub fn validate_against_latest_known(&self, latest: &Version) -> Result<()> {
        if self.get(latest).is_none() {
            return Err(MatrixError::UntestedLatestVersion {
                latest: latest.to_string(),
                matrix: self.matrix.clone(),
            });
        }
        Ok(())
    }

    pub fn matrix_name(&self) -> &str {
        &self.matrix
    }

    pub fn entries(&self) -> &[VersionEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, version: &Version) -> Option<&VersionEntry> {
        self.entries.iter().find(|e| e.version == *version)
    }

    /// Highest declared version.
    pub fn latest(&self) -> Option<&VersionEntry> {
        self.entries.last()
    }

    /// Identifier-to-hints view, serialized in catalog order.
    pub fn supported_versions(&self) -> SupportedVersions<'_> {
        SupportedVersions(self)
    }
}

/// Serializes a catalog as `{ "<id>": [hints...] }` in ascending version order.
#[derive(Debug, Clone, Copy)]
pub struct SupportedVersions<'a>(&'a VersionCatalog);

impl Serialize for SupportedVersions<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for entry in self.0.entries() {
            map.serialize_entry(&entry.identifier, &entry.toolchain_hints)?;
        }
        map.end()
    }
}

/// The tested and supported matrices must agree on the latest known version.
pub fn check_matrices_agree(
    tested: &VersionCatalog,
    supported: &VersionCatalog,
    latest: &Version,
) -> Result<()> {
    tested.validate_against_latest_known(latest)?;
    if supported.get(latest).is_none() {
        return Err(MatrixError::DivergentMatrices {
            tested: tested.matrix_name().to_string(),
            supported: supported.matrix_name().to_string(),
            latest: latest.to_string(),
        });
    }
    Ok(())
}

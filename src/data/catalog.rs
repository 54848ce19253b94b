//! Feature catalog supplied by the caller.

use serde::{Deserialize, Serialize};

/// Semantic type of a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    /// Two-valued feature (0/1 or two categories).
    Binary,
    /// Ordered discrete feature.
    Ordinal,
    /// Continuous numeric feature.
    Continuous,
    /// Unordered categorical feature.
    Categorical,
}

impl std::fmt::Display for SemanticType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Binary => write!(f, "binary"),
            Self::Ordinal => write!(f, "ordinal"),
            Self::Continuous => write!(f, "continuous"),
            Self::Categorical => write!(f, "categorical"),
        }
    }
}

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSpec {
    /// Column name in the dataset.
    pub name: String,
    /// Semantic type.
    pub semantic_type: SemanticType,
    /// Optional human description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FeatureSpec {
    /// Create a catalog entry.
    #[must_use]
    pub fn new(name: impl Into<String>, semantic_type: SemanticType) -> Self {
        Self {
            name: name.into(),
            semantic_type,
            description: None,
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// The ordered feature catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureCatalog {
    features: Vec<FeatureSpec>,
}

impl FeatureCatalog {
    /// Create a catalog from entries.
    #[must_use]
    pub fn new(features: Vec<FeatureSpec>) -> Self {
        Self { features }
    }

    /// The entries, in declared order.
    #[must_use]
    pub fn features(&self) -> &[FeatureSpec] {
        &self.features
    }

    /// Look up an entry by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FeatureSpec> {
        self.features.iter().find(|f| f.name == name)
    }

    /// Whether the catalog names this feature.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// All feature names, in declared order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.features.iter().map(|f| f.name.as_str()).collect()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

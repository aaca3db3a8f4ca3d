use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const DEFAULT_PROPERTY_TAG: &str = "genprop";
pub const DEFAULT_INTERPRO_TAG: &str = "ipr";

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvidenceIdentifier {
    PropertyReference(String),
    InterPro(String),
    /// PFAM, TIGRFAM and the other member databases.
    Consortium(String),
}

impl EvidenceIdentifier {
    pub fn classify(identifier: &str) -> Self {
        let lower = identifier.to_ascii_lowercase();
        if lower.contains(DEFAULT_PROPERTY_TAG) {
            Self::PropertyReference(identifier.to_string())
        } else if lower.contains(DEFAULT_INTERPRO_TAG) {
            Self::InterPro(identifier.to_string())
        } else {
            Self::Consortium(identifier.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::PropertyReference(id) | Self::InterPro(id) | Self::Consortium(id) => id,
        }
    }

    pub fn is_property_reference(&self) -> bool {
        matches!(self, Self::PropertyReference(_))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    identifiers: Vec<EvidenceIdentifier>,
    pub gene_ontology_terms: Vec<String>,
    pub sufficient: bool,
}

impl Evidence {
    pub fn new(identifiers: &[&str], gene_ontology_terms: &[&str], sufficient: bool) -> Self {
        Self {
            identifiers: identifiers
                .iter()
                .map(|id| EvidenceIdentifier::classify(id))
                .collect(),
            gene_ontology_terms: gene_ontology_terms.iter().map(|t| t.to_string()).collect(),
            sufficient,
        }
    }

    pub fn from_identifiers(identifiers: Vec<String>, gene_ontology_terms: Vec<String>, sufficient: bool) -> Self {
        Self {
            identifiers: identifiers
                .iter()
                .map(|id| EvidenceIdentifier::classify(id))
                .collect(),
            gene_ontology_terms,
            sufficient,
        }
    }

    pub fn identifiers(&self) -> &[EvidenceIdentifier] {
        &self.identifiers
    }

    pub fn has_property_reference(&self) -> bool {
        self.identifiers.iter().any(|id| id.is_property_reference())
    }

    pub fn property_references(&self) -> impl Iterator<Item = &str> {
        self.identifiers
            .iter()
            .filter(|id| id.is_property_reference())
            .map(|id| id.as_str())
    }

    pub fn interpro_identifiers(&self) -> impl Iterator<Item = &str> {
        self.identifiers.iter().filter_map(|id| match id {
            EvidenceIdentifier::InterPro(s) => Some(s.as_str()),
            _ => None,
        })
    }

    pub fn consortium_identifiers(&self) -> impl Iterator<Item = &str> {
        self.identifiers.iter().filter_map(|id| match id {
            EvidenceIdentifier::Consortium(s) => Some(s.as_str()),
            _ => None,
        })
    }

    pub fn matches_any(&self, matched: &HashSet<String>) -> bool {
        self.identifiers
            .iter()
            .filter(|id| !id.is_property_reference())
            .any(|id| matched.contains(id.as_str()))
    }
}

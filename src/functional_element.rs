use crate::evidence::Evidence;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref EC_NUMBER: Result<Regex, regex::Error> =
        Regex::new(r"[0-9]+[.][0-9-]+[.][0-9-]+[.][0-9-]+");
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionalElement {
    pub id: String,
    pub name: String,
    pub required: bool,
    pub evidence: Vec<Evidence>,
}

impl FunctionalElement {
    /// A missing name falls back to the identifier.
    pub fn new(id: &str, name: Option<&str>, required: bool, evidence: Vec<Evidence>) -> Self {
        Self {
            id: id.to_string(),
            name: name.unwrap_or(id).to_string(),
            required,
            evidence,
        }
    }

    pub fn has_evidence(&self) -> bool {
        !self.evidence.is_empty()
    }

    pub fn ec_numbers(&self) -> Result<Vec<String>, regex::Error> {
        let pattern = EC_NUMBER.as_ref().map_err(|e| e.clone())?;
        Ok(pattern
            .find_iter(&self.name)
            .map(|m| m.as_str().to_string())
            .collect())
    }
}

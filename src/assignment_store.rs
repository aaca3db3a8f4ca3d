use crate::{
    assignment_cache::AssignmentCache, matches::MatchRecord, property_tree::GenomePropertiesTree,
    results::GenomePropertiesResults, settings::AssignmentSettings, step::StepNumber,
};
use anyhow::{Context, Result, anyhow};
use genprop_protocol::Verdict;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use tracing::info;

pub const STORE_SCHEMA: &str = "genprop.assignments.v1";

fn default_schema() -> String {
    STORE_SCHEMA.to_string()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredProperty {
    pub property_identifier: String,
    pub numeric_assignment: u8,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredStep {
    pub property_identifier: String,
    pub step_number: StepNumber,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredSample {
    pub name: String,
    #[serde(default)]
    pub properties: Vec<StoredProperty>,
    #[serde(default)]
    pub step_assignments: Vec<StoredStep>,
    #[serde(default)]
    pub matches: Vec<MatchRecord>,
}

impl StoredSample {
    fn to_cache(&self, with_signatures: bool) -> Result<AssignmentCache> {
        let mut cache = if with_signatures {
            AssignmentCache::with_signatures(
                Some(&self.name),
                self.matches.iter().map(|m| m.signature_accession.clone()),
            )
        } else {
            AssignmentCache::new(Some(&self.name))
        };
        for property in &self.properties {
            let verdict = Verdict::try_from(property.numeric_assignment).map_err(|e| {
                anyhow!(
                    "{e} for {} in sample '{}'",
                    property.property_identifier,
                    self.name
                )
            })?;
            cache.cache_property(&property.property_identifier, verdict);
        }
        for step in &self.step_assignments {
            cache.cache_step(&step.property_identifier, step.step_number, Verdict::Yes);
        }
        Ok(cache)
    }

    fn sequence_count(&self) -> usize {
        self.matches
            .iter()
            .filter(|m| m.sequence.is_some())
            .map(|m| m.protein_accession.as_str())
            .collect::<HashSet<_>>()
            .len()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssignmentStore {
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default)]
    pub with_matches: bool,
    #[serde(default)]
    pub samples: Vec<StoredSample>,
}

impl Default for AssignmentStore {
    fn default() -> Self {
        Self {
            schema: default_schema(),
            with_matches: false,
            samples: vec![],
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StoreInfo {
    pub samples: usize,
    pub property_assignments: usize,
    pub step_assignments: usize,
    pub matches: usize,
    pub sequences: usize,
}

impl fmt::Display for StoreInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Samples: {}", self.samples)?;
        writeln!(f, "Property assignments: {}", self.property_assignments)?;
        writeln!(f, "Step assignments: {}", self.step_assignments)?;
        writeln!(f, "Matches: {}", self.matches)?;
        write!(f, "Sequences: {}", self.sequences)
    }
}

impl AssignmentStore {
    pub fn from_results(results: &GenomePropertiesResults<'_>) -> Self {
        let sample_matches = results.sample_matches();
        let samples = results
            .sample_names()
            .iter()
            .enumerate()
            .map(|(i, name)| StoredSample {
                name: name.clone(),
                properties: results
                    .property_results()
                    .iter()
                    .map(|(id, row)| StoredProperty {
                        property_identifier: id.clone(),
                        numeric_assignment: row[i].numeric(),
                    })
                    .collect(),
                step_assignments: results
                    .step_results()
                    .iter()
                    .filter(|(_, row)| row[i].is_yes())
                    .map(|((id, number), _)| StoredStep {
                        property_identifier: id.clone(),
                        step_number: *number,
                    })
                    .collect(),
                matches: sample_matches
                    .and_then(|m| m.get(i))
                    .cloned()
                    .unwrap_or_default(),
            })
            .collect();
        Self {
            schema: default_schema(),
            with_matches: sample_matches.is_some(),
            samples,
        }
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read assignment file '{}'", path.display()))?;
        let store: Self = serde_json::from_str(&text)
            .with_context(|| format!("Could not parse assignment JSON '{}'", path.display()))?;
        if store.schema != STORE_SCHEMA {
            return Err(anyhow!(
                "Unsupported assignment schema '{}' in '{}', expected '{STORE_SCHEMA}'",
                store.schema,
                path.display()
            ));
        }
        store
            .to_caches()
            .with_context(|| format!("Invalid assignments in '{}'", path.display()))?;
        Ok(store)
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self).context("Could not serialize assignments")?;
        std::fs::write(path, text)
            .with_context(|| format!("Could not write assignment file '{}'", path.display()))
    }

    pub fn has_matches(&self) -> bool {
        self.with_matches
    }

    pub fn sample_names(&self) -> Vec<&str> {
        self.samples.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn to_caches(&self) -> Result<Vec<AssignmentCache>> {
        self.samples
            .iter()
            .map(|s| s.to_cache(self.with_matches))
            .collect()
    }

    pub fn to_caches_with_matches(&self) -> Result<Vec<(AssignmentCache, Vec<MatchRecord>)>> {
        if !self.with_matches {
            return Err(anyhow!("The assignment store carries no domain matches"));
        }
        self.samples
            .iter()
            .map(|s| -> Result<_> { Ok((s.to_cache(true)?, s.matches.clone())) })
            .collect()
    }

    pub fn to_results<'t>(
        &self,
        tree: &'t GenomePropertiesTree,
        settings: &AssignmentSettings,
    ) -> Result<GenomePropertiesResults<'t>> {
        let results = if self.with_matches {
            GenomePropertiesResults::with_matches(tree, self.to_caches_with_matches()?, settings)?
        } else {
            GenomePropertiesResults::new(tree, self.to_caches()?, settings)?
        };
        Ok(results)
    }

    pub fn merge(stores: Vec<AssignmentStore>) -> Result<Self> {
        let Some(first) = stores.first() else {
            return Err(anyhow!("Nothing to merge"));
        };
        let with_matches = first.with_matches;
        if stores.iter().any(|s| s.with_matches != with_matches) {
            return Err(anyhow!(
                "Cannot merge assignment files with and without domain matches"
            ));
        }
        let mut seen = HashSet::new();
        let mut samples = vec![];
        for store in stores {
            for sample in store.samples {
                if !seen.insert(sample.name.clone()) {
                    return Err(anyhow!("Sample '{}' occurs in more than one file", sample.name));
                }
                samples.push(sample);
            }
        }
        info!("Merged {} samples", samples.len());
        Ok(Self {
            schema: default_schema(),
            with_matches,
            samples,
        })
    }

    pub fn info(&self) -> StoreInfo {
        StoreInfo {
            samples: self.samples.len(),
            property_assignments: self.samples.iter().map(|s| s.properties.len()).sum(),
            step_assignments: self.samples.iter().map(|s| s.step_assignments.len()).sum(),
            matches: self.samples.iter().map(|s| s.matches.len()).sum(),
            sequences: self.samples.iter().map(|s| s.sequence_count()).sum(),
        }
    }
}

use crate::{
    assign::{AssignmentError, bootstrap_assignments},
    assignment_cache::AssignmentCache,
    genome_property::GenomeProperty,
    matches::{MatchRecord, StepMatches},
    property_tree::GenomePropertiesTree,
    settings::AssignmentSettings,
    step::StepNumber,
};
use anyhow::{Result, anyhow};
use genprop_protocol::Verdict;
use rayon::prelude::*;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use tracing::info;

pub type StepKey = (String, StepNumber);

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResultsSummary {
    pub sample_names: Vec<String>,
    pub counts: BTreeMap<Verdict, Vec<f64>>,
}

pub struct GenomePropertiesResults<'t> {
    tree: &'t GenomePropertiesTree,
    sample_names: Vec<String>,
    property_results: BTreeMap<String, Vec<Verdict>>,
    step_results: BTreeMap<StepKey, Vec<Verdict>>,
    sample_matches: Option<Vec<Vec<MatchRecord>>>,
    step_matches: Option<StepMatches>,
}

pub fn bootstrap_all(
    tree: &GenomePropertiesTree,
    caches: &mut [AssignmentCache],
    settings: &AssignmentSettings,
) -> Result<(), AssignmentError> {
    let run = |cache: &mut AssignmentCache| bootstrap_assignments(tree, cache, settings).map(|_| ());
    if settings.parallel_samples {
        caches.par_iter_mut().try_for_each(run)
    } else {
        caches.iter_mut().try_for_each(run)
    }
}

fn all_equal(verdicts: &[Verdict]) -> bool {
    verdicts.windows(2).all(|w| w[0] == w[1])
}

impl<'t> GenomePropertiesResults<'t> {
    pub fn new(
        tree: &'t GenomePropertiesTree,
        mut caches: Vec<AssignmentCache>,
        settings: &AssignmentSettings,
    ) -> Result<Self, AssignmentError> {
        bootstrap_all(tree, &mut caches, settings)?;
        Ok(Self::from_bootstrapped(tree, &caches))
    }

    pub fn with_matches(
        tree: &'t GenomePropertiesTree,
        samples: Vec<(AssignmentCache, Vec<MatchRecord>)>,
        settings: &AssignmentSettings,
    ) -> Result<Self, AssignmentError> {
        let (mut caches, records): (Vec<AssignmentCache>, Vec<Vec<MatchRecord>>) =
            samples.into_iter().unzip();
        bootstrap_all(tree, &mut caches, settings)?;
        let mut ret = Self::from_bootstrapped(tree, &caches);
        let joined: Vec<(&str, &[MatchRecord])> = ret
            .sample_names
            .iter()
            .zip(records.iter())
            .map(|(name, records)| (name.as_str(), records.as_slice()))
            .collect();
        ret.step_matches = Some(StepMatches::new(tree, &joined));
        ret.sample_matches = Some(records);
        Ok(ret)
    }

    /// Builds the tables from caches that were already bootstrapped.
    pub fn from_bootstrapped(tree: &'t GenomePropertiesTree, caches: &[AssignmentCache]) -> Self {
        let n = caches.len();
        let sample_names: Vec<String> = caches
            .iter()
            .enumerate()
            .map(|(i, cache)| {
                cache
                    .sample_name
                    .clone()
                    .unwrap_or_else(|| format!("sample_{}", i + 1))
            })
            .collect();
        let mut property_results: BTreeMap<String, Vec<Verdict>> = BTreeMap::new();
        let mut step_results: BTreeMap<StepKey, Vec<Verdict>> = BTreeMap::new();
        for (i, cache) in caches.iter().enumerate() {
            for (id, verdict) in cache.property_rows() {
                property_results
                    .entry(id.to_string())
                    .or_insert_with(|| vec![Verdict::No; n])[i] = verdict;
            }
            for (id, number, verdict) in cache.step_rows() {
                step_results
                    .entry((id.to_string(), number))
                    .or_insert_with(|| vec![Verdict::No; n])[i] = verdict;
            }
        }
        info!(
            "Results for {n} samples: {} properties, {} steps",
            property_results.len(),
            step_results.len()
        );
        Self {
            tree,
            sample_names,
            property_results,
            step_results,
            sample_matches: None,
            step_matches: None,
        }
    }

    pub fn tree(&self) -> &'t GenomePropertiesTree {
        self.tree
    }

    pub fn sample_names(&self) -> &[String] {
        &self.sample_names
    }

    pub fn set_sample_names(&mut self, names: Vec<String>) -> Result<()> {
        if names.len() != self.sample_names.len() {
            return Err(anyhow!(
                "Expected {} sample names, got {}",
                self.sample_names.len(),
                names.len()
            ));
        }
        if names.iter().collect::<HashSet<_>>().len() != names.len() {
            return Err(anyhow!("Sample names must be unique"));
        }
        if let Some(matches) = self.step_matches.as_mut() {
            matches.rename_samples(&self.sample_names, &names);
        }
        self.sample_names = names;
        Ok(())
    }

    fn sample_index(&self, sample: &str) -> Option<usize> {
        self.sample_names.iter().position(|s| s == sample)
    }

    pub fn property_results(&self) -> &BTreeMap<String, Vec<Verdict>> {
        &self.property_results
    }

    pub fn step_results(&self) -> &BTreeMap<StepKey, Vec<Verdict>> {
        &self.step_results
    }

    pub fn properties(&self) -> Vec<&str> {
        self.property_results.keys().map(|k| k.as_str()).collect()
    }

    pub fn step_numbers_for_property(&self, property_id: &str) -> Vec<StepNumber> {
        self.step_results
            .keys()
            .filter(|(id, _)| id == property_id)
            .map(|(_, number)| *number)
            .collect()
    }

    /// NO everywhere when the property has no results.
    pub fn property_result(&self, property_id: &str) -> Vec<Verdict> {
        self.property_results
            .get(property_id)
            .cloned()
            .unwrap_or_else(|| vec![Verdict::No; self.sample_names.len()])
    }

    /// `None` only when the sample is unknown.
    pub fn property_result_for_sample(&self, property_id: &str, sample: &str) -> Option<Verdict> {
        let idx = self.sample_index(sample)?;
        Some(
            self.property_results
                .get(property_id)
                .map_or(Verdict::No, |row| row[idx]),
        )
    }

    pub fn step_result(&self, property_id: &str, step_number: StepNumber) -> Vec<Verdict> {
        self.step_results
            .get(&(property_id.to_string(), step_number))
            .cloned()
            .unwrap_or_else(|| vec![Verdict::No; self.sample_names.len()])
    }

    pub fn step_result_for_sample(
        &self,
        property_id: &str,
        step_number: StepNumber,
        sample: &str,
    ) -> Option<Verdict> {
        let idx = self.sample_index(sample)?;
        Some(
            self.step_results
                .get(&(property_id.to_string(), step_number))
                .map_or(Verdict::No, |row| row[idx]),
        )
    }

    pub fn differing_property_results(&self) -> BTreeMap<&str, &[Verdict]> {
        self.property_results
            .iter()
            .filter(|(_, row)| !all_equal(row))
            .map(|(id, row)| (id.as_str(), row.as_slice()))
            .collect()
    }

    pub fn differing_step_results(&self) -> BTreeMap<(&str, StepNumber), &[Verdict]> {
        self.step_results
            .iter()
            .filter(|(_, row)| !all_equal(row))
            .map(|((id, number), row)| ((id.as_str(), *number), row.as_slice()))
            .collect()
    }

    pub fn supported_property_results(&self) -> BTreeMap<&str, &[Verdict]> {
        self.property_results
            .iter()
            .filter(|(_, row)| !row.iter().all(|v| v.is_no()))
            .map(|(id, row)| (id.as_str(), row.as_slice()))
            .collect()
    }

    pub fn supported_step_results(&self) -> BTreeMap<(&str, StepNumber), &[Verdict]> {
        self.step_results
            .iter()
            .filter(|(_, row)| !row.iter().all(|v| v.is_no()))
            .map(|((id, number), row)| ((id.as_str(), *number), row.as_slice()))
            .collect()
    }

    fn selected_rows(&self, property_ids: &[&str], steps: bool) -> Vec<&[Verdict]> {
        let wanted: HashSet<&str> = property_ids.iter().copied().collect();
        if steps {
            self.step_results
                .iter()
                .filter(|((id, _), _)| wanted.contains(id.as_str()))
                .map(|(_, row)| row.as_slice())
                .collect()
        } else {
            self.property_results
                .iter()
                .filter(|(id, _)| wanted.contains(id.as_str()))
                .map(|(_, row)| row.as_slice())
                .collect()
        }
    }

    /// With `normalize` the counts become percentages.
    pub fn results_summary(&self, property_ids: &[&str], steps: bool, normalize: bool) -> ResultsSummary {
        let rows = self.selected_rows(property_ids, steps);
        let n = self.sample_names.len();
        let mut counts: BTreeMap<Verdict, Vec<f64>> = [Verdict::Yes, Verdict::Partial, Verdict::No]
            .into_iter()
            .map(|v| (v, vec![0.0; n]))
            .collect();
        for row in &rows {
            for (i, verdict) in row.iter().enumerate() {
                if let Some(column) = counts.get_mut(verdict) {
                    column[i] += 1.0;
                }
            }
        }
        if normalize && !rows.is_empty() {
            let total = rows.len() as f64;
            for column in counts.values_mut() {
                for value in column.iter_mut() {
                    *value = *value / total * 100.0;
                }
            }
        }
        ResultsSummary {
            sample_names: self.sample_names.clone(),
            counts,
        }
    }

    pub fn step_name(&self, property_id: &str, step_number: StepNumber) -> Option<String> {
        self.tree
            .get(property_id)
            .and_then(|p| p.step(step_number))
            .map(|s| s.name())
    }

    fn verdict_strings(verdicts: &[Verdict]) -> Vec<&'static str> {
        verdicts.iter().map(|v| v.as_str()).collect()
    }

    fn json_node(&self, property: &'t GenomeProperty, path: &mut Vec<&'t str>) -> Value {
        path.push(&property.id);
        let mut children = vec![];
        for step in &property.steps {
            let child_properties: Vec<&GenomeProperty> = step
                .property_references()
                .into_iter()
                .filter_map(|id| self.tree.get(id))
                .collect();
            if child_properties.is_empty() {
                children.push(json!({
                    "step_id": step.number,
                    "name": step.name(),
                    "enabled": false,
                    "result": Self::verdict_strings(&self.step_result(&property.id, step.number)),
                }));
                continue;
            }
            for child in child_properties {
                if !path.contains(&child.id.as_str()) {
                    children.push(self.json_node(child, path));
                }
            }
        }
        path.pop();
        json!({
            "property_id": property.id,
            "name": property.name,
            "enabled": false,
            "result": Self::verdict_strings(&self.property_result(&property.id)),
            "children": children,
        })
    }

    pub fn to_json(&self) -> Value {
        let tree = self.tree;
        let property_tree = match tree.root() {
            Some(root) => {
                let mut path = vec![];
                self.json_node(root, &mut path)
            }
            None => Value::Null,
        };
        json!({
            "sample_names": self.sample_names,
            "property_tree": property_tree,
        })
    }

    pub fn write_property_table<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        let mut header = vec!["Property_Identifier".to_string()];
        header.extend(self.sample_names.iter().cloned());
        wtr.write_record(&header)?;
        for (id, row) in &self.property_results {
            let mut record = vec![id.as_str()];
            record.extend(row.iter().map(|v| v.as_str()));
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn write_step_table<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        let mut header = vec!["Property_Identifier".to_string(), "Step_Number".to_string()];
        header.extend(self.sample_names.iter().cloned());
        wtr.write_record(&header)?;
        for ((id, number), row) in &self.step_results {
            let mut record = vec![id.clone(), number.to_string()];
            record.extend(row.iter().map(|v| v.as_str().to_string()));
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn step_matches(&self) -> Option<&StepMatches> {
        self.step_matches.as_ref()
    }

    pub fn sample_matches(&self) -> Option<&[Vec<MatchRecord>]> {
        self.sample_matches.as_deref()
    }

    pub fn write_step_fasta<W: Write>(
        &self,
        writer: W,
        property_id: &str,
        step_number: StepNumber,
        top: bool,
    ) -> Result<usize> {
        self.step_matches
            .as_ref()
            .ok_or_else(|| anyhow!("These results carry no domain matches"))?
            .write_step_fasta(writer, property_id, step_number, top)
    }
}

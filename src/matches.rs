use crate::{property_tree::GenomePropertiesTree, step::StepNumber};
use anyhow::{Result, anyhow};
use bio::io::fasta;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::io::Write;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub protein_accession: String,
    pub signature_accession: String,
    #[serde(default)]
    pub e_value: Option<f64>,
    #[serde(default)]
    pub sequence: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StepMatch {
    pub sample_name: String,
    pub property_id: String,
    pub step_number: StepNumber,
    pub signature_accession: String,
    pub protein_accession: String,
    pub e_value: Option<f64>,
    pub sequence: Option<String>,
}

impl StepMatch {
    fn group_key(&self) -> (&str, &str, StepNumber) {
        (&self.sample_name, &self.property_id, self.step_number)
    }
}

/// Lower E-values first; hits without an E-value go last.
fn compare_e_values(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[derive(Clone, Debug, Default)]
pub struct StepMatches {
    rows: Vec<StepMatch>,
}

impl StepMatches {
    /// `samples` pairs each sample name with its match records.
    pub fn new(tree: &GenomePropertiesTree, samples: &[(&str, &[MatchRecord])]) -> Self {
        let mut by_signature: HashMap<&str, Vec<(&str, StepNumber)>> = HashMap::new();
        let mapping = tree.consortium_step_mapping();
        for entry in &mapping {
            by_signature
                .entry(entry.signature_accession.as_str())
                .or_default()
                .push((entry.property_id.as_str(), entry.step_number));
        }

        let mut rows = vec![];
        for &(sample_name, records) in samples {
            let mut seen = HashSet::new();
            for record in records.iter() {
                let Some(steps) = by_signature.get(record.signature_accession.as_str()) else {
                    continue;
                };
                for &(property_id, step_number) in steps {
                    let key = (
                        property_id,
                        step_number,
                        record.signature_accession.as_str(),
                        record.protein_accession.as_str(),
                    );
                    if !seen.insert(key) {
                        continue;
                    }
                    rows.push(StepMatch {
                        sample_name: sample_name.to_string(),
                        property_id: property_id.to_string(),
                        step_number,
                        signature_accession: record.signature_accession.clone(),
                        protein_accession: record.protein_accession.clone(),
                        e_value: record.e_value,
                        sequence: record.sequence.clone(),
                    });
                }
            }
        }
        let mut ret = Self { rows };
        ret.sort_rows();
        ret
    }

    fn sort_rows(&mut self) {
        self.rows.sort_by(|a, b| {
            a.group_key()
                .cmp(&b.group_key())
                .then_with(|| compare_e_values(a.e_value, b.e_value))
                .then_with(|| a.protein_accession.cmp(&b.protein_accession))
        });
    }

    /// Renames samples by position: `old_names[i]` becomes `new_names[i]`.
    pub fn rename_samples(&mut self, old_names: &[String], new_names: &[String]) {
        let renames: HashMap<&str, &str> = old_names
            .iter()
            .map(|s| s.as_str())
            .zip(new_names.iter().map(|s| s.as_str()))
            .collect();
        for row in &mut self.rows {
            if let Some(new_name) = renames.get(row.sample_name.as_str()) {
                row.sample_name = new_name.to_string();
            }
        }
        self.sort_rows();
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[StepMatch] {
        &self.rows
    }

    /// The lowest E-value row of every (sample, property, step).
    pub fn top_matches(&self) -> Vec<&StepMatch> {
        let mut ret: Vec<&StepMatch> = vec![];
        for row in &self.rows {
            match ret.last() {
                Some(last) if last.group_key() == row.group_key() => {}
                _ => ret.push(row),
            }
        }
        ret
    }

    fn select<F>(&self, top: bool, filter: F) -> Option<Vec<&StepMatch>>
    where
        F: Fn(&StepMatch) -> bool,
    {
        let source: Vec<&StepMatch> = if top {
            self.top_matches()
        } else {
            self.rows.iter().collect()
        };
        let ret: Vec<&StepMatch> = source.into_iter().filter(|row| filter(row)).collect();
        if ret.is_empty() { None } else { Some(ret) }
    }

    pub fn sample_matches(&self, sample_name: &str, top: bool) -> Option<Vec<&StepMatch>> {
        self.select(top, |row| row.sample_name == sample_name)
    }

    pub fn property_matches(
        &self,
        property_id: &str,
        sample_name: Option<&str>,
        top: bool,
    ) -> Option<Vec<&StepMatch>> {
        self.select(top, |row| {
            row.property_id == property_id && sample_name.is_none_or(|s| row.sample_name == s)
        })
    }

    pub fn step_matches(
        &self,
        property_id: &str,
        step_number: StepNumber,
        sample_name: Option<&str>,
        top: bool,
    ) -> Option<Vec<&StepMatch>> {
        self.select(top, |row| {
            row.property_id == property_id
                && row.step_number == step_number
                && sample_name.is_none_or(|s| row.sample_name == s)
        })
    }

    /// Returns the number of proteins written; matches without a sequence
    /// are skipped.
    pub fn write_step_fasta<W: Write>(
        &self,
        writer: W,
        property_id: &str,
        step_number: StepNumber,
        top: bool,
    ) -> Result<usize> {
        let matches = self
            .step_matches(property_id, step_number, None, top)
            .ok_or_else(|| anyhow!("No matches for step {step_number} of {property_id}"))?;
        let mut fasta_writer = fasta::Writer::new(writer);
        let mut written = HashSet::new();
        for row in matches {
            let Some(sequence) = row.sequence.as_deref() else {
                continue;
            };
            if written.insert(row.protein_accession.as_str()) {
                fasta_writer.write(&row.protein_accession, None, sequence.as_bytes())?;
            }
        }
        fasta_writer.flush()?;
        Ok(written.len())
    }
}

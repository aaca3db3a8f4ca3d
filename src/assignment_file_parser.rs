use crate::{assignment_cache::AssignmentCache, matches::MatchRecord, step::StepNumber};
use anyhow::{Context, Result, anyhow};
use bio::io::fasta;
use csv::{ReaderBuilder, Trim};
use genprop_protocol::Verdict;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const SIGNATURE_COLUMN: usize = 4;
const PROTEIN_COLUMN: usize = 0;
const E_VALUE_COLUMN: usize = 8;
const PROTEIN_FASTA_EXTENSIONS: [&str; 2] = ["faa", "fasta"];

pub fn sample_name_from_path(path: &Path) -> Option<String> {
    path.file_stem().map(|s| s.to_string_lossy().to_string())
}

/// A `.faa` or `.fasta` file next to the TSV with the same stem.
pub fn protein_fasta_path_for(tsv_path: &Path) -> Option<PathBuf> {
    PROTEIN_FASTA_EXTENSIONS
        .iter()
        .map(|ext| tsv_path.with_extension(ext))
        .find(|candidate| candidate.exists())
}

fn field_after_colon(line: &str) -> &str {
    line.split(':').nth(1).unwrap_or_default().trim()
}

pub fn parse_longform<R: BufRead>(reader: R, sample_name: Option<&str>) -> Result<AssignmentCache> {
    let mut cache = AssignmentCache::new(sample_name);
    let mut property_id: Option<String> = None;
    let mut step_number: Option<StepNumber> = None;
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line_number = idx + 1;
        if line.contains("PROPERTY:") {
            property_id = Some(field_after_colon(&line).to_string());
            step_number = None;
        } else if line.contains("STEP NUMBER:") {
            let text = field_after_colon(&line);
            step_number = Some(
                text.parse()
                    .with_context(|| format!("Invalid step number '{text}' on line {line_number}"))?,
            );
        } else if line.contains("RESULT:") {
            let text = field_after_colon(&line);
            let verdict = Verdict::parse(text)
                .ok_or_else(|| anyhow!("Unknown result '{text}' on line {line_number}"))?;
            let property_id = property_id
                .as_deref()
                .ok_or_else(|| anyhow!("Result before any PROPERTY on line {line_number}"))?;
            if line.contains("STEP") {
                let step_number = step_number
                    .ok_or_else(|| anyhow!("Step result before any STEP NUMBER on line {line_number}"))?;
                cache.cache_step(property_id, step_number, verdict);
            } else {
                cache.cache_property(property_id, verdict);
            }
        }
    }
    Ok(cache)
}

pub fn load_longform_file<P: AsRef<Path>>(path: P) -> Result<AssignmentCache> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Could not open long-form file '{}'", path.display()))?;
    parse_longform(io::BufReader::new(file), sample_name_from_path(path).as_deref())
        .with_context(|| format!("Could not parse long-form file '{}'", path.display()))
}

pub fn parse_interproscan_matches<R: Read>(reader: R) -> Result<Vec<MatchRecord>> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);
    let mut ret = vec![];
    for (idx, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("Could not read TSV row {}", idx + 1))?;
        let Some(signature) = record.get(SIGNATURE_COLUMN).filter(|s| !s.is_empty()) else {
            warn!("Skipping InterProScan row {} without a signature accession", idx + 1);
            continue;
        };
        let e_value = record
            .get(E_VALUE_COLUMN)
            .and_then(|text| text.parse::<f64>().ok());
        ret.push(MatchRecord {
            protein_accession: record.get(PROTEIN_COLUMN).unwrap_or_default().to_string(),
            signature_accession: signature.to_string(),
            e_value,
            sequence: None,
        });
    }
    Ok(ret)
}

pub fn parse_interproscan<R: Read>(reader: R, sample_name: Option<&str>) -> Result<AssignmentCache> {
    let records = parse_interproscan_matches(reader)?;
    Ok(AssignmentCache::with_signatures(
        sample_name,
        records.into_iter().map(|r| r.signature_accession),
    ))
}

pub fn load_interproscan_file<P: AsRef<Path>>(path: P) -> Result<AssignmentCache> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Could not open InterProScan file '{}'", path.display()))?;
    parse_interproscan(file, sample_name_from_path(path).as_deref())
        .with_context(|| format!("Could not parse InterProScan file '{}'", path.display()))
}

pub fn parse_fasta_sequences<R: Read>(reader: R) -> Result<HashMap<String, String>> {
    let mut ret = HashMap::new();
    for record in fasta::Reader::new(reader).records() {
        let record = record.context("Could not read FASTA record")?;
        ret.insert(
            record.id().to_string(),
            String::from_utf8_lossy(record.seq()).to_string(),
        );
    }
    Ok(ret)
}

/// Matches whose protein is missing from the FASTA keep no sequence.
pub fn parse_interproscan_with_sequences<T: Read, F: Read>(
    tsv: T,
    fasta: F,
    sample_name: Option<&str>,
) -> Result<(AssignmentCache, Vec<MatchRecord>)> {
    let mut records = parse_interproscan_matches(tsv)?;
    let sequences = parse_fasta_sequences(fasta)?;
    let mut missing = 0;
    for record in &mut records {
        record.sequence = sequences.get(&record.protein_accession).cloned();
        if record.sequence.is_none() {
            missing += 1;
        }
    }
    if missing > 0 {
        debug!("{missing} InterProScan matches have no protein sequence");
    }
    records.dedup();
    let cache = AssignmentCache::with_signatures(
        sample_name,
        records.iter().map(|r| r.signature_accession.clone()),
    );
    Ok((cache, records))
}

pub fn load_interproscan_with_sequences<P: AsRef<Path>, Q: AsRef<Path>>(
    tsv_path: P,
    fasta_path: Q,
) -> Result<(AssignmentCache, Vec<MatchRecord>)> {
    let tsv_path = tsv_path.as_ref();
    let fasta_path = fasta_path.as_ref();
    let tsv = File::open(tsv_path)
        .with_context(|| format!("Could not open InterProScan file '{}'", tsv_path.display()))?;
    let fasta = File::open(fasta_path)
        .with_context(|| format!("Could not open FASTA file '{}'", fasta_path.display()))?;
    parse_interproscan_with_sequences(tsv, fasta, sample_name_from_path(tsv_path).as_deref())
        .with_context(|| format!("Could not parse '{}'", tsv_path.display()))
}

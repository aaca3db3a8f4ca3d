use crate::{
    evidence::Evidence,
    functional_element::FunctionalElement,
    genome_property::{DatabaseReference, GenomeProperty, LiteratureReference},
    property_tree::GenomePropertiesTree,
    step::{Step, StepNumber},
};
use anyhow::{Context, Result, anyhow};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead};
use std::path::Path;
use tracing::{debug, warn};

const RECORD_END: &str = "//";
const STEP_SECTION: &str = "--";
const SUFFICIENT: &str = "sufficient";
const UNCOLLAPSED_MARKERS: [&str; 2] = ["EV", "RQ"];
const LITERATURE_MARKERS: [&str; 5] = ["RN", "RM", "RT", "RA", "RL"];
const DATABASE_MARKERS: [&str; 2] = ["DC", "DR"];
const ELEMENT_MARKERS: [&str; 3] = ["ID", "DN", "RQ"];
const EVIDENCE_MARKERS: [&str; 2] = ["EV", "TG"];

type Row = (String, String);

pub fn load_genome_properties_file<P: AsRef<Path>>(path: P) -> Result<GenomePropertiesTree> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Could not open genome properties file '{}'", path.display()))?;
    parse_genome_properties_flat_file(io::BufReader::new(file))
        .with_context(|| format!("Could not parse genome properties file '{}'", path.display()))
}

pub fn parse_genome_properties_str(text: &str) -> Result<GenomePropertiesTree> {
    parse_genome_properties_flat_file(text.as_bytes())
}

/// A trailing record without a closing `//` is still parsed.
pub fn parse_genome_properties_flat_file<R: BufRead>(reader: R) -> Result<GenomePropertiesTree> {
    let mut properties = vec![];
    let mut record: Vec<Row> = vec![];
    let mut record_number = 1;
    for line in reader.lines() {
        let line = line?;
        if line.trim() == RECORD_END {
            if let Some(property) = parse_record(&record, record_number)? {
                properties.push(property);
            }
            record.clear();
            record_number += 1;
        } else if !line.trim().is_empty() {
            record.push(marker_and_content(&line));
        }
    }
    if let Some(property) = parse_record(&record, record_number)? {
        properties.push(property);
    }
    debug!("Parsed {} genome properties", properties.len());
    Ok(GenomePropertiesTree::new(properties))
}

fn marker_and_content(line: &str) -> Row {
    let mut parts = line.splitn(2, "  ");
    let marker = parts.next().unwrap_or_default().trim().to_string();
    let content = parts.next().unwrap_or_default().trim().to_string();
    (marker, content)
}

/// Joins wrapped lines, except for markers that legitimately repeat.
fn unwrap_record(record: &[Row]) -> Vec<Row> {
    let mut ret: Vec<Row> = Vec::with_capacity(record.len());
    for (marker, content) in record {
        match ret.last_mut() {
            Some((last_marker, last_content))
                if last_marker == marker && !UNCOLLAPSED_MARKERS.contains(&marker.as_str()) =>
            {
                last_content.push(' ');
                last_content.push_str(content);
            }
            _ => ret.push((marker.clone(), content.clone())),
        }
    }
    ret
}

fn parse_record(record: &[Row], record_number: usize) -> Result<Option<GenomeProperty>> {
    if record.is_empty() {
        return Ok(None);
    }
    let rows = unwrap_record(record);
    let split = rows
        .iter()
        .position(|(marker, _)| marker == STEP_SECTION)
        .unwrap_or(rows.len());
    let (header, step_rows) = rows.split_at(split);

    let core: HashMap<&str, &str> = header
        .iter()
        .map(|(marker, content)| (marker.as_str(), content.as_str()))
        .collect();
    let Some(id) = core.get("AC") else {
        warn!("Skipping genome properties record {record_number} without an AC line");
        return Ok(None);
    };
    let threshold = match core.get("TH") {
        Some(text) => text
            .parse::<usize>()
            .with_context(|| format!("Invalid threshold '{text}' in {id}"))?,
        None => 0,
    };
    let steps = match step_rows.split_first() {
        Some((_, rows)) => parse_steps(rows).with_context(|| format!("Invalid steps in {id}"))?,
        None => vec![],
    };

    let mut property = GenomeProperty::new(
        id,
        core.get("DE").copied().unwrap_or_default(),
        core.get("TP").copied().unwrap_or_default(),
        threshold,
        steps,
    );
    property.description = core.get("CC").map(|s| s.to_string());
    property.private_notes = core.get("**").map(|s| s.to_string());
    property.literature_references = parse_literature_references(header)
        .with_context(|| format!("Invalid literature reference in {id}"))?;
    property.database_references = parse_database_references(header);
    Ok(Some(property))
}

/// Splits rows into groups; a group ends when one of its markers repeats.
fn group_on_repeat<'a>(rows: impl Iterator<Item = &'a Row>) -> Vec<HashMap<&'a str, &'a str>> {
    let mut groups = vec![];
    let mut current: HashMap<&str, &str> = HashMap::new();
    for (marker, content) in rows {
        if current.contains_key(marker.as_str()) {
            groups.push(std::mem::take(&mut current));
        }
        current.insert(marker.as_str(), content.as_str());
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

fn parse_literature_references(rows: &[Row]) -> Result<Vec<LiteratureReference>> {
    let relevant = rows
        .iter()
        .filter(|(marker, _)| LITERATURE_MARKERS.contains(&marker.as_str()));
    group_on_repeat(relevant)
        .into_iter()
        .map(|fields| -> Result<LiteratureReference> {
            let number = match fields.get("RN") {
                Some(text) => text
                    .trim_matches(|c: char| c == '[' || c == ']')
                    .parse()
                    .with_context(|| format!("Invalid reference number '{text}'"))?,
                None => 0,
            };
            let pubmed_id = match fields.get("RM") {
                Some(text) => text
                    .parse()
                    .with_context(|| format!("Invalid PubMed identifier '{text}'"))?,
                None => 0,
            };
            Ok(LiteratureReference {
                number,
                pubmed_id,
                title: fields.get("RT").copied().unwrap_or_default().to_string(),
                authors: fields.get("RA").copied().unwrap_or_default().to_string(),
                journal: fields.get("RL").copied().unwrap_or_default().to_string(),
            })
        })
        .collect()
}

fn parse_database_references(rows: &[Row]) -> Vec<DatabaseReference> {
    let relevant = rows
        .iter()
        .filter(|(marker, _)| DATABASE_MARKERS.contains(&marker.as_str()));
    group_on_repeat(relevant)
        .into_iter()
        .map(|fields| {
            let mut ids = extract_identifiers(fields.get("DR").copied().unwrap_or_default());
            let database_name = if ids.is_empty() {
                String::new()
            } else {
                ids.remove(0)
            };
            DatabaseReference {
                database_name,
                record_title: fields.get("DC").copied().unwrap_or_default().to_string(),
                record_ids: ids,
            }
        })
        .collect()
}

fn parse_steps(rows: &[Row]) -> Result<Vec<Step>> {
    let mut steps = vec![];
    let mut number: StepNumber = 0;
    let mut current: Vec<&Row> = vec![];
    for row in rows {
        if row.0 == "SN" {
            if !current.is_empty() {
                steps.push(Step::new(number, parse_functional_elements(&current)?));
                current.clear();
            }
            number = row
                .1
                .parse()
                .map_err(|e| anyhow!("Invalid step number '{}': {e}", row.1))?;
        } else if ELEMENT_MARKERS.contains(&row.0.as_str()) || EVIDENCE_MARKERS.contains(&row.0.as_str()) {
            current.push(row);
        }
    }
    if !current.is_empty() {
        steps.push(Step::new(number, parse_functional_elements(&current)?));
    }
    Ok(steps)
}

fn parse_functional_elements(rows: &[&Row]) -> Result<Vec<FunctionalElement>> {
    let mut elements = vec![];
    let mut fields: HashMap<&str, &str> = HashMap::new();
    let mut evidence_rows: Vec<&Row> = vec![];
    for &row in rows {
        let marker = row.0.as_str();
        if ELEMENT_MARKERS.contains(&marker) {
            if fields.contains_key(marker) {
                elements.push(build_element(&fields, &evidence_rows)?);
                fields.clear();
                evidence_rows.clear();
            }
            fields.insert(marker, row.1.as_str());
        } else {
            evidence_rows.push(row);
        }
    }
    if !fields.is_empty() || !evidence_rows.is_empty() {
        elements.push(build_element(&fields, &evidence_rows)?);
    }
    Ok(elements)
}

fn build_element(fields: &HashMap<&str, &str>, evidence_rows: &[&Row]) -> Result<FunctionalElement> {
    let required = match fields.get("RQ") {
        Some(text) => {
            text.parse::<u8>()
                .with_context(|| format!("Invalid required flag '{text}'"))?
                == 1
        }
        None => false,
    };
    let evidence = group_on_repeat(evidence_rows.iter().copied())
        .into_iter()
        .map(|ev| parse_single_evidence(ev.get("EV").copied(), ev.get("TG").copied()))
        .collect();
    Ok(FunctionalElement::new(
        fields.get("ID").copied().unwrap_or_default(),
        fields.get("DN").copied(),
        required,
        evidence,
    ))
}

fn parse_single_evidence(evidence: Option<&str>, gene_ontology: Option<&str>) -> Evidence {
    let evidence = evidence.unwrap_or_default();
    Evidence::from_identifiers(
        extract_identifiers(evidence),
        extract_identifiers(gene_ontology.unwrap_or_default()),
        evidence.contains(SUFFICIENT),
    )
}

fn extract_identifiers(content: &str) -> Vec<String> {
    content
        .split(';')
        .map(str::trim)
        .filter(|id| !id.is_empty() && *id != SUFFICIENT)
        .map(|id| id.to_string())
        .collect()
}

use crate::genome_property::{GenomeProperty, PropertyIndex};
use crate::step::StepNumber;
use anyhow::Result;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use tracing::{debug, warn};

const METABOLISM_DATABASES: [&str; 2] = ["MetaCyc", "KEGG"];

#[derive(Clone, Debug, Default)]
pub struct GenomePropertiesTree {
    properties: Vec<GenomeProperty>,
    by_id: HashMap<String, PropertyIndex>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StepSignature {
    pub property_id: String,
    pub step_number: StepNumber,
    pub signature_accession: String,
}

impl GenomePropertiesTree {
    pub fn new(properties: Vec<GenomeProperty>) -> Self {
        let mut ret = Self::default();
        for mut property in properties {
            property.parents.clear();
            property.children.clear();
            match ret.by_id.get(&property.id) {
                Some(&idx) => {
                    warn!("Duplicate genome property '{}' replaces earlier record", property.id);
                    ret.properties[idx] = property;
                }
                None => {
                    ret.by_id.insert(property.id.clone(), ret.properties.len());
                    ret.properties.push(property);
                }
            }
        }
        ret.build_connections();
        ret
    }

    /// References to unknown properties are skipped.
    fn build_connections(&mut self) {
        let mut links: Vec<(PropertyIndex, PropertyIndex)> = vec![];
        for (parent_idx, property) in self.properties.iter().enumerate() {
            for child_id in property.child_property_identifiers() {
                match self.by_id.get(child_id) {
                    Some(&child_idx) => links.push((parent_idx, child_idx)),
                    None => debug!(
                        "Skipping dangling reference from '{}' to '{child_id}'",
                        property.id
                    ),
                }
            }
        }
        for (parent_idx, child_idx) in links {
            self.properties[parent_idx].children.push(child_idx);
            self.properties[child_idx].parents.push(parent_idx);
        }
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GenomeProperty> {
        self.properties.iter()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&GenomeProperty> {
        self.by_id.get(id).map(|&idx| &self.properties[idx])
    }

    pub fn index_of(&self, id: &str) -> Option<PropertyIndex> {
        self.by_id.get(id).copied()
    }

    pub fn property(&self, idx: PropertyIndex) -> Option<&GenomeProperty> {
        self.properties.get(idx)
    }

    pub fn parents_of<'a>(&'a self, property: &'a GenomeProperty) -> impl Iterator<Item = &'a GenomeProperty> {
        property.parents.iter().map(|&idx| &self.properties[idx])
    }

    pub fn children_of<'a>(&'a self, property: &'a GenomeProperty) -> impl Iterator<Item = &'a GenomeProperty> {
        property.children.iter().map(|&idx| &self.properties[idx])
    }

    /// Follows first parents upward from the first catalog entry. A parent
    /// cycle stops at the first property seen twice.
    pub fn root(&self) -> Option<&GenomeProperty> {
        self.root_index().map(|idx| &self.properties[idx])
    }

    pub fn root_index(&self) -> Option<PropertyIndex> {
        if self.properties.is_empty() {
            return None;
        }
        let mut idx = 0;
        let mut seen = HashSet::new();
        while let Some(&parent_idx) = self.properties[idx].parents.first() {
            if !seen.insert(idx) {
                warn!(
                    "Parent cycle while resolving the root at '{}'",
                    self.properties[idx].id
                );
                break;
            }
            idx = parent_idx;
        }
        Some(idx)
    }

    pub(crate) fn at(&self, idx: PropertyIndex) -> &GenomeProperty {
        &self.properties[idx]
    }

    pub fn roots(&self) -> Vec<&GenomeProperty> {
        self.properties.iter().filter(|p| p.parents.is_empty()).collect()
    }

    pub fn leaves(&self) -> Vec<&GenomeProperty> {
        self.properties.iter().filter(|p| p.children.is_empty()).collect()
    }

    pub fn property_identifiers(&self) -> HashSet<&str> {
        self.by_id.keys().map(|k| k.as_str()).collect()
    }

    pub fn interpro_identifiers(&self) -> HashSet<&str> {
        self.properties
            .iter()
            .flat_map(|p| p.steps.iter())
            .flat_map(|s| s.interpro_identifiers())
            .collect()
    }

    pub fn consortium_identifiers(&self) -> HashSet<&str> {
        self.properties
            .iter()
            .flat_map(|p| p.steps.iter())
            .flat_map(|s| s.consortium_identifiers())
            .collect()
    }

    pub fn consortium_step_mapping(&self) -> Vec<StepSignature> {
        let mut ret = vec![];
        for property in &self.properties {
            for step in &property.steps {
                for accession in step.consortium_identifiers() {
                    ret.push(StepSignature {
                        property_id: property.id.clone(),
                        step_number: step.number,
                        signature_accession: accession.to_string(),
                    });
                }
            }
        }
        ret
    }

    pub fn to_nested_json(&self) -> Value {
        match self.root() {
            Some(root) => {
                let mut path = vec![];
                self.nested_json_for(root, &mut path)
            }
            None => Value::Null,
        }
    }

    fn nested_json_for<'a>(&'a self, property: &'a GenomeProperty, path: &mut Vec<&'a str>) -> Value {
        path.push(&property.id);
        let children: Vec<Value> = self
            .children_of(property)
            .filter(|child| !path.contains(&child.id.as_str()))
            .collect::<Vec<_>>()
            .into_iter()
            .map(|child| self.nested_json_for(child, path))
            .collect();
        path.pop();
        let mut ret = property.to_json_value(false, false);
        ret["children"] = Value::Array(children);
        ret
    }

    pub fn to_nodes_and_links_json(&self) -> Value {
        let nodes: Vec<Value> = self
            .properties
            .iter()
            .map(|p| p.to_json_value(false, false))
            .collect();
        let links: Vec<Value> = self
            .properties
            .iter()
            .flat_map(|child| {
                self.parents_of(child)
                    .map(move |parent| json!({"parent": parent.id, "child": child.id}))
            })
            .collect();
        json!({"nodes": nodes, "links": links})
    }

    pub fn write_metabolism_mapping<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
        for property in &self.properties {
            for db in &property.database_references {
                if !METABOLISM_DATABASES.contains(&db.database_name.as_str()) {
                    continue;
                }
                let first_record = db.record_ids.first().map(|s| s.as_str()).unwrap_or("");
                let row = [
                    property.id.as_str(),
                    property.name.as_str(),
                    db.database_name.as_str(),
                    db.record_title.as_str(),
                    first_record,
                ];
                wtr.write_record(row.iter().map(|field| field.replace(',', "")))?;
            }
        }
        wtr.flush()?;
        Ok(())
    }
}

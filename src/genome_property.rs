use crate::step::{Step, StepNumber};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub type PropertyIndex = usize;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LiteratureReference {
    pub number: u32,
    pub pubmed_id: u64,
    pub title: String,
    pub authors: String,
    pub journal: String,
}

impl LiteratureReference {
    pub fn citation(&self) -> String {
        format!(
            "{} {} {} PMID: {}",
            self.authors, self.title, self.journal, self.pubmed_id
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseReference {
    pub database_name: String,
    pub record_title: String,
    pub record_ids: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GenomeProperty {
    pub id: String,
    pub name: String,
    pub property_type: String,
    pub threshold: usize,
    pub steps: Vec<Step>,
    pub description: Option<String>,
    pub private_notes: Option<String>,
    pub public: bool,
    pub literature_references: Vec<LiteratureReference>,
    pub database_references: Vec<DatabaseReference>,
    #[serde(skip)]
    pub(crate) parents: Vec<PropertyIndex>,
    #[serde(skip)]
    pub(crate) children: Vec<PropertyIndex>,
}

impl GenomeProperty {
    pub fn new(id: &str, name: &str, property_type: &str, threshold: usize, steps: Vec<Step>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            property_type: property_type.to_string(),
            threshold,
            steps,
            public: true,
            ..Default::default()
        }
    }

    pub fn parents(&self) -> &[PropertyIndex] {
        &self.parents
    }

    pub fn children(&self) -> &[PropertyIndex] {
        &self.children
    }

    pub fn required_steps(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter().filter(|s| s.required())
    }

    pub fn has_required_steps(&self) -> bool {
        self.steps.iter().any(|s| s.required())
    }

    pub fn step(&self, number: StepNumber) -> Option<&Step> {
        self.steps.iter().find(|s| s.number == number)
    }

    /// Property identifiers referenced by evidence in any step, in order.
    pub fn child_property_identifiers(&self) -> Vec<&str> {
        self.steps
            .iter()
            .flat_map(|s| s.property_references())
            .collect()
    }

    pub fn to_json_value(&self, add_supports: bool, add_private_notes: bool) -> serde_json::Value {
        let mut ret = json!({
            "id": self.id,
            "name": self.name,
            "type": self.property_type,
            "description": self.description,
        });
        if add_supports {
            let pubmed: Vec<u64> = self
                .literature_references
                .iter()
                .map(|r| r.pubmed_id)
                .collect();
            let mut databases = serde_json::Map::new();
            for db in &self.database_references {
                let entry = databases
                    .entry(db.database_name.clone())
                    .or_insert_with(|| json!([]));
                if let Some(arr) = entry.as_array_mut() {
                    arr.extend(db.record_ids.iter().map(|id| json!(id)));
                }
            }
            ret["pubmed"] = json!(pubmed);
            ret["databases"] = serde_json::Value::Object(databases);
        }
        if add_private_notes {
            ret["notes"] = json!(self.private_notes);
        }
        ret
    }
}

use crate::{property_tree::GenomePropertiesTree, step::StepNumber};
use genprop_protocol::Verdict;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use tracing::info;

/// Lookups return `None` for "not computed yet", unlike a cached NO.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AssignmentCache {
    pub sample_name: Option<String>,
    property_assignments: HashMap<String, Verdict>,
    step_assignments: HashMap<String, BTreeMap<StepNumber, Verdict>>,
    matched_signatures: HashSet<String>,
}

impl AssignmentCache {
    pub fn new(sample_name: Option<&str>) -> Self {
        Self {
            sample_name: sample_name.map(|s| s.to_string()),
            ..Default::default()
        }
    }

    pub fn with_signatures<I, S>(sample_name: Option<&str>, signatures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sample_name: sample_name.map(|s| s.to_string()),
            matched_signatures: signatures.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn matched_signatures(&self) -> &HashSet<String> {
        &self.matched_signatures
    }

    pub fn cache_property(&mut self, property_id: &str, verdict: Verdict) {
        self.property_assignments.insert(property_id.to_string(), verdict);
    }

    pub fn get_property(&self, property_id: &str) -> Option<Verdict> {
        self.property_assignments.get(property_id).copied()
    }

    pub fn cache_step(&mut self, property_id: &str, step_number: StepNumber, verdict: Verdict) {
        self.step_assignments
            .entry(property_id.to_string())
            .or_default()
            .insert(step_number, verdict);
    }

    pub fn get_step(&self, property_id: &str, step_number: StepNumber) -> Option<Verdict> {
        self.step_assignments
            .get(property_id)
            .and_then(|steps| steps.get(&step_number))
            .copied()
    }

    pub fn step_assignments_of(&self, property_id: &str) -> Option<&BTreeMap<StepNumber, Verdict>> {
        self.step_assignments.get(property_id)
    }

    /// Removes the property verdict and every step verdict of that property.
    pub fn flush_property(&mut self, property_id: &str) {
        self.property_assignments.remove(property_id);
        self.step_assignments.remove(property_id);
    }

    pub fn property_identifiers(&self) -> HashSet<&str> {
        self.property_assignments.keys().map(|k| k.as_str()).collect()
    }

    pub fn step_property_identifiers(&self) -> HashSet<&str> {
        self.step_assignments.keys().map(|k| k.as_str()).collect()
    }

    /// Properties with a verdict but no step verdicts at all.
    pub fn unsynchronized_identifiers(&self) -> HashSet<&str> {
        let with_steps = self.step_property_identifiers();
        self.property_identifiers()
            .into_iter()
            .filter(|id| !with_steps.contains(id))
            .collect()
    }

    /// Identifiers cached here but unknown to the catalog.
    pub fn unshared_identifiers(&self, tree: &GenomePropertiesTree) -> Vec<String> {
        let mut ret: Vec<String> = self
            .property_assignments
            .keys()
            .chain(self.step_assignments.keys())
            .filter(|id| !tree.contains(id))
            .cloned()
            .collect();
        ret.sort();
        ret.dedup();
        ret
    }

    /// Flushes every property the catalog does not know. Returns the flushed
    /// identifiers in sorted order.
    pub fn synchronize(&mut self, tree: &GenomePropertiesTree) -> Vec<String> {
        let unshared = self.unshared_identifiers(tree);
        for id in &unshared {
            self.flush_property(id);
        }
        if !unshared.is_empty() {
            info!(
                "Flushed {} properties unknown to the catalog from sample {}",
                unshared.len(),
                self.sample_name.as_deref().unwrap_or("<unnamed>")
            );
        }
        unshared
    }

    pub fn property_count(&self) -> usize {
        self.property_assignments.len()
    }

    pub fn step_count(&self) -> usize {
        self.step_assignments.values().map(|s| s.len()).sum()
    }

    pub fn property_rows(&self) -> Vec<(&str, Verdict)> {
        let mut ret: Vec<(&str, Verdict)> = self
            .property_assignments
            .iter()
            .map(|(id, v)| (id.as_str(), *v))
            .collect();
        ret.sort_by(|a, b| a.0.cmp(b.0));
        ret
    }

    pub fn step_rows(&self) -> Vec<(&str, StepNumber, Verdict)> {
        let mut ret: Vec<(&str, StepNumber, Verdict)> = self
            .step_assignments
            .iter()
            .flat_map(|(id, steps)| steps.iter().map(move |(n, v)| (id.as_str(), *n, *v)))
            .collect();
        ret.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        ret
    }
}

impl fmt::Display for AssignmentCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, Property Assignments: {}, Step Assignments: {}, InterPro Identifiers: {}, Unsynchronized Identifiers: {}",
            self.sample_name.as_deref().unwrap_or("None"),
            self.property_assignments.len(),
            self.step_count(),
            self.matched_signatures.len(),
            self.unsynchronized_identifiers().len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome_property::GenomeProperty;

    #[test]
    fn test_absent_is_not_no() {
        let mut cache = AssignmentCache::new(Some("C_chlorochromatii_CaD3"));
        assert_eq!(cache.get_property("GenProp0001"), None);
        cache.cache_property("GenProp0001", Verdict::No);
        assert_eq!(cache.get_property("GenProp0001"), Some(Verdict::No));
        assert_eq!(cache.get_step("GenProp0001", 1), None);
        cache.cache_step("GenProp0001", 1, Verdict::No);
        assert_eq!(cache.get_step("GenProp0001", 1), Some(Verdict::No));
        assert_eq!(cache.get_step("GenProp0001", 2), None);
    }

    #[test]
    fn test_flush_property() {
        let mut cache = AssignmentCache::default();
        cache.cache_property("GenProp0001", Verdict::Yes);
        cache.cache_step("GenProp0001", 1, Verdict::Yes);
        cache.cache_step("GenProp0001", 2, Verdict::No);
        cache.cache_property("GenProp0002", Verdict::Partial);
        cache.flush_property("GenProp0001");
        assert_eq!(cache.get_property("GenProp0001"), None);
        assert!(cache.step_assignments_of("GenProp0001").is_none());
        assert_eq!(cache.property_count(), 1);
    }

    #[test]
    fn test_unsynchronized_identifiers() {
        let mut cache = AssignmentCache::default();
        cache.cache_property("GenProp0001", Verdict::Yes);
        cache.cache_property("GenProp0002", Verdict::No);
        cache.cache_step("GenProp0001", 1, Verdict::Yes);
        assert_eq!(
            cache.unsynchronized_identifiers(),
            ["GenProp0002"].into_iter().collect()
        );
    }

    #[test]
    fn test_synchronize() {
        let tree = GenomePropertiesTree::new(vec![GenomeProperty::new(
            "GenProp0002",
            "Y",
            "GUILD",
            0,
            vec![],
        )]);
        let mut cache = AssignmentCache::default();
        cache.cache_property("GenProp0001", Verdict::Yes);
        cache.cache_step("GenProp0001", 1, Verdict::Yes);
        cache.cache_property("GenProp0002", Verdict::No);
        cache.cache_step("GenProp0003", 1, Verdict::Yes);
        let flushed = cache.synchronize(&tree);
        assert_eq!(flushed, ["GenProp0001", "GenProp0003"]);
        assert_eq!(cache.property_rows(), [("GenProp0002", Verdict::No)]);
        assert!(cache.step_rows().is_empty());
    }

    #[test]
    fn test_rows_sorted() {
        let mut cache = AssignmentCache::with_signatures(Some("S1"), ["TIGR03114"]);
        cache.cache_step("GenProp0002", 2, Verdict::No);
        cache.cache_step("GenProp0002", 1, Verdict::Yes);
        cache.cache_step("GenProp0001", 3, Verdict::Yes);
        assert_eq!(
            cache.step_rows(),
            [
                ("GenProp0001", 3, Verdict::Yes),
                ("GenProp0002", 1, Verdict::Yes),
                ("GenProp0002", 2, Verdict::No),
            ]
        );
        assert!(cache.matched_signatures().contains("TIGR03114"));
        assert_eq!(
            cache.to_string(),
            "S1, Property Assignments: 0, Step Assignments: 3, InterPro Identifiers: 1, Unsynchronized Identifiers: 0"
        );
    }
}

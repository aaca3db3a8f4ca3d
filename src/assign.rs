use crate::{
    assignment_cache::AssignmentCache,
    evidence::Evidence,
    functional_element::FunctionalElement,
    genome_property::{GenomeProperty, PropertyIndex},
    property_tree::GenomePropertiesTree,
    settings::AssignmentSettings,
    step::Step,
};
use genprop_protocol::{
    Verdict, all_children_unanimous, required_steps_with_threshold, sufficient_evidence,
};
use thiserror::Error;
use tracing::{debug, warn};

/// Any of these aborts the evaluation of a sample.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssignmentError {
    #[error("unresolvable property reference '{evidence_property}' in evidence of '{property}'")]
    UnresolvableReference {
        property: String,
        evidence_property: String,
    },
    #[error("cyclic property reference detected involving {property} (chain: {})", .chain.join(" -> "))]
    CyclicReference { property: String, chain: Vec<String> },
    #[error("recursion limit of {limit} exceeded at {property} (chain: {})", .chain.join(" -> "))]
    RecursionLimit {
        property: String,
        limit: usize,
        chain: Vec<String>,
    },
    #[error("genome property '{0}' is not part of the catalog")]
    UnknownProperty(String),
    #[error("the genome properties catalog is empty")]
    EmptyCatalog,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AssignmentStats {
    pub property_evaluations: usize,
    pub property_cache_hits: usize,
    pub step_evaluations: usize,
    pub step_cache_hits: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BootstrapSummary {
    pub flushed: Vec<String>,
    pub root_verdict: Option<Verdict>,
    pub repaired_steps: usize,
}

pub struct Assigner<'a> {
    tree: &'a GenomePropertiesTree,
    cache: &'a mut AssignmentCache,
    max_recursion_depth: usize,
    in_progress: Vec<PropertyIndex>,
    stats: AssignmentStats,
}

impl<'a> Assigner<'a> {
    pub fn new(tree: &'a GenomePropertiesTree, cache: &'a mut AssignmentCache) -> Self {
        Self::with_settings(tree, cache, &AssignmentSettings::default())
    }

    pub fn with_settings(
        tree: &'a GenomePropertiesTree,
        cache: &'a mut AssignmentCache,
        settings: &AssignmentSettings,
    ) -> Self {
        Self {
            tree,
            cache,
            max_recursion_depth: settings.max_recursion_depth,
            in_progress: vec![],
            stats: AssignmentStats::default(),
        }
    }

    pub fn stats(&self) -> AssignmentStats {
        self.stats
    }

    /// Evaluates `property_id`, or the catalog root when `None`.
    pub fn evaluate(&mut self, property_id: Option<&str>) -> Result<Verdict, AssignmentError> {
        let idx = match property_id {
            Some(id) => self
                .tree
                .index_of(id)
                .ok_or_else(|| AssignmentError::UnknownProperty(id.to_string()))?,
            None => self.tree.root_index().ok_or(AssignmentError::EmptyCatalog)?,
        };
        self.evaluate_property(idx)
    }

    pub fn bootstrap(&mut self) -> Result<BootstrapSummary, AssignmentError> {
        let flushed = self.cache.synchronize(self.tree);
        let root_verdict = match self.tree.root_index() {
            Some(root) => Some(self.evaluate_property(root)?),
            None => None,
        };
        let repaired_steps = self.repair_missing_steps()?;
        debug!(
            "Bootstrapped sample {}: root {:?}, {} flushed, {} steps repaired",
            self.cache.sample_name.as_deref().unwrap_or("<unnamed>"),
            root_verdict,
            flushed.len(),
            repaired_steps
        );
        Ok(BootstrapSummary {
            flushed,
            root_verdict,
            repaired_steps,
        })
    }

    /// Persisted caches keep YES steps only; this brings the others back.
    pub fn repair_missing_steps(&mut self) -> Result<usize, AssignmentError> {
        let tree = self.tree;
        let mut identifiers: Vec<String> = self
            .cache
            .property_identifiers()
            .into_iter()
            .map(|id| id.to_string())
            .collect();
        identifiers.sort();
        let mut repaired = 0;
        for id in &identifiers {
            let Some(idx) = tree.index_of(id) else {
                warn!("Skipping step repair for '{id}', it is not part of the catalog");
                continue;
            };
            let property = tree.at(idx);
            for step in &property.steps {
                if self.cache.get_step(&property.id, step.number).is_none() {
                    self.evaluate_step(property, step)?;
                    repaired += 1;
                }
            }
        }
        Ok(repaired)
    }

    fn chain_ids(&self) -> Vec<String> {
        self.in_progress
            .iter()
            .map(|&idx| self.tree.at(idx).id.clone())
            .collect()
    }

    fn evaluate_property(&mut self, idx: PropertyIndex) -> Result<Verdict, AssignmentError> {
        let tree = self.tree;
        let property = tree.at(idx);
        if let Some(verdict) = self.cache.get_property(&property.id) {
            self.stats.property_cache_hits += 1;
            return Ok(verdict);
        }
        if self.in_progress.contains(&idx) {
            return Err(AssignmentError::CyclicReference {
                property: property.id.clone(),
                chain: self.chain_ids(),
            });
        }
        if self.in_progress.len() >= self.max_recursion_depth {
            return Err(AssignmentError::RecursionLimit {
                property: property.id.clone(),
                limit: self.max_recursion_depth,
                chain: self.chain_ids(),
            });
        }

        self.in_progress.push(idx);
        let result = self.aggregate_steps(property);
        self.in_progress.pop();
        let verdict = result?;

        self.cache.cache_property(&property.id, verdict);
        self.stats.property_evaluations += 1;
        Ok(verdict)
    }

    fn aggregate_steps(&mut self, property: &'a GenomeProperty) -> Result<Verdict, AssignmentError> {
        let mut all = Vec::with_capacity(property.steps.len());
        let mut required = vec![];
        for step in &property.steps {
            let verdict = self.evaluate_step(property, step)?;
            if step.required() {
                required.push(verdict);
            }
            all.push(verdict);
        }
        if required.is_empty() {
            Ok(all_children_unanimous(&all))
        } else {
            Ok(required_steps_with_threshold(&required, property.threshold))
        }
    }

    fn evaluate_step(
        &mut self,
        property: &'a GenomeProperty,
        step: &'a Step,
    ) -> Result<Verdict, AssignmentError> {
        if let Some(verdict) = self.cache.get_step(&property.id, step.number) {
            self.stats.step_cache_hits += 1;
            return Ok(verdict);
        }
        let verdict = if step.lacks_evidence() {
            Verdict::No
        } else {
            let mut element_verdicts = Vec::with_capacity(step.functional_elements.len());
            for element in &step.functional_elements {
                element_verdicts.push(self.evaluate_element(property, element)?);
            }
            sufficient_evidence(&element_verdicts, true)
        };
        self.cache.cache_step(&property.id, step.number, verdict);
        self.stats.step_evaluations += 1;
        Ok(verdict)
    }

    /// Sufficient evidence, when present, decides alone.
    fn evaluate_element(
        &mut self,
        property: &'a GenomeProperty,
        element: &'a FunctionalElement,
    ) -> Result<Verdict, AssignmentError> {
        let mut all = Vec::with_capacity(element.evidence.len());
        let mut sufficient = vec![];
        for evidence in &element.evidence {
            let verdict = self.evaluate_evidence(property, evidence)?;
            if evidence.sufficient {
                sufficient.push(verdict);
            }
            all.push(verdict);
        }
        if sufficient.is_empty() {
            Ok(all_children_unanimous(&all))
        } else {
            Ok(sufficient_evidence(&sufficient, true))
        }
    }

    fn evaluate_evidence(
        &mut self,
        property: &'a GenomeProperty,
        evidence: &'a Evidence,
    ) -> Result<Verdict, AssignmentError> {
        if !evidence.has_property_reference() {
            return Ok(if evidence.matches_any(self.cache.matched_signatures()) {
                Verdict::Yes
            } else {
                Verdict::No
            });
        }
        let tree = self.tree;
        match evidence.property_references().find_map(|id| tree.index_of(id)) {
            Some(child) => self.evaluate_property(child),
            None => Err(AssignmentError::UnresolvableReference {
                property: property.id.clone(),
                evidence_property: evidence
                    .property_references()
                    .next()
                    .unwrap_or_default()
                    .to_string(),
            }),
        }
    }
}

pub fn evaluate(
    tree: &GenomePropertiesTree,
    cache: &mut AssignmentCache,
    property_id: Option<&str>,
) -> Result<Verdict, AssignmentError> {
    Assigner::new(tree, cache).evaluate(property_id)
}

pub fn bootstrap_assignments(
    tree: &GenomePropertiesTree,
    cache: &mut AssignmentCache,
    settings: &AssignmentSettings,
) -> Result<BootstrapSummary, AssignmentError> {
    Assigner::with_settings(tree, cache, settings).bootstrap()
}

pub fn repair_missing_steps(
    tree: &GenomePropertiesTree,
    cache: &mut AssignmentCache,
) -> Result<usize, AssignmentError> {
    Assigner::new(tree, cache).repair_missing_steps()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(required: bool, evidence: Vec<Evidence>) -> FunctionalElement {
        FunctionalElement::new("element", None, required, evidence)
    }

    /// A step with one element backed by one sufficient evidence line.
    fn step(number: u32, required: bool, identifiers: &[&str]) -> Step {
        Step::new(
            number,
            vec![element(required, vec![Evidence::new(identifiers, &[], true)])],
        )
    }

    fn property(id: &str, threshold: usize, steps: Vec<Step>) -> GenomeProperty {
        GenomeProperty::new(id, id, "METAPATH", threshold, steps)
    }

    fn signatures(ids: &[&str]) -> AssignmentCache {
        AssignmentCache::with_signatures(Some("sample"), ids.iter().copied())
    }

    #[test]
    fn test_evidence_resolution_by_signature() {
        let tree = GenomePropertiesTree::new(vec![property(
            "GenProp0001",
            0,
            vec![step(1, true, &["IPR017545", "TIGR03114"])],
        )]);
        let mut cache = signatures(&["TIGR03114"]);
        assert_eq!(evaluate(&tree, &mut cache, None), Ok(Verdict::Yes));
        assert_eq!(cache.get_step("GenProp0001", 1), Some(Verdict::Yes));

        let mut cache = signatures(&["TIGR00001"]);
        assert_eq!(evaluate(&tree, &mut cache, None), Ok(Verdict::No));
        assert_eq!(cache.get_step("GenProp0001", 1), Some(Verdict::No));
    }

    #[test]
    fn test_partial_from_one_of_three_required_steps() {
        let tree = GenomePropertiesTree::new(vec![property(
            "GenProp0053",
            0,
            vec![
                step(1, true, &["TIGR02517"]),
                step(2, true, &["TIGR02519"]),
                step(3, true, &["TIGR02120"]),
            ],
        )]);
        let mut cache = signatures(&["TIGR02519"]);
        assert_eq!(evaluate(&tree, &mut cache, None), Ok(Verdict::Partial));
        assert_eq!(
            cache.step_rows(),
            [
                ("GenProp0053", 1, Verdict::No),
                ("GenProp0053", 2, Verdict::Yes),
                ("GenProp0053", 3, Verdict::No),
            ]
        );
    }

    #[test]
    fn test_threshold_turns_partial_into_no() {
        let tree = GenomePropertiesTree::new(vec![property(
            "GenProp0053",
            1,
            vec![
                step(1, true, &["TIGR02517"]),
                step(2, true, &["TIGR02519"]),
                step(3, true, &["TIGR02120"]),
            ],
        )]);
        let mut cache = signatures(&["TIGR02519"]);
        assert_eq!(evaluate(&tree, &mut cache, None), Ok(Verdict::No));
    }

    #[test]
    fn test_recursive_child_resolution() {
        let tree = GenomePropertiesTree::new(vec![
            property("GenProp0002", 0, vec![step(1, false, &["GenProp0066"])]),
            property("GenProp0066", 0, vec![step(1, true, &["TIGR03564"])]),
        ]);
        let mut cache = signatures(&["TIGR03564"]);
        let mut assigner = Assigner::new(&tree, &mut cache);
        assert_eq!(assigner.evaluate(None), Ok(Verdict::Yes));
        assert_eq!(assigner.stats().property_evaluations, 2);

        assert_eq!(assigner.evaluate(None), Ok(Verdict::Yes));
        let stats = assigner.stats();
        assert_eq!(stats.property_evaluations, 2);
        assert_eq!(stats.property_cache_hits, 1);
        assert_eq!(cache.get_property("GenProp0066"), Some(Verdict::Yes));
        assert_eq!(cache.property_count(), 2);
    }

    #[test]
    fn test_shared_child_evaluated_once() {
        let tree = GenomePropertiesTree::new(vec![
            property(
                "GenProp0001",
                0,
                vec![step(1, false, &["GenProp0002"]), step(2, false, &["GenProp0003"])],
            ),
            property("GenProp0002", 0, vec![step(1, false, &["GenProp0004"])]),
            property("GenProp0003", 0, vec![step(1, false, &["GenProp0004"])]),
            property("GenProp0004", 0, vec![step(1, true, &["PF00296"])]),
        ]);
        let mut cache = signatures(&[]);
        let mut assigner = Assigner::new(&tree, &mut cache);
        assert_eq!(assigner.evaluate(None), Ok(Verdict::No));
        let stats = assigner.stats();
        assert_eq!(stats.property_evaluations, 4);
        assert_eq!(stats.property_cache_hits, 1);
    }

    #[test]
    fn test_preseeded_leaf_is_not_recomputed() {
        let tree = GenomePropertiesTree::new(vec![
            property("GenProp0002", 0, vec![step(1, false, &["GenProp0066"])]),
            property("GenProp0066", 0, vec![step(1, true, &["TIGR03564"])]),
        ]);
        let mut cache = AssignmentCache::new(Some("longform"));
        cache.cache_property("GenProp0066", Verdict::Partial);
        let mut assigner = Assigner::new(&tree, &mut cache);
        assert_eq!(assigner.evaluate(None), Ok(Verdict::Yes));
        assert_eq!(assigner.stats().property_evaluations, 1);
        assert_eq!(cache.get_property("GenProp0066"), Some(Verdict::Partial));
        assert_eq!(cache.get_step("GenProp0066", 1), None);
    }

    #[test]
    fn test_preseeded_step_is_used() {
        let tree = GenomePropertiesTree::new(vec![property(
            "GenProp0001",
            0,
            vec![step(1, true, &["TIGR00001"]), step(2, true, &["TIGR00002"])],
        )]);
        let mut cache = AssignmentCache::default();
        cache.cache_step("GenProp0001", 1, Verdict::Yes);
        cache.cache_step("GenProp0001", 2, Verdict::Yes);
        assert_eq!(evaluate(&tree, &mut cache, None), Ok(Verdict::Yes));
    }

    #[test]
    fn test_step_without_evidence_is_no() {
        let tree = GenomePropertiesTree::new(vec![property(
            "GenProp0001",
            0,
            vec![
                Step::new(1, vec![element(true, vec![])]),
                step(2, true, &["TIGR00002"]),
            ],
        )]);
        let mut cache = signatures(&["TIGR00002"]);
        assert_eq!(evaluate(&tree, &mut cache, None), Ok(Verdict::Partial));
        assert_eq!(cache.get_step("GenProp0001", 1), Some(Verdict::No));
    }

    #[test]
    fn test_property_without_steps_is_no() {
        let tree = GenomePropertiesTree::new(vec![property("GenProp0001", 0, vec![])]);
        let mut cache = AssignmentCache::default();
        assert_eq!(evaluate(&tree, &mut cache, None), Ok(Verdict::No));
    }

    #[test]
    fn test_category_without_required_steps() {
        let tree = GenomePropertiesTree::new(vec![property(
            "GenProp0001",
            0,
            vec![step(1, false, &["TIGR00001"]), step(2, false, &["TIGR00002"])],
        )]);
        let mut cache = signatures(&["TIGR00001"]);
        assert_eq!(evaluate(&tree, &mut cache, None), Ok(Verdict::Partial));
        let mut cache = signatures(&["TIGR00001", "TIGR00002"]);
        assert_eq!(evaluate(&tree, &mut cache, None), Ok(Verdict::Yes));
    }

    #[test]
    fn test_sufficient_evidence_overrides_other_evidence() {
        let mixed = Step::new(
            1,
            vec![element(
                true,
                vec![
                    Evidence::new(&["TIGR00001"], &[], true),
                    Evidence::new(&["PF00002"], &[], false),
                ],
            )],
        );
        let tree = GenomePropertiesTree::new(vec![property("GenProp0001", 0, vec![mixed])]);
        let mut cache = signatures(&["PF00002"]);
        assert_eq!(evaluate(&tree, &mut cache, None), Ok(Verdict::No));
        let mut cache = signatures(&["TIGR00001"]);
        assert_eq!(evaluate(&tree, &mut cache, None), Ok(Verdict::Yes));
    }

    #[test]
    fn test_non_sufficient_evidence_uses_all_children() {
        let loose = Step::new(
            1,
            vec![element(
                true,
                vec![
                    Evidence::new(&["TIGR00001"], &[], false),
                    Evidence::new(&["PF00002"], &[], false),
                ],
            )],
        );
        let tree = GenomePropertiesTree::new(vec![property("GenProp0001", 0, vec![loose])]);
        // One of two evidence lines matched: the element is PARTIAL, which
        // still satisfies the step.
        let mut cache = signatures(&["PF00002"]);
        assert_eq!(evaluate(&tree, &mut cache, None), Ok(Verdict::Yes));
        let mut cache = signatures(&[]);
        assert_eq!(evaluate(&tree, &mut cache, None), Ok(Verdict::No));
    }

    #[test]
    fn test_first_resolvable_reference_is_used() {
        let tree = GenomePropertiesTree::new(vec![
            property(
                "GenProp0001",
                0,
                vec![step(1, true, &["GenProp9999", "GenProp0002"])],
            ),
            property("GenProp0002", 0, vec![step(1, true, &["TIGR00002"])]),
        ]);
        let mut cache = signatures(&["TIGR00002"]);
        assert_eq!(evaluate(&tree, &mut cache, None), Ok(Verdict::Yes));
    }

    #[test]
    fn test_unresolvable_reference() {
        let tree = GenomePropertiesTree::new(vec![property(
            "GenProp0001",
            0,
            vec![step(1, true, &["GenProp9999"])],
        )]);
        let mut cache = AssignmentCache::default();
        assert_eq!(
            evaluate(&tree, &mut cache, None),
            Err(AssignmentError::UnresolvableReference {
                property: "GenProp0001".to_string(),
                evidence_property: "GenProp9999".to_string(),
            })
        );
        assert_eq!(cache.get_property("GenProp0001"), None);
    }

    #[test]
    fn test_cycle_detected() {
        let tree = GenomePropertiesTree::new(vec![
            property("GenProp0001", 0, vec![step(1, true, &["GenProp0002"])]),
            property("GenProp0002", 0, vec![step(1, true, &["GenProp0003"])]),
            property("GenProp0003", 0, vec![step(1, true, &["GenProp0002"])]),
        ]);
        let mut cache = AssignmentCache::default();
        let err = evaluate(&tree, &mut cache, Some("GenProp0001")).unwrap_err();
        assert_eq!(
            err,
            AssignmentError::CyclicReference {
                property: "GenProp0002".to_string(),
                chain: vec![
                    "GenProp0001".to_string(),
                    "GenProp0002".to_string(),
                    "GenProp0003".to_string(),
                ],
            }
        );
        assert!(err.to_string().contains("GenProp0001 -> GenProp0002 -> GenProp0003"));
        assert_eq!(cache.property_count(), 0);
    }

    #[test]
    fn test_recursion_limit() {
        let tree = GenomePropertiesTree::new(vec![
            property("GenProp0001", 0, vec![step(1, true, &["GenProp0002"])]),
            property("GenProp0002", 0, vec![step(1, true, &["GenProp0003"])]),
            property("GenProp0003", 0, vec![step(1, true, &["TIGR00003"])]),
        ]);
        let settings = AssignmentSettings {
            max_recursion_depth: 2,
            ..Default::default()
        };
        let mut cache = AssignmentCache::default();
        let err = Assigner::with_settings(&tree, &mut cache, &settings)
            .evaluate(None)
            .unwrap_err();
        assert!(matches!(
            err,
            AssignmentError::RecursionLimit { ref property, limit: 2, .. } if property == "GenProp0003"
        ));
    }

    #[test]
    fn test_unknown_target_and_empty_catalog() {
        let tree = GenomePropertiesTree::new(vec![property("GenProp0001", 0, vec![])]);
        let mut cache = AssignmentCache::default();
        assert_eq!(
            evaluate(&tree, &mut cache, Some("GenProp0404")),
            Err(AssignmentError::UnknownProperty("GenProp0404".to_string()))
        );
        let empty = GenomePropertiesTree::default();
        assert_eq!(
            evaluate(&empty, &mut cache, None),
            Err(AssignmentError::EmptyCatalog)
        );
    }

    #[test]
    fn test_repair_restores_missing_steps() {
        let tree = GenomePropertiesTree::new(vec![property(
            "GenProp0001",
            0,
            vec![step(1, true, &["TIGR00001"]), step(2, true, &["TIGR00002"])],
        )]);
        // Persisted caches only keep YES steps.
        let mut cache = signatures(&["TIGR00001"]);
        cache.cache_property("GenProp0001", Verdict::Partial);
        cache.cache_step("GenProp0001", 1, Verdict::Yes);
        let mut assigner = Assigner::new(&tree, &mut cache);
        assert_eq!(assigner.repair_missing_steps(), Ok(1));
        assert_eq!(assigner.stats().property_evaluations, 0);
        assert_eq!(cache.get_step("GenProp0001", 2), Some(Verdict::No));
    }

    #[test]
    fn test_repair_fills_properties_without_steps() {
        let tree = GenomePropertiesTree::new(vec![property(
            "GenProp0001",
            0,
            vec![step(1, true, &["TIGR00001"]), step(2, true, &["TIGR00002"])],
        )]);
        let mut cache = signatures(&["TIGR00001", "TIGR00002"]);
        cache.cache_property("GenProp0001", Verdict::Yes);
        cache.cache_property("GenProp0404", Verdict::Yes);
        assert_eq!(repair_missing_steps(&tree, &mut cache), Ok(2));
        assert!(cache.unsynchronized_identifiers().contains("GenProp0404"));
        assert_eq!(cache.get_step("GenProp0001", 2), Some(Verdict::Yes));
    }

    #[test]
    fn test_bootstrap_synchronizes_then_evaluates() {
        let tree = GenomePropertiesTree::new(vec![
            property("GenProp0002", 0, vec![step(1, false, &["GenProp0066"])]),
            property("GenProp0066", 0, vec![step(1, true, &["TIGR03564"])]),
        ]);
        let mut cache = signatures(&["TIGR03564"]);
        cache.cache_property("GenProp0404", Verdict::No);
        cache.cache_step("GenProp0404", 1, Verdict::No);
        let summary = bootstrap_assignments(&tree, &mut cache, &AssignmentSettings::default()).unwrap();
        assert_eq!(summary.flushed, ["GenProp0404"]);
        assert_eq!(summary.root_verdict, Some(Verdict::Yes));
        assert_eq!(summary.repaired_steps, 0);
        assert_eq!(cache.property_count(), 2);
        assert_eq!(cache.step_count(), 2);
    }
}

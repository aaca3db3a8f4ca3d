use crate::functional_element::FunctionalElement;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

pub type StepNumber = u32;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub number: StepNumber,
    pub functional_elements: Vec<FunctionalElement>,
}

impl Step {
    pub fn new(number: StepNumber, functional_elements: Vec<FunctionalElement>) -> Self {
        Self {
            number,
            functional_elements,
        }
    }

    pub fn name(&self) -> String {
        self.functional_elements.iter().map(|e| e.name.as_str()).join(" ")
    }

    pub fn required(&self) -> bool {
        self.functional_elements.iter().any(|e| e.required)
    }

    pub fn lacks_evidence(&self) -> bool {
        !self.functional_elements.iter().any(|e| e.has_evidence())
    }

    pub fn property_references(&self) -> Vec<&str> {
        self.functional_elements
            .iter()
            .flat_map(|e| e.evidence.iter())
            .flat_map(|ev| ev.property_references())
            .collect()
    }

    pub fn interpro_identifiers(&self) -> Vec<&str> {
        self.functional_elements
            .iter()
            .flat_map(|e| e.evidence.iter())
            .flat_map(|ev| ev.interpro_identifiers())
            .collect()
    }

    pub fn consortium_identifiers(&self) -> Vec<&str> {
        self.functional_elements
            .iter()
            .flat_map(|e| e.evidence.iter())
            .flat_map(|ev| ev.consortium_identifiers())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::Evidence;

    fn step() -> Step {
        Step::new(
            3,
            vec![
                FunctionalElement::new(
                    "LuxA",
                    Some("Luciferase alpha"),
                    true,
                    vec![Evidence::new(&["IPR011251", "PF00296"], &[], true)],
                ),
                FunctionalElement::new(
                    "LuxB",
                    Some("Luciferase beta"),
                    false,
                    vec![Evidence::new(&["GenProp0120"], &[], false)],
                ),
            ],
        )
    }

    #[test]
    fn test_name_and_required() {
        let step = step();
        assert_eq!(step.name(), "Luciferase alpha Luciferase beta");
        assert!(step.required());
        assert!(!step.lacks_evidence());
    }

    #[test]
    fn test_identifier_collections() {
        let step = step();
        assert_eq!(step.property_references(), ["GenProp0120"]);
        assert_eq!(step.interpro_identifiers(), ["IPR011251"]);
        assert_eq!(step.consortium_identifiers(), ["PF00296"]);
    }

    #[test]
    fn test_empty_step() {
        let step = Step::new(1, vec![FunctionalElement::new("x", None, false, vec![])]);
        assert!(step.lacks_evidence());
        assert!(!step.required());
    }
}

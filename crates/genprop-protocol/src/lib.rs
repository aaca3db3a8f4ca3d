use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Yes,
    Partial,
    No,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "YES",
            Self::Partial => "PARTIAL",
            Self::No => "NO",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        let norm = text.trim().to_ascii_uppercase();
        match norm.as_str() {
            "YES" => Some(Self::Yes),
            "PARTIAL" => Some(Self::Partial),
            "NO" => Some(Self::No),
            _ => None,
        }
    }

    /// Compact code used by the persisted assignment layout.
    pub fn numeric(self) -> u8 {
        match self {
            Self::Yes => 0,
            Self::Partial => 1,
            Self::No => 2,
        }
    }

    pub fn from_numeric(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Yes),
            1 => Some(Self::Partial),
            2 => Some(Self::No),
            _ => None,
        }
    }

    pub fn is_yes(self) -> bool {
        self == Self::Yes
    }

    pub fn is_no(self) -> bool {
        self == Self::No
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<u8> for Verdict {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_numeric(value).ok_or_else(|| format!("Unknown verdict code {value}"))
    }
}

impl FromStr for Verdict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("Unknown verdict '{s}'"))
    }
}

/// Rule A: required steps against a threshold.
///
/// All YES gives YES, more YES than `threshold` gives PARTIAL, anything else
/// NO. PARTIAL inputs are not YES and count like NO here.
pub fn required_steps_with_threshold(verdicts: &[Verdict], threshold: usize) -> Verdict {
    let yes_count = verdicts.iter().filter(|v| v.is_yes()).count();
    if yes_count == verdicts.len() {
        Verdict::Yes
    } else if yes_count > threshold {
        Verdict::Partial
    } else {
        Verdict::No
    }
}

/// Rule B: unanimous children.
///
/// An empty input is NO.
pub fn all_children_unanimous(verdicts: &[Verdict]) -> Verdict {
    if verdicts.is_empty() {
        return Verdict::No;
    }
    if verdicts.iter().all(|v| v.is_yes()) {
        Verdict::Yes
    } else if verdicts.iter().all(|v| v.is_no()) {
        Verdict::No
    } else {
        Verdict::Partial
    }
}

/// Rule C: binary verdict for steps and functional elements.
///
/// With `sufficient_scheme` a single non-NO input is enough for YES. Without
/// it every input has to be non-NO.
pub fn sufficient_evidence(verdicts: &[Verdict], sufficient_scheme: bool) -> Verdict {
    let no_count = verdicts.iter().filter(|v| v.is_no()).count();
    let success = if sufficient_scheme {
        no_count < verdicts.len()
    } else {
        no_count == 0
    };
    if success { Verdict::Yes } else { Verdict::No }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Verdict::{No, Partial, Yes};

    #[test]
    fn test_required_steps_all_yes() {
        assert_eq!(required_steps_with_threshold(&[Yes, Yes, Yes], 0), Yes);
        assert_eq!(required_steps_with_threshold(&[Yes, Yes, Yes], 5), Yes);
    }

    #[test]
    fn test_required_steps_threshold() {
        assert_eq!(required_steps_with_threshold(&[Yes, Yes, No], 1), Partial);
        assert_eq!(required_steps_with_threshold(&[Yes, Yes, No], 2), No);
        assert_eq!(required_steps_with_threshold(&[No, No, No], 0), No);
    }

    #[test]
    fn test_required_steps_partial_is_not_yes() {
        assert_eq!(required_steps_with_threshold(&[Yes, Yes, Partial], 0), Partial);
        assert_eq!(
            required_steps_with_threshold(&[Yes, Partial, Partial], 1),
            No
        );
    }

    #[test]
    fn test_required_steps_totality() {
        for n in 1..6usize {
            for t in 0..6usize {
                assert_eq!(required_steps_with_threshold(&vec![Yes; n], t), Yes);
                assert_eq!(required_steps_with_threshold(&vec![No; n], t), No);
                for yes in 0..n {
                    let mut verdicts = vec![Yes; yes];
                    verdicts.extend(vec![No; n - yes]);
                    let expected = if yes > t { Partial } else { No };
                    assert_eq!(required_steps_with_threshold(&verdicts, t), expected);
                }
            }
        }
    }

    #[test]
    fn test_unanimous() {
        assert_eq!(all_children_unanimous(&[Yes, Yes, Yes]), Yes);
        assert_eq!(all_children_unanimous(&[No, No, No]), No);
        assert_eq!(all_children_unanimous(&[Yes, No, Partial]), Partial);
        assert_eq!(all_children_unanimous(&[Yes, Yes, No]), Partial);
        assert_eq!(all_children_unanimous(&[Partial]), Partial);
    }

    #[test]
    fn test_unanimous_empty_is_no() {
        assert_eq!(all_children_unanimous(&[]), No);
    }

    #[test]
    fn test_sufficient_scheme_difference() {
        assert_eq!(sufficient_evidence(&[No, Partial, Partial], true), Yes);
        assert_eq!(sufficient_evidence(&[No, Partial, Partial], false), No);
        assert_eq!(sufficient_evidence(&[No, No, No], true), No);
        assert_eq!(sufficient_evidence(&[Partial, Partial, Partial], false), Yes);
        assert_eq!(sufficient_evidence(&[Yes, Yes, Yes], false), Yes);
    }

    #[test]
    fn test_sufficient_empty() {
        assert_eq!(sufficient_evidence(&[], true), No);
        assert_eq!(sufficient_evidence(&[], false), Yes);
    }

    #[test]
    fn test_verdict_text() {
        assert_eq!(Verdict::parse(" yes "), Some(Yes));
        assert_eq!("PARTIAL".parse::<Verdict>(), Ok(Partial));
        assert!("maybe".parse::<Verdict>().is_err());
        assert_eq!(No.to_string(), "NO");
        assert_eq!(serde_json::to_string(&Partial).unwrap(), "\"PARTIAL\"");
    }

    #[test]
    fn test_numeric_codes() {
        for v in [Yes, Partial, No] {
            assert_eq!(Verdict::from_numeric(v.numeric()), Some(v));
        }
        assert_eq!(Verdict::from_numeric(9), None);
        assert_eq!(Verdict::try_from(2u8), Ok(No));
        assert!(Verdict::try_from(3u8).is_err());
    }
}

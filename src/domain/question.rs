use serde::{Deserialize, Serialize};

use crate::domain::NOT_APPLICABLE;

/// The four recognized answer formats. Anything else stored in the catalog is
/// a configuration error that scoring reports per question instead of
/// guessing a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionType {
    Scale,
    SingleChoice,
    MultipleChoice,
    Text,
}

impl TryFrom<&str> for QuestionType {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_uppercase().as_str() {
            "SCALE" => Ok(QuestionType::Scale),
            "SINGLE_CHOICE" => Ok(QuestionType::SingleChoice),
            "MULTIPLE_CHOICE" => Ok(QuestionType::MultipleChoice),
            "TEXT" => Ok(QuestionType::Text),
            _ => Err(()),
        }
    }
}

/// Attainment tier of a per-question score on the 0..100 scale.
///
/// Lower bounds are inclusive; only a score of exactly -1 counts as
/// not applicable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    FullyMet,
    MostlyMet,
    PartiallyMet,
    NotMet,
    NotApplicable,
}

impl Tier {
    /// Presentation order of the tier sub-lists in a statistics block.
    pub const ORDERED: [Tier; 5] = [
        Tier::FullyMet,
        Tier::MostlyMet,
        Tier::PartiallyMet,
        Tier::NotMet,
        Tier::NotApplicable,
    ];

    pub fn of(score: f64) -> Tier {
        if score == NOT_APPLICABLE {
            Tier::NotApplicable
        } else if score >= 80.0 {
            Tier::FullyMet
        } else if score >= 60.0 {
            Tier::MostlyMet
        } else if score >= 40.0 {
            Tier::PartiallyMet
        } else {
            Tier::NotMet
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Tier::FullyMet => "Fully met",
            Tier::MostlyMet => "Mostly met",
            Tier::PartiallyMet => "Partially met",
            Tier::NotMet => "Not met",
            Tier::NotApplicable => "Not applicable",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_boundaries_are_inclusive() {
        assert_eq!(Tier::of(100.0), Tier::FullyMet);
        assert_eq!(Tier::of(80.0), Tier::FullyMet);
        assert_eq!(Tier::of(79.999), Tier::MostlyMet);
        assert_eq!(Tier::of(60.0), Tier::MostlyMet);
        assert_eq!(Tier::of(59.999), Tier::PartiallyMet);
        assert_eq!(Tier::of(40.0), Tier::PartiallyMet);
        assert_eq!(Tier::of(39.999), Tier::NotMet);
        assert_eq!(Tier::of(0.0), Tier::NotMet);
    }

    #[test]
    fn test_only_exact_sentinel_is_not_applicable() {
        assert_eq!(Tier::of(-1.0), Tier::NotApplicable);
        // Off-sentinel negatives are broken data, not N/A.
        assert_eq!(Tier::of(-0.5), Tier::NotMet);
    }

    #[test]
    fn test_question_type_parses_storage_keys() {
        assert_eq!(QuestionType::try_from("SCALE"), Ok(QuestionType::Scale));
        assert_eq!(
            QuestionType::try_from("multiple_choice"),
            Ok(QuestionType::MultipleChoice)
        );
        assert!(QuestionType::try_from("RANKING").is_err());
    }
}

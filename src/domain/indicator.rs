use serde::{Deserialize, Serialize};

/// The eleven trustworthy-AI indicators every questionnaire question maps to.
///
/// The set is fixed: questions reference indicators by their storage key
/// (`SCREAMING_SNAKE_CASE`) and scores are keyed by them, so variants sort
/// and serialize deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Indicator {
    Accuracy,
    Reliability,
    Safety,
    Resilience,
    Explainability,
    Autonomy,
    Privacy,
    Security,
    Transparency,
    Accountability,
    Fairness,
}

impl Indicator {
    pub const ALL: [Indicator; 11] = [
        Indicator::Accuracy,
        Indicator::Reliability,
        Indicator::Safety,
        Indicator::Resilience,
        Indicator::Explainability,
        Indicator::Autonomy,
        Indicator::Privacy,
        Indicator::Security,
        Indicator::Transparency,
        Indicator::Accountability,
        Indicator::Fairness,
    ];

    /// Storage key, matching the CHECK constraints in the schema.
    pub fn as_str(&self) -> &'static str {
        match self {
            Indicator::Accuracy => "ACCURACY",
            Indicator::Reliability => "RELIABILITY",
            Indicator::Safety => "SAFETY",
            Indicator::Resilience => "RESILIENCE",
            Indicator::Explainability => "EXPLAINABILITY",
            Indicator::Autonomy => "AUTONOMY",
            Indicator::Privacy => "PRIVACY",
            Indicator::Security => "SECURITY",
            Indicator::Transparency => "TRANSPARENCY",
            Indicator::Accountability => "ACCOUNTABILITY",
            Indicator::Fairness => "FAIRNESS",
        }
    }

    /// Human-readable name used in statistics blocks and fallback narratives.
    pub fn display_name(&self) -> &'static str {
        match self {
            Indicator::Accuracy => "Accuracy",
            Indicator::Reliability => "Reliability",
            Indicator::Safety => "Safety",
            Indicator::Resilience => "Resilience",
            Indicator::Explainability => "Explainability",
            Indicator::Autonomy => "Autonomy",
            Indicator::Privacy => "Privacy",
            Indicator::Security => "Security",
            Indicator::Transparency => "Transparency",
            Indicator::Accountability => "Accountability",
            Indicator::Fairness => "Fairness",
        }
    }
}

impl TryFrom<&str> for Indicator {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_uppercase().as_str() {
            "ACCURACY" => Ok(Indicator::Accuracy),
            "RELIABILITY" => Ok(Indicator::Reliability),
            "SAFETY" => Ok(Indicator::Safety),
            "RESILIENCE" => Ok(Indicator::Resilience),
            "EXPLAINABILITY" => Ok(Indicator::Explainability),
            "AUTONOMY" => Ok(Indicator::Autonomy),
            "PRIVACY" => Ok(Indicator::Privacy),
            "SECURITY" => Ok(Indicator::Security),
            "TRANSPARENCY" => Ok(Indicator::Transparency),
            "ACCOUNTABILITY" => Ok(Indicator::Accountability),
            "FAIRNESS" => Ok(Indicator::Fairness),
            _ => Err(()),
        }
    }
}

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::{round4, Indicator, QuestionType, NOT_APPLICABLE};
use crate::error::AnswerIssue;

/// One answered question as loaded from storage, before normalization.
///
/// `question_type` stays a raw string here so that an unrecognized catalog
/// value surfaces as a per-question issue during normalization instead of
/// failing the whole load.
#[derive(Debug, Clone, Serialize)]
pub struct AnsweredQuestion {
    pub question_id: i64,
    pub indicator: Indicator,
    pub question_type: String,
    pub display_order: i32,
    pub text: String,
    pub value: Option<f64>,
    pub selections: Vec<SelectedOption>,
    pub answer_text: Option<String>,
}

/// An option the respondent picked, with the label kept for statistics text.
#[derive(Debug, Clone, Serialize)]
pub struct SelectedOption {
    pub option_id: i64,
    pub text: String,
    pub value: Option<f64>,
}

/// A question reduced to a single score on the 0..100 scale (or the -1
/// sentinel), plus what the statistics builder needs to render it.
#[derive(Debug, Clone)]
pub struct QuestionScore {
    pub question_id: i64,
    pub indicator: Indicator,
    pub question_type: QuestionType,
    pub display_order: i32,
    pub text: String,
    pub score: f64,
    pub selected_labels: Vec<String>,
}

#[derive(Debug, Default)]
pub struct NormalizedAnswers {
    pub questions: Vec<QuestionScore>,
    pub issues: Vec<AnswerIssue>,
}

/// Collapses raw answers into per-question scores.
///
/// SCALE passes its stored value through, SINGLE_CHOICE passes the chosen
/// option's value through, and an absent value becomes -1. TEXT answers are
/// excluded from scoring entirely. A question whose catalog type is not one
/// of the four recognized kinds is skipped and reported.
pub fn normalize(answers: &[AnsweredQuestion]) -> NormalizedAnswers {
    let mut normalized = NormalizedAnswers::default();

    for answer in answers {
        let question_type = match QuestionType::try_from(answer.question_type.as_str()) {
            Ok(kind) => kind,
            Err(()) => {
                normalized.issues.push(AnswerIssue {
                    question_id: answer.question_id,
                    message: format!("unsupported question type '{}'", answer.question_type),
                });
                continue;
            }
        };

        let score = match question_type {
            QuestionType::Text => continue,
            // A stray option on a SCALE answer is ignored, the typed field wins.
            QuestionType::Scale => answer.value.unwrap_or(NOT_APPLICABLE),
            QuestionType::SingleChoice => answer
                .selections
                .first()
                .and_then(|option| option.value)
                .unwrap_or(NOT_APPLICABLE),
            QuestionType::MultipleChoice => multiple_choice_score(&answer.selections),
        };

        normalized.questions.push(QuestionScore {
            question_id: answer.question_id,
            indicator: answer.indicator,
            question_type,
            display_order: answer.display_order,
            text: answer.text.clone(),
            score,
            selected_labels: answer
                .selections
                .iter()
                .map(|option| option.text.clone())
                .collect(),
        });
    }

    normalized
}

/// Best-selected-option rule: any option worth 100 decides the question,
/// otherwise the highest countable option wins, and a selection made up of
/// nothing but -1 options (or no selection at all) stays -1.
fn multiple_choice_score(selections: &[SelectedOption]) -> f64 {
    let mut best = NOT_APPLICABLE;
    for option in selections {
        let value = option.value.unwrap_or(NOT_APPLICABLE);
        if value == NOT_APPLICABLE {
            continue;
        }
        if value == 100.0 {
            return 100.0;
        }
        if value > best {
            best = value;
        }
    }
    best
}

/// Averages per-question scores into one score per indicator on the 0..1
/// scale, rounded to four decimals. Sentinel questions shrink the divisor
/// instead of dragging the average down; an indicator with nothing countable
/// left is itself -1.
pub fn aggregate(questions: &[QuestionScore]) -> BTreeMap<Indicator, f64> {
    let mut grouped: BTreeMap<Indicator, Vec<f64>> = BTreeMap::new();
    for question in questions {
        grouped
            .entry(question.indicator)
            .or_default()
            .push(question.score);
    }

    let mut scores = BTreeMap::new();
    for (indicator, values) in grouped {
        let mut divisor = values.len() as f64;
        let mut sum = 0.0;
        for value in values {
            if value == NOT_APPLICABLE {
                divisor -= 1.0;
            } else {
                sum += value / 100.0;
            }
        }
        let score = if divisor <= 0.0 {
            NOT_APPLICABLE
        } else {
            round4(sum / divisor)
        };
        scores.insert(indicator, score);
    }
    scores
}

use std::collections::BTreeMap;

use crate::domain::scoring::QuestionScore;
use crate::domain::{Indicator, QuestionType, Tier};

/// Builds one human-readable Markdown block per indicator, bucketing each
/// scored question into its attainment tier.
///
/// The header counts countable questions against the total, tiers appear in
/// fixed order with empty tiers omitted, and entries within a tier follow the
/// questionnaire's display order. Multiple-choice entries carry the labels of
/// every selected option.
pub fn build_question_stats(questions: &[QuestionScore]) -> BTreeMap<Indicator, String> {
    let mut grouped: BTreeMap<Indicator, Vec<&QuestionScore>> = BTreeMap::new();
    for question in questions {
        grouped.entry(question.indicator).or_default().push(question);
    }

    grouped
        .into_iter()
        .map(|(indicator, items)| (indicator, indicator_block(indicator, &items)))
        .collect()
}

fn indicator_block(indicator: Indicator, items: &[&QuestionScore]) -> String {
    let total = items.len();
    let not_applicable = items
        .iter()
        .filter(|q| Tier::of(q.score) == Tier::NotApplicable)
        .count();
    let counted = total - not_applicable;

    let mut lines = vec![
        format!(
            "**{} - answer summary** (counted {}/{} questions)",
            indicator.display_name(),
            counted,
            total
        ),
        String::new(),
    ];

    for tier in Tier::ORDERED {
        let mut members: Vec<&&QuestionScore> = items
            .iter()
            .filter(|q| Tier::of(q.score) == tier)
            .collect();
        if members.is_empty() {
            continue;
        }
        members.sort_by_key(|q| q.display_order);

        lines.push(format!("**{} ({})**", tier.label(), members.len()));
        for question in members {
            lines.push(format!(
                "- Q{}. {}",
                question.display_order,
                entry_text(question)
            ));
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

fn entry_text(question: &QuestionScore) -> String {
    if question.question_type == QuestionType::MultipleChoice
        && !question.selected_labels.is_empty()
    {
        let tags: String = question
            .selected_labels
            .iter()
            .map(|label| format!(" [{label}]"))
            .collect();
        format!("{}{}", question.text, tags)
    } else {
        question.text.clone()
    }
}

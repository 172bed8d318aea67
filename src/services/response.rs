use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{self, NewAnswerRow, QuestionDefinition, ResponseBundle};
use crate::domain::{QuestionType, NOT_APPLICABLE};
use crate::error::{AnswerIssue, ServiceError};

/// One submitted answer. Which fields may be set is decided by the question's
/// type, and getting that wrong is a validation issue, not a guess.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitAnswer {
    pub question_id: i64,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub option_id: Option<i64>,
    #[serde(default)]
    pub option_ids: Option<Vec<i64>>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    pub user_id: Uuid,
    pub version_id: i64,
    #[serde(default)]
    pub project_id: Option<i64>,
    pub answers: Vec<SubmitAnswer>,
}

/// Validates and stores a new response. Every answer is checked against the
/// questionnaire version's catalog and all problems come back together.
pub async fn submit(pool: &PgPool, payload: SubmitResponse) -> Result<ResponseBundle, ServiceError> {
    if payload.answers.is_empty() {
        return Err(ServiceError::BadRequest(
            "answers must not be empty".to_string(),
        ));
    }
    if let Some(project_id) = payload.project_id {
        if db::get_project(pool, project_id).await?.is_none() {
            return Err(ServiceError::NotFound("project"));
        }
    }
    let questions = db::version_questions(pool, payload.version_id)
        .await?
        .ok_or(ServiceError::NotFound("questionnaire version"))?;

    let (rows, issues) = validate_answers(&questions, &payload.answers);
    if !issues.is_empty() {
        return Err(ServiceError::Validation(issues));
    }

    let response_id = db::insert_response(
        pool,
        payload.user_id,
        payload.version_id,
        payload.project_id,
        &rows,
    )
    .await?;
    db::get_response_bundle(pool, response_id)
        .await?
        .ok_or(ServiceError::NotFound("response"))
}

/// Replaces a response's answers wholesale after validating them against the
/// same questionnaire version the response was submitted for.
pub async fn update(
    pool: &PgPool,
    response_id: i64,
    answers: Vec<SubmitAnswer>,
) -> Result<ResponseBundle, ServiceError> {
    if answers.is_empty() {
        return Err(ServiceError::BadRequest(
            "answers must not be empty".to_string(),
        ));
    }
    let head = db::get_response_head(pool, response_id)
        .await?
        .ok_or(ServiceError::NotFound("response"))?;
    let version_id = head.version_id.ok_or_else(|| {
        ServiceError::BadRequest("response is not linked to a questionnaire version".to_string())
    })?;
    let questions = db::version_questions(pool, version_id)
        .await?
        .ok_or(ServiceError::NotFound("questionnaire version"))?;

    let (rows, issues) = validate_answers(&questions, &answers);
    if !issues.is_empty() {
        return Err(ServiceError::Validation(issues));
    }

    db::replace_answers(pool, response_id, &rows).await?;
    db::get_response_bundle(pool, response_id)
        .await?
        .ok_or(ServiceError::NotFound("response"))
}

/// Checks every submitted answer against the catalog and builds the rows to
/// store. Issues are collected, never short-circuited, so the client learns
/// about all of them at once.
pub fn validate_answers(
    questions: &[QuestionDefinition],
    answers: &[SubmitAnswer],
) -> (Vec<NewAnswerRow>, Vec<AnswerIssue>) {
    let catalog: HashMap<i64, &QuestionDefinition> =
        questions.iter().map(|q| (q.id, q)).collect();
    let mut rows = Vec::new();
    let mut issues = Vec::new();
    let mut answered: HashSet<i64> = HashSet::new();

    for answer in answers {
        let Some(question) = catalog.get(&answer.question_id) else {
            issues.push(issue(
                answer.question_id,
                "question does not belong to this questionnaire version",
            ));
            continue;
        };
        if !answered.insert(answer.question_id) {
            issues.push(issue(answer.question_id, "question was answered more than once"));
            continue;
        }
        let Ok(kind) = QuestionType::try_from(question.qtype.as_str()) else {
            issues.push(issue(
                question.id,
                format!("unsupported question type '{}'", question.qtype),
            ));
            continue;
        };

        match kind {
            QuestionType::Scale => {
                if answer.option_id.is_some() || answer.option_ids.is_some() {
                    issues.push(issue(question.id, "a SCALE answer cannot reference options"));
                    continue;
                }
                match answer.value {
                    Some(value) if value == NOT_APPLICABLE || (0.0..=100.0).contains(&value) => {
                        rows.push(NewAnswerRow {
                            question_id: question.id,
                            value: Some(value),
                            option_id: None,
                            text: None,
                        });
                    }
                    Some(_) => {
                        issues.push(issue(question.id, "value must be -1 or between 0 and 100"));
                    }
                    None => {
                        issues.push(issue(question.id, "a numeric value is required"));
                    }
                }
            }
            QuestionType::SingleChoice => {
                if answer.value.is_some() {
                    issues.push(issue(
                        question.id,
                        "a SINGLE_CHOICE answer cannot carry a numeric value",
                    ));
                    continue;
                }
                if answer.option_ids.is_some() {
                    issues.push(issue(
                        question.id,
                        "a SINGLE_CHOICE answer takes option_id, not option_ids",
                    ));
                    continue;
                }
                let Some(option_id) = answer.option_id else {
                    issues.push(issue(question.id, "an option must be chosen"));
                    continue;
                };
                if !question.options.iter().any(|o| o.id == option_id) {
                    issues.push(issue(
                        question.id,
                        "chosen option does not belong to this question",
                    ));
                    continue;
                }
                rows.push(NewAnswerRow {
                    question_id: question.id,
                    value: None,
                    option_id: Some(option_id),
                    text: None,
                });
            }
            QuestionType::MultipleChoice => {
                if answer.value.is_some() || answer.option_id.is_some() {
                    issues.push(issue(
                        question.id,
                        "a MULTIPLE_CHOICE answer takes option_ids only",
                    ));
                    continue;
                }
                let Some(option_ids) = answer.option_ids.as_ref().filter(|ids| !ids.is_empty())
                else {
                    issues.push(issue(question.id, "at least one option must be chosen"));
                    continue;
                };
                let mut seen = HashSet::new();
                let mut valid = true;
                for option_id in option_ids {
                    if !seen.insert(*option_id) {
                        issues.push(issue(question.id, "an option was chosen more than once"));
                        valid = false;
                        break;
                    }
                    if !question.options.iter().any(|o| o.id == *option_id) {
                        issues.push(issue(
                            question.id,
                            "chosen option does not belong to this question",
                        ));
                        valid = false;
                        break;
                    }
                }
                if !valid {
                    continue;
                }
                for option_id in option_ids {
                    rows.push(NewAnswerRow {
                        question_id: question.id,
                        value: None,
                        option_id: Some(*option_id),
                        text: None,
                    });
                }
            }
            QuestionType::Text => {
                if answer.value.is_some() || answer.option_id.is_some() || answer.option_ids.is_some()
                {
                    issues.push(issue(question.id, "a TEXT answer carries only text"));
                    continue;
                }
                match answer.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
                    Some(text) => rows.push(NewAnswerRow {
                        question_id: question.id,
                        value: None,
                        option_id: None,
                        text: Some(text.to_string()),
                    }),
                    None => issues.push(issue(question.id, "text is required")),
                }
            }
        }
    }

    for question in questions {
        if question.required && !answered.contains(&question.id) {
            issues.push(issue(question.id, "required question was not answered"));
        }
    }

    (rows, issues)
}

fn issue(question_id: i64, message: impl Into<String>) -> AnswerIssue {
    AnswerIssue {
        question_id,
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::OptionDefinition;

    fn question(id: i64, qtype: &str, required: bool, option_ids: &[i64]) -> QuestionDefinition {
        QuestionDefinition {
            id,
            indicator: "SAFETY".to_string(),
            qtype: qtype.to_string(),
            text: format!("Question {id}"),
            display_order: id as i32,
            required,
            options: option_ids
                .iter()
                .map(|oid| OptionDefinition {
                    id: *oid,
                    text: format!("Option {oid}"),
                    value: Some(50.0),
                    display_order: *oid as i32,
                })
                .collect(),
        }
    }

    fn answer(question_id: i64) -> SubmitAnswer {
        SubmitAnswer {
            question_id,
            value: None,
            option_id: None,
            option_ids: None,
            text: None,
        }
    }

    #[test]
    fn test_valid_answers_build_storage_rows() {
        let questions = vec![
            question(1, "SCALE", true, &[]),
            question(2, "SINGLE_CHOICE", false, &[21, 22]),
            question(3, "MULTIPLE_CHOICE", false, &[31, 32, 33]),
            question(4, "TEXT", false, &[]),
        ];
        let answers = vec![
            SubmitAnswer {
                value: Some(75.0),
                ..answer(1)
            },
            SubmitAnswer {
                option_id: Some(22),
                ..answer(2)
            },
            SubmitAnswer {
                option_ids: Some(vec![31, 33]),
                ..answer(3)
            },
            SubmitAnswer {
                text: Some("  free text  ".to_string()),
                ..answer(4)
            },
        ];

        let (rows, issues) = validate_answers(&questions, &answers);
        assert!(issues.is_empty(), "unexpected issues: {issues:?}");
        // Multiple choice expands to one row per selected option.
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].value, Some(75.0));
        assert_eq!(rows[1].option_id, Some(22));
        assert_eq!(rows[4].text.as_deref(), Some("free text"));
    }

    #[test]
    fn test_type_field_pairing_is_enforced() {
        let questions = vec![
            question(1, "SCALE", false, &[]),
            question(2, "SINGLE_CHOICE", false, &[21]),
            question(3, "TEXT", false, &[]),
        ];
        let answers = vec![
            SubmitAnswer {
                value: Some(50.0),
                option_id: Some(21),
                ..answer(1)
            },
            SubmitAnswer {
                value: Some(50.0),
                ..answer(2)
            },
            SubmitAnswer {
                value: Some(1.0),
                text: Some("hi".to_string()),
                ..answer(3)
            },
        ];

        let (rows, issues) = validate_answers(&questions, &answers);
        assert!(rows.is_empty());
        assert_eq!(issues.len(), 3);
    }

    #[test]
    fn test_scale_value_range() {
        let questions = vec![question(1, "SCALE", false, &[])];
        let (_, issues) = validate_answers(
            &questions,
            &[SubmitAnswer {
                value: Some(250.0),
                ..answer(1)
            }],
        );
        assert_eq!(issues.len(), 1);

        let (rows, issues) = validate_answers(
            &questions,
            &[SubmitAnswer {
                value: Some(-1.0),
                ..answer(1)
            }],
        );
        assert!(issues.is_empty());
        assert_eq!(rows[0].value, Some(-1.0));
    }

    #[test]
    fn test_foreign_and_duplicate_options_are_rejected() {
        let questions = vec![
            question(1, "SINGLE_CHOICE", false, &[11]),
            question(2, "MULTIPLE_CHOICE", false, &[21, 22]),
        ];
        let answers = vec![
            SubmitAnswer {
                option_id: Some(99),
                ..answer(1)
            },
            SubmitAnswer {
                option_ids: Some(vec![21, 21]),
                ..answer(2)
            },
        ];
        let (rows, issues) = validate_answers(&questions, &answers);
        assert!(rows.is_empty());
        assert_eq!(issues.len(), 2);
    }

    #[test]
    fn test_unknown_question_and_double_answer_are_reported() {
        let questions = vec![question(1, "SCALE", false, &[])];
        let answers = vec![
            SubmitAnswer {
                value: Some(10.0),
                ..answer(1)
            },
            SubmitAnswer {
                value: Some(20.0),
                ..answer(1)
            },
            SubmitAnswer {
                value: Some(30.0),
                ..answer(404)
            },
        ];
        let (_, issues) = validate_answers(&questions, &answers);
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().any(|i| i.question_id == 404));
    }

    #[test]
    fn test_required_questions_must_be_answered() {
        let questions = vec![
            question(1, "SCALE", true, &[]),
            question(2, "SCALE", true, &[]),
        ];
        let answers = vec![SubmitAnswer {
            value: Some(40.0),
            ..answer(1)
        }];
        let (_, issues) = validate_answers(&questions, &answers);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].question_id, 2);
    }

    #[test]
    fn test_all_problems_come_back_together() {
        let questions = vec![
            question(1, "SCALE", true, &[]),
            question(2, "TEXT", true, &[]),
            question(3, "SINGLE_CHOICE", true, &[31]),
        ];
        let answers = vec![
            SubmitAnswer {
                value: Some(900.0),
                ..answer(1)
            },
            SubmitAnswer {
                text: Some("   ".to_string()),
                ..answer(2)
            },
        ];
        let (_, issues) = validate_answers(&questions, &answers);
        // Bad value, blank text, and the unanswered required question.
        assert_eq!(issues.len(), 3);
    }
}

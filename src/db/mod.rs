use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::domain::scoring::{AnsweredQuestion, SelectedOption};
use crate::domain::weights::IndicatorPriority;
use crate::domain::Indicator;
use crate::services::report::{ReportDraft, ReportStore};

// ---------- questionnaire catalog ----------

#[derive(Debug, Clone, Serialize)]
pub struct QuestionDefinition {
    pub id: i64,
    pub indicator: String,
    pub qtype: String,
    pub text: String,
    pub display_order: i32,
    pub required: bool,
    pub options: Vec<OptionDefinition>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptionDefinition {
    pub id: i64,
    pub text: String,
    pub value: Option<f64>,
    pub display_order: i32,
}

#[derive(Debug, Serialize)]
pub struct QuestionnaireVersionDetail {
    pub id: i64,
    pub group_id: i64,
    pub group_name: String,
    pub version_number: i32,
    pub title: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub questions: Vec<QuestionDefinition>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct GroupWithLatest {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub latest_version_id: Option<i64>,
    pub latest_version_number: Option<i32>,
    pub latest_title: Option<String>,
}

/// Groups with their newest active version, for survey pickers.
pub async fn list_groups(pool: &PgPool) -> Result<Vec<GroupWithLatest>> {
    let groups = sqlx::query_as::<_, GroupWithLatest>(
        r#"
        SELECT g.id, g.name, g.description,
               v.id AS latest_version_id,
               v.version_number AS latest_version_number,
               v.title AS latest_title
        FROM questionnaire_groups g
        LEFT JOIN LATERAL (
            SELECT id, version_number, title
            FROM questionnaire_versions
            WHERE group_id = g.id AND is_active
            ORDER BY version_number DESC
            LIMIT 1
        ) v ON TRUE
        ORDER BY g.name
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(groups)
}

#[derive(Debug, FromRow)]
struct QuestionRow {
    id: i64,
    indicator: String,
    qtype: String,
    text: String,
    display_order: i32,
    required: bool,
}

#[derive(Debug, FromRow)]
struct OptionRow {
    id: i64,
    question_id: i64,
    text: String,
    value: Option<f64>,
    display_order: i32,
}

/// The ordered question catalog of one version, or None when the version
/// itself does not exist.
pub async fn version_questions(
    pool: &PgPool,
    version_id: i64,
) -> Result<Option<Vec<QuestionDefinition>>> {
    let exists: Option<i64> =
        sqlx::query_scalar("SELECT id FROM questionnaire_versions WHERE id = $1")
            .bind(version_id)
            .fetch_optional(pool)
            .await?;
    if exists.is_none() {
        return Ok(None);
    }

    let question_rows = sqlx::query_as::<_, QuestionRow>(
        r#"
        SELECT id, indicator, qtype, text, display_order, required
        FROM questions
        WHERE version_id = $1
        ORDER BY display_order, id
        "#,
    )
    .bind(version_id)
    .fetch_all(pool)
    .await?;

    let option_rows = sqlx::query_as::<_, OptionRow>(
        r#"
        SELECT o.id, o.question_id, o.text, o.value, o.display_order
        FROM options o
        JOIN questions q ON q.id = o.question_id
        WHERE q.version_id = $1
        ORDER BY o.display_order, o.id
        "#,
    )
    .bind(version_id)
    .fetch_all(pool)
    .await?;

    let mut options_by_question: HashMap<i64, Vec<OptionDefinition>> = HashMap::new();
    for row in option_rows {
        options_by_question
            .entry(row.question_id)
            .or_default()
            .push(OptionDefinition {
                id: row.id,
                text: row.text,
                value: row.value,
                display_order: row.display_order,
            });
    }

    let questions = question_rows
        .into_iter()
        .map(|row| QuestionDefinition {
            options: options_by_question.remove(&row.id).unwrap_or_default(),
            id: row.id,
            indicator: row.indicator,
            qtype: row.qtype,
            text: row.text,
            display_order: row.display_order,
            required: row.required,
        })
        .collect();
    Ok(Some(questions))
}

pub async fn get_version_detail(
    pool: &PgPool,
    version_id: i64,
) -> Result<Option<QuestionnaireVersionDetail>> {
    let row = sqlx::query(
        r#"
        SELECT v.id, v.group_id, g.name AS group_name, v.version_number,
               v.title, v.description, v.is_active, v.created_at
        FROM questionnaire_versions v
        JOIN questionnaire_groups g ON g.id = v.group_id
        WHERE v.id = $1
        "#,
    )
    .bind(version_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let questions = version_questions(pool, version_id).await?.unwrap_or_default();

    Ok(Some(QuestionnaireVersionDetail {
        id: row.try_get("id")?,
        group_id: row.try_get("group_id")?,
        group_name: row.try_get("group_name")?,
        version_number: row.try_get("version_number")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        questions,
    }))
}

// ---------- responses ----------

#[derive(Debug, FromRow)]
pub struct ResponseHead {
    pub id: i64,
    pub user_id: Uuid,
    pub version_id: Option<i64>,
    pub project_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A response with its answers joined against the question catalog, ready for
/// scoring or serialization.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseBundle {
    pub response_id: i64,
    pub user_id: Uuid,
    pub project_id: Option<i64>,
    pub version_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub answers: Vec<AnsweredQuestion>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct ResponseSummary {
    pub id: i64,
    pub user_id: Uuid,
    pub project_id: Option<i64>,
    pub version_id: Option<i64>,
    pub answer_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One answer row to store. Multiple-choice answers become several rows that
/// share a question_id.
#[derive(Debug, Clone)]
pub struct NewAnswerRow {
    pub question_id: i64,
    pub value: Option<f64>,
    pub option_id: Option<i64>,
    pub text: Option<String>,
}

pub async fn get_response_head(pool: &PgPool, response_id: i64) -> Result<Option<ResponseHead>> {
    let head = sqlx::query_as::<_, ResponseHead>(
        "SELECT id, user_id, version_id, project_id, created_at, updated_at FROM responses WHERE id = $1",
    )
    .bind(response_id)
    .fetch_optional(pool)
    .await?;
    Ok(head)
}

#[derive(Debug, FromRow)]
struct AnswerRow {
    question_id: i64,
    indicator: String,
    qtype: String,
    display_order: i32,
    question_text: String,
    value: Option<f64>,
    answer_text: Option<String>,
    option_id: Option<i64>,
    option_text: Option<String>,
    option_value: Option<f64>,
}

pub async fn get_response_bundle(
    pool: &PgPool,
    response_id: i64,
) -> Result<Option<ResponseBundle>> {
    let Some(head) = get_response_head(pool, response_id).await? else {
        return Ok(None);
    };

    let rows = sqlx::query_as::<_, AnswerRow>(
        r#"
        SELECT a.question_id, q.indicator, q.qtype, q.display_order,
               q.text AS question_text, a.value, a.text AS answer_text,
               o.id AS option_id, o.text AS option_text, o.value AS option_value
        FROM answers a
        JOIN questions q ON q.id = a.question_id
        LEFT JOIN options o ON o.id = a.option_id
        WHERE a.response_id = $1
        ORDER BY q.display_order, a.id
        "#,
    )
    .bind(response_id)
    .fetch_all(pool)
    .await?;

    let mut answers: Vec<AnsweredQuestion> = Vec::new();
    let mut index: HashMap<i64, usize> = HashMap::new();
    for row in rows {
        let position = match index.get(&row.question_id).copied() {
            Some(position) => position,
            None => {
                let indicator = Indicator::try_from(row.indicator.as_str()).map_err(|_| {
                    anyhow!(
                        "question {} carries unknown indicator '{}'",
                        row.question_id,
                        row.indicator
                    )
                })?;
                index.insert(row.question_id, answers.len());
                answers.push(AnsweredQuestion {
                    question_id: row.question_id,
                    indicator,
                    question_type: row.qtype.clone(),
                    display_order: row.display_order,
                    text: row.question_text.clone(),
                    value: None,
                    selections: Vec::new(),
                    answer_text: None,
                });
                answers.len() - 1
            }
        };

        let answer = &mut answers[position];
        if answer.value.is_none() {
            answer.value = row.value;
        }
        if answer.answer_text.is_none() {
            answer.answer_text = row.answer_text.clone();
        }
        if let Some(option_id) = row.option_id {
            answer.selections.push(SelectedOption {
                option_id,
                text: row.option_text.clone().unwrap_or_default(),
                value: row.option_value,
            });
        }
    }

    Ok(Some(ResponseBundle {
        response_id: head.id,
        user_id: head.user_id,
        project_id: head.project_id,
        version_id: head.version_id,
        created_at: head.created_at,
        updated_at: head.updated_at,
        answers,
    }))
}

pub async fn insert_response(
    pool: &PgPool,
    user_id: Uuid,
    version_id: i64,
    project_id: Option<i64>,
    rows: &[NewAnswerRow],
) -> Result<i64> {
    let mut tx = pool.begin().await?;
    let response_id: i64 = sqlx::query_scalar(
        "INSERT INTO responses (user_id, version_id, project_id) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(user_id)
    .bind(version_id)
    .bind(project_id)
    .fetch_one(&mut *tx)
    .await?;
    insert_answer_rows(&mut tx, response_id, rows).await?;
    tx.commit().await?;
    Ok(response_id)
}

pub async fn replace_answers(pool: &PgPool, response_id: i64, rows: &[NewAnswerRow]) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM answers WHERE response_id = $1")
        .bind(response_id)
        .execute(&mut *tx)
        .await?;
    insert_answer_rows(&mut tx, response_id, rows).await?;
    sqlx::query("UPDATE responses SET updated_at = NOW() WHERE id = $1")
        .bind(response_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

async fn insert_answer_rows(
    tx: &mut Transaction<'_, Postgres>,
    response_id: i64,
    rows: &[NewAnswerRow],
) -> Result<()> {
    for row in rows {
        sqlx::query(
            "INSERT INTO answers (response_id, question_id, value, option_id, text) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(response_id)
        .bind(row.question_id)
        .bind(row.value)
        .bind(row.option_id)
        .bind(row.text.as_deref())
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

pub async fn delete_response(pool: &PgPool, response_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM responses WHERE id = $1")
        .bind(response_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

const RESPONSE_SUMMARY_SELECT: &str = r#"
    SELECT r.id, r.user_id, r.project_id, r.version_id,
           COUNT(a.id) AS answer_count,
           r.created_at, r.updated_at
    FROM responses r
    LEFT JOIN answers a ON a.response_id = r.id
"#;

pub async fn list_responses_by_version(
    pool: &PgPool,
    version_id: i64,
) -> Result<Vec<ResponseSummary>> {
    let sql = format!(
        "{RESPONSE_SUMMARY_SELECT} WHERE r.version_id = $1 GROUP BY r.id ORDER BY r.created_at DESC"
    );
    let summaries = sqlx::query_as::<_, ResponseSummary>(&sql)
        .bind(version_id)
        .fetch_all(pool)
        .await?;
    Ok(summaries)
}

pub async fn list_responses_by_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<ResponseSummary>> {
    let sql = format!(
        "{RESPONSE_SUMMARY_SELECT} WHERE r.user_id = $1 GROUP BY r.id ORDER BY r.created_at DESC"
    );
    let summaries = sqlx::query_as::<_, ResponseSummary>(&sql)
        .bind(user_id)
        .fetch_all(pool)
        .await?;
    Ok(summaries)
}

pub async fn list_responses_by_project(
    pool: &PgPool,
    project_id: i64,
) -> Result<Vec<ResponseSummary>> {
    let sql = format!(
        "{RESPONSE_SUMMARY_SELECT} WHERE r.project_id = $1 GROUP BY r.id ORDER BY r.created_at DESC"
    );
    let summaries = sqlx::query_as::<_, ResponseSummary>(&sql)
        .bind(project_id)
        .fetch_all(pool)
        .await?;
    Ok(summaries)
}

// ---------- projects and indicator priorities ----------

#[derive(Debug, Serialize, FromRow)]
pub struct ProjectRow {
    pub id: i64,
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct PriorityRow {
    pub id: i64,
    pub project_id: i64,
    pub indicator: String,
    pub rank: i32,
    pub weight: Option<f64>,
}

/// Input for replacing a project's priority configuration.
#[derive(Debug, Clone)]
pub struct NewPriority {
    pub indicator: Indicator,
    pub rank: i32,
    pub weight: Option<f64>,
}

pub async fn create_project(
    pool: &PgPool,
    user_id: Uuid,
    name: &str,
    description: Option<&str>,
) -> Result<ProjectRow> {
    let project = sqlx::query_as::<_, ProjectRow>(
        r#"
        INSERT INTO projects (user_id, name, description)
        VALUES ($1, $2, $3)
        RETURNING id, user_id, name, description, created_at
        "#,
    )
    .bind(user_id)
    .bind(name)
    .bind(description)
    .fetch_one(pool)
    .await?;
    Ok(project)
}

pub async fn count_projects(pool: &PgPool, user_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM projects WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn get_project(pool: &PgPool, project_id: i64) -> Result<Option<ProjectRow>> {
    let project = sqlx::query_as::<_, ProjectRow>(
        "SELECT id, user_id, name, description, created_at FROM projects WHERE id = $1",
    )
    .bind(project_id)
    .fetch_optional(pool)
    .await?;
    Ok(project)
}

pub async fn list_projects_by_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<ProjectRow>> {
    let projects = sqlx::query_as::<_, ProjectRow>(
        "SELECT id, user_id, name, description, created_at FROM projects WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(projects)
}

/// Deleting a project cascades to its responses and their reports.
pub async fn delete_project(pool: &PgPool, project_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM projects WHERE id = $1")
        .bind(project_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn list_project_priorities(pool: &PgPool, project_id: i64) -> Result<Vec<PriorityRow>> {
    let priorities = sqlx::query_as::<_, PriorityRow>(
        r#"
        SELECT id, project_id, indicator, rank, weight
        FROM project_tai_priorities
        WHERE project_id = $1
        ORDER BY rank, id
        "#,
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;
    Ok(priorities)
}

/// Swaps out the whole priority configuration in one transaction.
pub async fn replace_project_priorities(
    pool: &PgPool,
    project_id: i64,
    entries: &[NewPriority],
) -> Result<Vec<PriorityRow>> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM project_tai_priorities WHERE project_id = $1")
        .bind(project_id)
        .execute(&mut *tx)
        .await?;
    for entry in entries {
        sqlx::query(
            "INSERT INTO project_tai_priorities (project_id, indicator, rank, weight) VALUES ($1, $2, $3, $4)",
        )
        .bind(project_id)
        .bind(entry.indicator.as_str())
        .bind(entry.rank)
        .bind(entry.weight)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    list_project_priorities(pool, project_id).await
}

/// Priority rows parsed into domain terms for the weighting engine.
pub async fn project_priorities(pool: &PgPool, project_id: i64) -> Result<Vec<IndicatorPriority>> {
    let rows = list_project_priorities(pool, project_id).await?;
    rows.into_iter()
        .map(|row| {
            let indicator = Indicator::try_from(row.indicator.as_str()).map_err(|_| {
                anyhow!(
                    "priority row {} carries unknown indicator '{}'",
                    row.id,
                    row.indicator
                )
            })?;
            Ok(IndicatorPriority {
                indicator,
                rank: row.rank,
                weight: row.weight,
            })
        })
        .collect()
}

// ---------- reports ----------

#[derive(Debug, Clone, Serialize)]
pub struct StoredReport {
    pub id: i64,
    pub response_id: i64,
    pub overall_score: f64,
    pub scores: serde_json::Value,
    pub analysis_text: String,
    pub weight_snapshot: Option<serde_json::Value>,
    pub llm_meta: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub images: Vec<ReportImage>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ReportImage {
    pub id: i64,
    pub report_id: i64,
    pub url: String,
    pub caption: Option<String>,
    pub created_at: DateTime<Utc>,
}

fn report_from_row(row: &PgRow) -> Result<StoredReport> {
    Ok(StoredReport {
        id: row.try_get("id")?,
        response_id: row.try_get("response_id")?,
        overall_score: row.try_get("overall_score")?,
        scores: row.try_get("scores")?,
        analysis_text: row.try_get("analysis_text")?,
        weight_snapshot: row.try_get("weight_snapshot")?,
        llm_meta: row.try_get("llm_meta")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        images: Vec::new(),
    })
}

/// Creates or refreshes the one report a response can have, replacing any
/// previously attached images with the draft's set.
pub async fn upsert_report(
    pool: &PgPool,
    response_id: i64,
    draft: &ReportDraft,
) -> Result<StoredReport> {
    let mut tx = pool.begin().await?;
    let row = sqlx::query(
        r#"
        INSERT INTO reports (response_id, overall_score, scores, analysis_text, weight_snapshot, llm_meta)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (response_id) DO UPDATE
        SET overall_score = EXCLUDED.overall_score,
            scores = EXCLUDED.scores,
            analysis_text = EXCLUDED.analysis_text,
            weight_snapshot = EXCLUDED.weight_snapshot,
            llm_meta = EXCLUDED.llm_meta,
            updated_at = NOW()
        RETURNING id, response_id, overall_score, scores, analysis_text, weight_snapshot, llm_meta,
                  created_at, updated_at
        "#,
    )
    .bind(response_id)
    .bind(draft.overall_score)
    .bind(serde_json::to_value(&draft.scores)?)
    .bind(&draft.analysis_text)
    .bind(draft.weight_snapshot.as_ref().map(serde_json::to_value).transpose()?)
    .bind(&draft.llm_meta)
    .fetch_one(&mut *tx)
    .await?;
    let mut report = report_from_row(&row)?;

    sqlx::query("DELETE FROM report_images WHERE report_id = $1")
        .bind(report.id)
        .execute(&mut *tx)
        .await?;
    for image in &draft.images {
        let inserted = sqlx::query_as::<_, ReportImage>(
            r#"
            INSERT INTO report_images (report_id, url, caption)
            VALUES ($1, $2, $3)
            RETURNING id, report_id, url, caption, created_at
            "#,
        )
        .bind(report.id)
        .bind(&image.url)
        .bind(image.caption.as_deref())
        .fetch_one(&mut *tx)
        .await?;
        report.images.push(inserted);
    }
    tx.commit().await?;
    Ok(report)
}

pub async fn get_report_by_response(
    pool: &PgPool,
    response_id: i64,
) -> Result<Option<StoredReport>> {
    let row = sqlx::query(
        r#"
        SELECT id, response_id, overall_score, scores, analysis_text, weight_snapshot, llm_meta,
               created_at, updated_at
        FROM reports
        WHERE response_id = $1
        "#,
    )
    .bind(response_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let mut report = report_from_row(&row)?;
    report.images = sqlx::query_as::<_, ReportImage>(
        "SELECT id, report_id, url, caption, created_at FROM report_images WHERE report_id = $1 ORDER BY id",
    )
    .bind(report.id)
    .fetch_all(pool)
    .await?;
    Ok(Some(report))
}

pub async fn report_exists(pool: &PgPool, report_id: i64) -> Result<bool> {
    let id: Option<i64> = sqlx::query_scalar("SELECT id FROM reports WHERE id = $1")
        .bind(report_id)
        .fetch_optional(pool)
        .await?;
    Ok(id.is_some())
}

pub async fn insert_report_image(
    pool: &PgPool,
    report_id: i64,
    url: &str,
    caption: Option<&str>,
) -> Result<ReportImage> {
    let image = sqlx::query_as::<_, ReportImage>(
        r#"
        INSERT INTO report_images (report_id, url, caption)
        VALUES ($1, $2, $3)
        RETURNING id, report_id, url, caption, created_at
        "#,
    )
    .bind(report_id)
    .bind(url)
    .bind(caption)
    .fetch_one(pool)
    .await?;
    Ok(image)
}

// ---------- report store backed by Postgres ----------

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReportStore for PgStore {
    async fn response_with_answers(&self, response_id: i64) -> Result<Option<ResponseBundle>> {
        get_response_bundle(&self.pool, response_id).await
    }

    async fn project_weights(&self, project_id: i64) -> Result<Vec<IndicatorPriority>> {
        project_priorities(&self.pool, project_id).await
    }

    async fn upsert_report(&self, response_id: i64, draft: &ReportDraft) -> Result<StoredReport> {
        upsert_report(&self.pool, response_id, draft).await
    }
}

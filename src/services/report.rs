use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;

use crate::db::{ResponseBundle, StoredReport};
use crate::domain::weights::{IndicatorPriority, WeightedOverall};
use crate::domain::{scoring, stats, weights, Indicator};
use crate::error::{AnswerIssue, ServiceError};
use crate::services::llm::{self, CompletionClient, LlmConfig, PromptConfig};

/// Everything the orchestrator writes for one response. The store persists it
/// atomically keyed by response id, replacing whatever was there before.
#[derive(Debug, Clone)]
pub struct ReportDraft {
    pub overall_score: f64,
    pub scores: BTreeMap<Indicator, f64>,
    pub analysis_text: String,
    pub weight_snapshot: Option<BTreeMap<Indicator, f64>>,
    pub llm_meta: serde_json::Value,
    pub images: Vec<ReportImageDraft>,
}

#[derive(Debug, Clone)]
pub struct ReportImageDraft {
    pub url: String,
    pub caption: Option<String>,
}

/// Storage the orchestrator needs, kept behind a trait so report generation
/// can run against an in-memory double in tests.
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn response_with_answers(&self, response_id: i64) -> Result<Option<ResponseBundle>>;
    async fn project_weights(&self, project_id: i64) -> Result<Vec<IndicatorPriority>>;
    async fn upsert_report(&self, response_id: i64, draft: &ReportDraft) -> Result<StoredReport>;
}

/// One radar chart point: the indicator and its 0..1 score (or -1).
#[derive(Debug, Clone, Serialize)]
pub struct RadarPoint {
    pub axis: Indicator,
    pub value: f64,
}

pub fn radar_points(scores: &BTreeMap<Indicator, f64>) -> Vec<RadarPoint> {
    scores
        .iter()
        .map(|(indicator, score)| RadarPoint {
            axis: *indicator,
            value: *score,
        })
        .collect()
}

/// Normalizes and buckets a response's answers into per-indicator Markdown
/// statistics blocks. Pure, so the read path can rebuild the text without
/// touching the persisted report.
pub fn question_stats_for(bundle: &ResponseBundle) -> BTreeMap<Indicator, String> {
    let normalized = scoring::normalize(&bundle.answers);
    stats::build_question_stats(&normalized.questions)
}

/// What a generation run returns to the caller: the persisted report plus the
/// derived views that are rebuilt rather than stored.
#[derive(Debug, Serialize)]
pub struct ReportBundle {
    pub report: StoredReport,
    pub scores: BTreeMap<Indicator, f64>,
    pub radar_data: Vec<RadarPoint>,
    pub overall_score: f64,
    pub analysis_text: String,
    pub question_stats_text: BTreeMap<Indicator, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub validation_issues: Vec<AnswerIssue>,
}

pub struct ReportService {
    store: Arc<dyn ReportStore>,
    client: Arc<dyn CompletionClient>,
    config: LlmConfig,
    prompts: Arc<PromptConfig>,
}

impl ReportService {
    pub fn new(
        store: Arc<dyn ReportStore>,
        client: Arc<dyn CompletionClient>,
        config: LlmConfig,
        prompts: Arc<PromptConfig>,
    ) -> Self {
        Self {
            store,
            client,
            config,
            prompts,
        }
    }

    /// Scores a response end to end and persists the result.
    ///
    /// Fails with not found when the response does not exist; otherwise it
    /// always produces a report. Questions with broken catalog types are
    /// skipped and reported back, and a narrative comes out of the LLM or the
    /// local template, never out of thin air.
    pub async fn generate_report(&self, response_id: i64) -> Result<ReportBundle, ServiceError> {
        let bundle = self
            .store
            .response_with_answers(response_id)
            .await?
            .ok_or(ServiceError::NotFound("response"))?;

        let normalized = scoring::normalize(&bundle.answers);
        for issue in &normalized.issues {
            tracing::warn!(
                "response {response_id}: question {} skipped: {}",
                issue.question_id,
                issue.message
            );
        }

        let scores = scoring::aggregate(&normalized.questions);
        let question_stats_text = stats::build_question_stats(&normalized.questions);

        let priorities = match bundle.project_id {
            Some(project_id) => self.store.project_weights(project_id).await?,
            None => Vec::new(),
        };
        let WeightedOverall { overall, snapshot } = weights::weigh(&scores, &priorities);

        let narrative = llm::generate_narrative(
            self.client.as_ref(),
            &self.config,
            &self.prompts,
            &scores,
            overall,
        )
        .await;

        let draft = ReportDraft {
            overall_score: overall,
            scores: scores.clone(),
            analysis_text: narrative.text.clone(),
            weight_snapshot: snapshot,
            llm_meta: serde_json::json!({
                "model": narrative.model,
                "provider": narrative.provider,
                "generated_at": Utc::now().to_rfc3339(),
            }),
            images: Vec::new(),
        };
        let report = self.store.upsert_report(response_id, &draft).await?;

        Ok(ReportBundle {
            report,
            radar_data: radar_points(&scores),
            scores,
            overall_score: overall,
            analysis_text: narrative.text,
            question_stats_text,
            validation_issues: normalized.issues,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ReportImage;
    use crate::domain::scoring::{AnsweredQuestion, SelectedOption};
    use crate::services::llm::LlmError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use uuid::Uuid;

    struct MemoryStore {
        bundle: Option<ResponseBundle>,
        priorities: Vec<IndicatorPriority>,
        reports: Mutex<HashMap<i64, StoredReport>>,
        next_id: AtomicI64,
    }

    impl MemoryStore {
        fn with_bundle(bundle: ResponseBundle) -> Self {
            Self {
                bundle: Some(bundle),
                priorities: Vec::new(),
                reports: Mutex::new(HashMap::new()),
                next_id: AtomicI64::new(1),
            }
        }

        fn empty() -> Self {
            Self {
                bundle: None,
                priorities: Vec::new(),
                reports: Mutex::new(HashMap::new()),
                next_id: AtomicI64::new(1),
            }
        }
    }

    #[async_trait]
    impl ReportStore for MemoryStore {
        async fn response_with_answers(
            &self,
            response_id: i64,
        ) -> Result<Option<ResponseBundle>> {
            Ok(self
                .bundle
                .as_ref()
                .filter(|b| b.response_id == response_id)
                .cloned())
        }

        async fn project_weights(&self, _project_id: i64) -> Result<Vec<IndicatorPriority>> {
            Ok(self.priorities.clone())
        }

        async fn upsert_report(
            &self,
            response_id: i64,
            draft: &ReportDraft,
        ) -> Result<StoredReport> {
            let mut reports = self.reports.lock().unwrap();
            let now = Utc::now();
            let report = match reports.get(&response_id) {
                Some(existing) => StoredReport {
                    id: existing.id,
                    response_id,
                    overall_score: draft.overall_score,
                    scores: serde_json::to_value(&draft.scores)?,
                    analysis_text: draft.analysis_text.clone(),
                    weight_snapshot: draft
                        .weight_snapshot
                        .as_ref()
                        .map(serde_json::to_value)
                        .transpose()?,
                    llm_meta: draft.llm_meta.clone(),
                    created_at: existing.created_at,
                    updated_at: now,
                    images: Vec::new(),
                },
                None => StoredReport {
                    id: self.next_id.fetch_add(1, Ordering::SeqCst),
                    response_id,
                    overall_score: draft.overall_score,
                    scores: serde_json::to_value(&draft.scores)?,
                    analysis_text: draft.analysis_text.clone(),
                    weight_snapshot: draft
                        .weight_snapshot
                        .as_ref()
                        .map(serde_json::to_value)
                        .transpose()?,
                    llm_meta: draft.llm_meta.clone(),
                    created_at: now,
                    updated_at: now,
                    images: Vec::<ReportImage>::new(),
                },
            };
            reports.insert(response_id, report.clone());
            Ok(report)
        }
    }

    struct CannedClient {
        reply: Result<String, String>,
        calls: AtomicUsize,
    }

    impl CannedClient {
        fn ok(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                reply: Err("down".to_string()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CompletionClient for CannedClient {
        async fn complete(
            &self,
            _system_prompt: &str,
            _user_prompt: &str,
            _model: &str,
            _timeout: Duration,
        ) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(message) => Err(LlmError::Request(message.clone())),
            }
        }
    }

    fn test_config() -> LlmConfig {
        LlmConfig {
            endpoint: "http://127.0.0.1:0/unreachable".to_string(),
            api_key: Some("test-key".to_string()),
            model: "primary-model".to_string(),
            fallback_model: "fallback-model".to_string(),
            timeout: Duration::from_secs(1),
            retry_delay: Duration::ZERO,
            referer: None,
        }
    }

    fn scale_answer(
        question_id: i64,
        indicator: Indicator,
        display_order: i32,
        value: f64,
    ) -> AnsweredQuestion {
        AnsweredQuestion {
            question_id,
            indicator,
            question_type: "SCALE".to_string(),
            display_order,
            text: format!("Question {question_id}"),
            value: Some(value),
            selections: Vec::new(),
            answer_text: None,
        }
    }

    fn survey_bundle() -> ResponseBundle {
        ResponseBundle {
            response_id: 42,
            user_id: Uuid::new_v4(),
            project_id: None,
            version_id: Some(1),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            answers: vec![
                scale_answer(1, Indicator::Safety, 1, 90.0),
                scale_answer(2, Indicator::Safety, 2, 70.0),
                AnsweredQuestion {
                    question_id: 3,
                    indicator: Indicator::Privacy,
                    question_type: "SINGLE_CHOICE".to_string(),
                    display_order: 3,
                    text: "Question 3".to_string(),
                    value: None,
                    selections: vec![SelectedOption {
                        option_id: 9,
                        text: "Does not apply".to_string(),
                        value: Some(-1.0),
                    }],
                    answer_text: None,
                },
            ],
        }
    }

    fn service(store: Arc<MemoryStore>, client: Arc<CannedClient>) -> ReportService {
        ReportService::new(
            store,
            client,
            test_config(),
            Arc::new(PromptConfig::default()),
        )
    }

    #[tokio::test]
    async fn test_generates_scores_stats_and_overall_end_to_end() {
        let store = Arc::new(MemoryStore::with_bundle(survey_bundle()));
        let client = Arc::new(CannedClient::ok("model narrative"));
        let bundle = service(store.clone(), client)
            .generate_report(42)
            .await
            .unwrap();

        assert_eq!(bundle.scores[&Indicator::Safety], 0.8);
        assert_eq!(bundle.scores[&Indicator::Privacy], -1.0);
        assert_eq!(bundle.overall_score, 0.8);
        assert_eq!(bundle.analysis_text, "model narrative");

        let safety = &bundle.question_stats_text[&Indicator::Safety];
        assert!(safety.contains("counted 2/2 questions"));
        let fully = safety.find("**Fully met (1)**").unwrap();
        let q1 = safety.find("- Q1. Question 1").unwrap();
        let mostly = safety.find("**Mostly met (1)**").unwrap();
        let q2 = safety.find("- Q2. Question 2").unwrap();
        assert!(fully < q1 && q1 < mostly && mostly < q2);

        let privacy = &bundle.question_stats_text[&Indicator::Privacy];
        assert!(privacy.contains("counted 0/1 questions"));
        assert!(privacy.contains("**Not applicable (1)**"));

        assert_eq!(bundle.radar_data.len(), 2);
        assert_eq!(store.reports.lock().unwrap().len(), 1);
        assert!(bundle.report.weight_snapshot.is_none());
    }

    #[tokio::test]
    async fn test_regeneration_updates_the_same_row() {
        let store = Arc::new(MemoryStore::with_bundle(survey_bundle()));
        let client = Arc::new(CannedClient::ok("narrative"));
        let service = service(store.clone(), client);

        let first = service.generate_report(42).await.unwrap();
        let second = service.generate_report(42).await.unwrap();

        assert_eq!(first.report.id, second.report.id);
        assert_eq!(store.reports.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_llm_outage_still_produces_a_narrative() {
        let store = Arc::new(MemoryStore::with_bundle(survey_bundle()));
        let client = Arc::new(CannedClient::failing());
        let bundle = service(store, client.clone())
            .generate_report(42)
            .await
            .unwrap();

        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
        assert!(!bundle.analysis_text.trim().is_empty());
        assert_eq!(bundle.report.llm_meta["provider"], "local");
        assert_eq!(bundle.report.llm_meta["model"], "deterministic-fallback");
    }

    #[tokio::test]
    async fn test_missing_response_is_not_found() {
        let store = Arc::new(MemoryStore::empty());
        let client = Arc::new(CannedClient::ok("unused"));
        let err = service(store, client).generate_report(7).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound("response")));
    }

    #[tokio::test]
    async fn test_project_weights_shape_overall_and_snapshot() {
        let mut bundle = survey_bundle();
        bundle.project_id = Some(5);
        bundle.answers.push(scale_answer(4, Indicator::Accuracy, 4, 40.0));

        let mut store = MemoryStore::with_bundle(bundle);
        store.priorities = vec![
            IndicatorPriority {
                indicator: Indicator::Safety,
                rank: 1,
                weight: Some(3.0),
            },
            IndicatorPriority {
                indicator: Indicator::Accuracy,
                rank: 2,
                weight: Some(1.0),
            },
        ];
        let store = Arc::new(store);
        let client = Arc::new(CannedClient::ok("narrative"));
        let result = service(store, client).generate_report(42).await.unwrap();

        // (0.8 * 3 + 0.4 * 1) / 4
        assert!((result.overall_score - 0.7).abs() < 1e-12);
        let snapshot = result.report.weight_snapshot.clone().unwrap();
        assert_eq!(snapshot["SAFETY"], 0.75);
        assert_eq!(snapshot["ACCURACY"], 0.25);
    }

    #[tokio::test]
    async fn test_broken_question_types_are_reported_not_scored() {
        let mut bundle = survey_bundle();
        bundle.answers.push(AnsweredQuestion {
            question_id: 99,
            indicator: Indicator::Fairness,
            question_type: "RANKING".to_string(),
            display_order: 9,
            text: "Question 99".to_string(),
            value: Some(50.0),
            selections: Vec::new(),
            answer_text: None,
        });

        let store = Arc::new(MemoryStore::with_bundle(bundle));
        let client = Arc::new(CannedClient::ok("narrative"));
        let result = service(store, client).generate_report(42).await.unwrap();

        assert_eq!(result.validation_issues.len(), 1);
        assert_eq!(result.validation_issues[0].question_id, 99);
        assert!(!result.scores.contains_key(&Indicator::Fairness));
    }
}

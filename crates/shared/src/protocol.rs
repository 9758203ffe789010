use serde::{Deserialize, Serialize};

use crate::{
    cin::Cin,
    domain::{
        Answer, AnswerRecord, AttemptId, AttemptSummary, CertificateId, CertificateSummary,
        HseUser, Question, QuestionId, TestVersion, UserProfile,
    },
};

/// Question lists come back either wrapped (`{"questions": [...]}`) or bare.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum QuestionsEnvelope {
    Wrapped {
        #[serde(alias = "results")]
        questions: Vec<Question>,
    },
    Bare(Vec<Question>),
}

impl QuestionsEnvelope {
    pub fn into_questions(self) -> Vec<Question> {
        match self {
            Self::Wrapped { questions } => questions,
            Self::Bare(questions) => questions,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum VersionsEnvelope {
    Wrapped {
        #[serde(alias = "tests")]
        versions: Vec<TestVersion>,
    },
    Bare(Vec<TestVersion>),
}

impl VersionsEnvelope {
    pub fn into_versions(self) -> Vec<TestVersion> {
        match self {
            Self::Wrapped { versions } => versions,
            Self::Bare(versions) => versions,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CertificatesEnvelope {
    #[serde(default, alias = "certificates")]
    pub certificats: Vec<CertificateSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CinRequest {
    pub cni: Cin,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuccessResponse {
    #[serde(default)]
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerSubmission {
    pub question_id: QuestionId,
    pub answer: Answer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptSubmission {
    pub answers: AnswerRecord,
    pub time_taken_seconds: u32,
}

/// Response of the `terminer` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishAcknowledgement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mandatory_correct: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional_correct: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_questions: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOutcome {
    pub question_id: QuestionId,
    pub correct: bool,
}

/// Scored attempt as reported by the `resultat` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptResult {
    #[serde(default, alias = "note", skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_questions: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub corrections: Vec<QuestionOutcome>,
    #[serde(default, alias = "version", skip_serializing_if = "Option::is_none")]
    pub test_version: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt_id: Option<AttemptId>,
    #[serde(default, alias = "certificat_id", skip_serializing_if = "Option::is_none")]
    pub certificate_id: Option<CertificateId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user: UserProfile,
    pub token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VersionMutationResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub version: Option<TestVersion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddQuestionRequest {
    pub question_id: QuestionId,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddQuestionResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub ordre_questions: Vec<QuestionId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateCertificateRequest {
    pub attempt_id: AttemptId,
}

/// Editable question fields, sent as a multipart form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuestionDraft {
    pub question_code: String,
    pub enonce_fr: String,
    pub enonce_en: String,
    pub enonce_ar: String,
    pub expected_answer: bool,
    pub mandatory: bool,
    pub points: u32,
}

impl QuestionDraft {
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("question_code", self.question_code.clone()),
            ("enonce_fr", self.enonce_fr.clone()),
            ("enonce_en", self.enonce_en.clone()),
            ("enonce_ar", self.enonce_ar.clone()),
            ("reponse_correcte", self.expected_answer.to_string()),
            ("is_mandatory", self.mandatory.to_string()),
            ("points", self.points.max(1).to_string()),
        ]
    }
}

/// Query filters for the HSE user list. Unset fields are not sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HseUserFilters {
    pub cin: Option<String>,
    pub entity: Option<String>,
    pub company: Option<String>,
    pub present: Option<bool>,
    pub passed: Option<bool>,
}

impl HseUserFilters {
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let text = [
            ("cin", &self.cin),
            ("entite", &self.entity),
            ("entreprise", &self.company),
        ];
        let flags = [("presence", self.present), ("reussite", self.passed)];
        text.into_iter()
            .filter_map(|(key, value)| {
                value
                    .as_deref()
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map(|value| (key, value.to_string()))
            })
            .chain(
                flags
                    .into_iter()
                    .filter_map(|(key, value)| value.map(|value| (key, value.to_string()))),
            )
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum HseUsersEnvelope {
    Wrapped {
        #[serde(alias = "results")]
        users: Vec<HseUser>,
    },
    Bare(Vec<HseUser>),
}

impl HseUsersEnvelope {
    pub fn into_users(self) -> Vec<HseUser> {
        match self {
            Self::Wrapped { users } => users,
            Self::Bare(users) => users,
        }
    }
}

/// Response of `search-by-cin`.
#[derive(Debug, Clone, Deserialize)]
pub struct HseUserLookup {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub user: Option<HseUser>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceUpdate {
    pub presence: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PresenceUpdateResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    pub presence: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TestHistory {
    #[serde(default)]
    pub attempts_count: u32,
    #[serde(default)]
    pub attempts: Vec<AttemptSummary>,
}

/// Aggregate figures over all HSE users.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HseStatistics {
    #[serde(default)]
    pub total_users: u32,
    #[serde(default)]
    pub present_users: u32,
    #[serde(default)]
    pub present_percentage: f64,
    #[serde(default)]
    pub successful_users: u32,
    #[serde(default)]
    pub success_rate: f64,
    #[serde(default)]
    pub average_score: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatisticsEnvelope {
    pub statistics: HseStatistics,
}

/// Day filter for the dashboard figures. Unset parts are not sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsPeriod {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
}

/// Dashboard percentages: attendance and initial/final test success.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyStats {
    #[serde(default)]
    pub presence: f64,
    #[serde(default)]
    pub test_initial: f64,
    #[serde(default)]
    pub test_final: f64,
}

impl DailyStats {
    /// Percentage points gained between the initial and the final test.
    pub fn improvement(&self) -> f64 {
        self.test_final - self.test_initial
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::VersionId;

    #[test]
    fn questions_envelope_accepts_both_shapes() {
        let wrapped: QuestionsEnvelope = serde_json::from_str(
            r#"{"questions": [{"id": 1, "enonce_fr": "A ?", "reponse_correcte": true}], "test_id": 3, "version": 1}"#,
        )
        .expect("wrapped");
        assert_eq!(wrapped.into_questions().len(), 1);

        let bare: QuestionsEnvelope =
            serde_json::from_str(r#"[{"id": 1, "enonce_fr": "A ?", "reponse_correcte": true}]"#)
                .expect("bare");
        assert_eq!(bare.into_questions()[0].id, QuestionId(1));
    }

    #[test]
    fn versions_envelope_accepts_legacy_tests_key() {
        let envelope: VersionsEnvelope =
            serde_json::from_str(r#"{"tests": [{"id": 7, "version": 3}]}"#).expect("versions");
        assert_eq!(envelope.into_versions()[0].id, VersionId(7));
    }

    #[test]
    fn attempt_result_reads_aliases() {
        let result: AttemptResult = serde_json::from_str(
            r#"{"success": true, "note": 17, "version": 2, "attempt_id": null,
                "certificat_id": "5f0c3c52-54a6-4c5c-a3a4-2d57f0f4d7a1"}"#,
        )
        .expect("result");
        assert_eq!(result.score, Some(17));
        assert_eq!(result.test_version, Some(2));
        assert_eq!(result.attempt_id, None);
        assert!(result.certificate_id.is_some());
    }

    #[test]
    fn submission_body_matches_backend_contract() {
        let mut answers = AnswerRecord::new();
        answers.upsert(QuestionId(1), Answer::Yes);
        let body = serde_json::to_value(AttemptSubmission {
            answers,
            time_taken_seconds: 42,
        })
        .expect("json");
        assert_eq!(
            body,
            serde_json::json!({"answers": {"1": true}, "time_taken_seconds": 42})
        );
    }

    #[test]
    fn question_draft_never_sends_zero_points() {
        let draft = QuestionDraft {
            question_code: "Q1".into(),
            points: 0,
            ..QuestionDraft::default()
        };
        let fields = draft.form_fields();
        assert!(fields.contains(&("points", "1".to_string())));
        assert!(fields.contains(&("reponse_correcte", "false".to_string())));
    }

    #[test]
    fn hse_user_filters_skip_blank_and_unset_values() {
        let filters = HseUserFilters {
            cin: Some("  ".into()),
            company: Some(" Sous-traitant ".into()),
            present: Some(false),
            ..HseUserFilters::default()
        };
        assert_eq!(
            filters.query_pairs(),
            vec![
                ("entreprise", "Sous-traitant".to_string()),
                ("presence", "false".to_string()),
            ]
        );
        assert!(HseUserFilters::default().query_pairs().is_empty());
    }

    #[test]
    fn daily_stats_tolerate_missing_figures() {
        let stats: DailyStats =
            serde_json::from_str(r#"{"presence": 80.0, "test_final": 75.5}"#).expect("stats");
        assert_eq!(stats.test_initial, 0.0);
        assert_eq!(stats.improvement(), 75.5);
    }
}

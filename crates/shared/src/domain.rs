use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(VersionId);
id_newtype!(QuestionId);
id_newtype!(AttemptId);
id_newtype!(HseUserId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CertificateId(pub Uuid);

impl fmt::Display for CertificateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CertificateId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    #[default]
    Fr,
    En,
    Ar,
}

#[derive(Debug, Error)]
#[error("unsupported language '{0}' (expected fr, en or ar)")]
pub struct UnknownLanguage(String);

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fr" => Ok(Self::Fr),
            "en" => Ok(Self::En),
            "ar" => Ok(Self::Ar),
            other => Err(UnknownLanguage(other.to_string())),
        }
    }
}

/// A yes/no response. Travels as a JSON boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "bool", into = "bool")]
pub enum Answer {
    Yes,
    No,
}

#[derive(Debug, Error)]
#[error("'{0}' is not a yes/no answer")]
pub struct AnswerParseError(String);

impl Answer {
    pub fn as_bool(self) -> bool {
        matches!(self, Self::Yes)
    }

    pub fn label(self, language: Language) -> &'static str {
        match (self, language) {
            (Self::Yes, Language::Fr) => "Oui",
            (Self::No, Language::Fr) => "Non",
            (Self::Yes, Language::En) => "Yes",
            (Self::No, Language::En) => "No",
            (Self::Yes, Language::Ar) => "نعم",
            (Self::No, Language::Ar) => "لا",
        }
    }
}

impl From<bool> for Answer {
    fn from(value: bool) -> Self {
        if value {
            Self::Yes
        } else {
            Self::No
        }
    }
}

impl From<Answer> for bool {
    fn from(value: Answer) -> Self {
        value.as_bool()
    }
}

impl FromStr for Answer {
    type Err = AnswerParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "oui" | "o" | "yes" | "y" | "vrai" | "true" | "t" | "1" => Ok(Self::Yes),
            "non" | "n" | "no" | "faux" | "false" | "f" | "0" => Ok(Self::No),
            _ => Err(AnswerParseError(s.to_string())),
        }
    }
}

/// Prompt text in each supported language. Missing translations fall back to French,
/// then to the untranslated statement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedText {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enonce_fr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enonce_en: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enonce_ar: Option<String>,
}

impl LocalizedText {
    pub fn text(&self, language: Language) -> &str {
        let preferred = match language {
            Language::Fr => self.enonce_fr.as_deref(),
            Language::En => self.enonce_en.as_deref(),
            Language::Ar => self.enonce_ar.as_deref(),
        };
        [preferred, self.enonce_fr.as_deref(), self.enonce.as_deref()]
            .into_iter()
            .flatten()
            .find(|text| !text.trim().is_empty())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_code: Option<String>,
    #[serde(flatten)]
    pub prompt: LocalizedText,
    #[serde(rename = "reponse_correcte")]
    pub expected_answer: bool,
    #[serde(rename = "is_mandatory", default, skip_serializing_if = "Option::is_none")]
    pub mandatory: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<u32>,
    #[serde(alias = "image_url", default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl Question {
    pub fn text(&self, language: Language) -> &str {
        self.prompt.text(language)
    }

    pub fn is_mandatory(&self) -> bool {
        self.mandatory.unwrap_or(false)
    }
}

/// Responses keyed by question; one entry per question, latest value wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerRecord(BTreeMap<QuestionId, Answer>);

impl AnswerRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the answer for `question_id`, returning the previous one.
    pub fn upsert(&mut self, question_id: QuestionId, answer: Answer) -> Option<Answer> {
        self.0.insert(question_id, answer)
    }

    pub fn get(&self, question_id: QuestionId) -> Option<Answer> {
        self.0.get(&question_id).copied()
    }

    pub fn contains(&self, question_id: QuestionId) -> bool {
        self.0.contains_key(&question_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (QuestionId, Answer)> + '_ {
        self.0.iter().map(|(id, answer)| (*id, *answer))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestVersion {
    pub id: VersionId,
    pub version: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_questions: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mandatory_questions_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub questions_count: Option<u32>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl TestVersion {
    pub fn display_name(&self) -> String {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => format!("Version {}", self.version),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cin: Option<String>,
}

impl UserProfile {
    /// Role used for access decisions; the backend omits it for plain users.
    pub fn role(&self) -> &str {
        self.role.as_deref().unwrap_or("user")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateSummary {
    pub id: CertificateId,
    #[serde(default)]
    pub certificate_number: String,
    #[serde(default)]
    pub user_full_name: String,
    #[serde(default)]
    pub user_cin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_version: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_date: Option<DateTime<Utc>>,
}

/// Person registered for HSE induction, as listed by the admin endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HseUser {
    pub id: HseUserId,
    #[serde(default, rename = "nom")]
    pub last_name: String,
    #[serde(default, rename = "prénom", alias = "prenom")]
    pub first_name: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub cin: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, rename = "entite")]
    pub entity: String,
    #[serde(default, rename = "entreprise")]
    pub company: String,
    #[serde(default, rename = "chef_projet_ocp", skip_serializing_if = "Option::is_none")]
    pub project_lead: Option<String>,
    #[serde(default, rename = "presence")]
    pub present: bool,
    #[serde(default, rename = "reussite")]
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, rename = "taux_reussite", skip_serializing_if = "Option::is_none")]
    pub success_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_attempts_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recent_attempts: Vec<AttemptSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl HseUser {
    pub fn display_name(&self) -> String {
        if !self.full_name.trim().is_empty() {
            return self.full_name.trim().to_string();
        }
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }
}

/// One test attempt in a person's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptSummary {
    pub id: AttemptId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_version: Option<i64>,
    #[serde(default)]
    pub user_cin: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default, rename = "langue", skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mandatory_score_percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional_score_percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_score_percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_taken_seconds: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question_json() -> &'static str {
        r#"{
            "id": 4,
            "question_code": "Q4",
            "enonce_fr": "Le port du casque est obligatoire ?",
            "enonce_en": "",
            "enonce_ar": "هل ارتداء الخوذة إلزامي؟",
            "reponse_correcte": true,
            "is_mandatory": true,
            "points": 1,
            "image": null,
            "has_image": false
        }"#
    }

    #[test]
    fn question_text_falls_back_to_french() {
        let question: Question = serde_json::from_str(question_json()).expect("question");
        assert_eq!(question.text(Language::En), "Le port du casque est obligatoire ?");
        assert_eq!(question.text(Language::Ar), "هل ارتداء الخوذة إلزامي؟");
        assert!(question.is_mandatory());
        assert_eq!(question.image, None);
    }

    #[test]
    fn question_accepts_legacy_image_url_and_plain_statement() {
        let question: Question = serde_json::from_str(
            r#"{"id": 1, "enonce": "Extincteur ?", "reponse_correcte": false, "image_url": "/media/q1.png"}"#,
        )
        .expect("question");
        assert_eq!(question.text(Language::Fr), "Extincteur ?");
        assert_eq!(question.image.as_deref(), Some("/media/q1.png"));
        assert!(!question.is_mandatory());
    }

    #[test]
    fn answer_record_keeps_latest_value_per_question() {
        let mut record = AnswerRecord::new();
        assert_eq!(record.upsert(QuestionId(3), Answer::Yes), None);
        assert_eq!(record.upsert(QuestionId(3), Answer::No), Some(Answer::Yes));
        assert_eq!(record.len(), 1);
        assert_eq!(record.get(QuestionId(3)), Some(Answer::No));
    }

    #[test]
    fn answer_record_serializes_as_boolean_map() {
        let mut record = AnswerRecord::new();
        record.upsert(QuestionId(12), Answer::No);
        record.upsert(QuestionId(2), Answer::Yes);
        let json = serde_json::to_string(&record).expect("serialize");
        assert_eq!(json, r#"{"2":true,"12":false}"#);

        let back: AnswerRecord = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, record);
    }

    #[test]
    fn answer_parses_french_and_english_words() {
        assert_eq!("Oui".parse::<Answer>().expect("oui"), Answer::Yes);
        assert_eq!("faux".parse::<Answer>().expect("faux"), Answer::No);
        assert_eq!(" y ".parse::<Answer>().expect("y"), Answer::Yes);
        assert!("peut-être".parse::<Answer>().is_err());
    }

    #[test]
    fn version_display_name_defaults_to_number() {
        let version: TestVersion =
            serde_json::from_str(r#"{"id": 3, "version": 2, "description": null}"#).expect("version");
        assert_eq!(version.display_name(), "Version 2");
        assert!(version.is_active);
    }

    #[test]
    fn hse_user_reads_accented_backend_keys() {
        let user: HseUser = serde_json::from_str(
            r#"{"id": 12, "nom": "Alaoui", "prénom": "Sara", "full_name": "", "cin": "AB123456",
                "email": "sara@example.com", "entite": "OCP", "entreprise": "Sous-traitant",
                "presence": true, "reussite": false, "score": 62.5, "taux_reussite": null,
                "recent_attempts": [{"id": 3, "test_version": 2, "langue": "ar", "status": "completed",
                                     "overall_score_percentage": 62.5, "passed": false,
                                     "started_at": "2026-03-01T08:00:00Z", "time_taken_seconds": 540}]}"#,
        )
        .expect("hse user");
        assert_eq!(user.id, HseUserId(12));
        assert_eq!(user.display_name(), "Sara Alaoui");
        assert!(user.present);
        assert!(!user.passed);
        assert_eq!(user.score, Some(62.5));
        assert_eq!(user.success_rate, None);
        assert_eq!(user.recent_attempts[0].language, Some(Language::Ar));
        assert_eq!(user.recent_attempts[0].completed_at, None);
    }
}

use shared::{
    domain::{AttemptId, CertificateId},
    protocol::AttemptResult,
};

pub const DEFAULT_PASS_THRESHOLD_PERCENT: u8 = 70;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateAction {
    Download(CertificateId),
    Generate(AttemptId),
}

/// Presentation of a scored attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultView {
    result: AttemptResult,
    total: Option<u32>,
    threshold_percent: u8,
}

impl ResultView {
    /// `question_count` is the number of questions the attempt was taken with;
    /// pass 0 when unknown and the backend's own total is used.
    pub fn new(result: AttemptResult, question_count: usize, threshold_percent: u8) -> Self {
        let total = result
            .total_questions
            .or_else(|| u32::try_from(question_count).ok())
            .filter(|total| *total > 0);
        Self {
            result,
            total,
            threshold_percent: threshold_percent.min(100),
        }
    }

    pub fn result(&self) -> &AttemptResult {
        &self.result
    }

    pub fn score(&self) -> Option<u32> {
        self.result.score
    }

    pub fn total(&self) -> Option<u32> {
        self.total
    }

    pub fn score_label(&self) -> String {
        let part = |value: Option<u32>| value.map_or_else(|| "?".to_string(), |v| v.to_string());
        format!("{}/{}", part(self.score()), part(self.total))
    }

    pub fn meets_threshold(&self) -> bool {
        match (self.score(), self.total) {
            (Some(score), Some(total)) => {
                u64::from(score) * 100 >= u64::from(self.threshold_percent) * u64::from(total)
            }
            _ => false,
        }
    }

    /// What the result screen offers for the certificate, if anything.
    pub fn certificate_action(&self) -> Option<CertificateAction> {
        if !self.meets_threshold() {
            return None;
        }
        match (self.result.certificate_id, self.result.attempt_id) {
            (Some(certificate_id), _) => Some(CertificateAction::Download(certificate_id)),
            (None, Some(attempt_id)) => Some(CertificateAction::Generate(attempt_id)),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
#[path = "tests/result_tests.rs"]
mod tests;

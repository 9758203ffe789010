use async_trait::async_trait;
use shared::{
    cin::Cin,
    domain::{Question, VersionId},
    protocol::{AnswerSubmission, AttemptResult, AttemptSubmission, FinishAcknowledgement},
};

use crate::error::ClientError;

/// The test-taking subset of the backend API used by the session controller.
#[async_trait]
pub trait TestBackend: Send + Sync {
    async fn verify_cin(&self, cin: &Cin) -> Result<bool, ClientError>;
    async fn fetch_questions(&self, version_id: VersionId) -> Result<Vec<Question>, ClientError>;
    async fn save_answer(
        &self,
        version_id: VersionId,
        submission: &AnswerSubmission,
    ) -> Result<(), ClientError>;
    async fn finish_attempt(
        &self,
        version_id: VersionId,
        submission: &AttemptSubmission,
    ) -> Result<FinishAcknowledgement, ClientError>;
    async fn fetch_result(&self, version_id: VersionId) -> Result<AttemptResult, ClientError>;
}

use shared::{
    cin::{Cin, CinError},
    domain::{Answer, AnswerRecord, Question, QuestionId, VersionId},
    protocol::AttemptSubmission,
};
use thiserror::Error;

use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Load,
    Submit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Loading,
    InProgress,
    Submitting,
    Completed,
    Failed(FailureStage),
}

impl SessionPhase {
    /// Phases in which the attempt still accepts answers and navigation.
    pub fn is_answerable(self) -> bool {
        matches!(self, Self::InProgress | Self::Failed(FailureStage::Submit))
    }

    pub fn can_start(self) -> bool {
        matches!(
            self,
            Self::Uninitialized | Self::Completed | Self::Failed(FailureStage::Load)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitTrigger {
    User,
    TimerExpired,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid CIN: {0}")]
    InvalidCin(#[from] CinError),
    #[error("no test attempt is in progress")]
    NoActiveAttempt,
    #[error("an attempt is already in progress; submit or abandon it first")]
    AttemptInProgress,
    #[error("this test version has no questions")]
    NoQuestions,
    #[error("question {0} is not part of this test")]
    UnknownQuestion(QuestionId),
    #[error("answer every question before submitting ({answered}/{total} answered)")]
    IncompleteAnswers { answered: usize, total: usize },
    #[error("time is up; answers can no longer be changed")]
    TimeUp,
    #[error("no completed attempt to show results for")]
    NoCompletedAttempt,
    #[error(transparent)]
    Backend(#[from] ClientError),
}

impl SessionError {
    /// User-correctable errors that never touched the network.
    pub fn is_validation(&self) -> bool {
        !matches!(self, Self::Backend(_))
    }
}

/// Questions, answers and cursor of one attempt. Holds no I/O.
#[derive(Debug, Clone)]
pub struct TestSession {
    version_id: VersionId,
    cin: Cin,
    questions: Vec<Question>,
    answers: AnswerRecord,
    position: usize,
}

impl TestSession {
    pub fn new(
        version_id: VersionId,
        cin: Cin,
        questions: Vec<Question>,
    ) -> Result<Self, SessionError> {
        if questions.is_empty() {
            return Err(SessionError::NoQuestions);
        }
        Ok(Self {
            version_id,
            cin,
            questions,
            answers: AnswerRecord::new(),
            position: 0,
        })
    }

    pub fn version_id(&self) -> VersionId {
        self.version_id
    }

    pub fn cin(&self) -> &Cin {
        &self.cin
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn answers(&self) -> &AnswerRecord {
        &self.answers
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn current(&self) -> &Question {
        &self.questions[self.position]
    }

    pub fn go_next(&mut self) -> usize {
        if self.position + 1 < self.questions.len() {
            self.position += 1;
        }
        self.position
    }

    pub fn go_previous(&mut self) -> usize {
        self.position = self.position.saturating_sub(1);
        self.position
    }

    /// Jumps to `index`, clamped to the last question.
    pub fn go_to(&mut self, index: usize) -> usize {
        self.position = index.min(self.questions.len() - 1);
        self.position
    }

    pub fn record_answer(
        &mut self,
        question_id: QuestionId,
        answer: Answer,
    ) -> Result<Option<Answer>, SessionError> {
        if !self.questions.iter().any(|question| question.id == question_id) {
            return Err(SessionError::UnknownQuestion(question_id));
        }
        Ok(self.answers.upsert(question_id, answer))
    }

    pub fn answer_for(&self, question_id: QuestionId) -> Option<Answer> {
        self.answers.get(question_id)
    }

    pub fn answered_count(&self) -> usize {
        self.questions
            .iter()
            .filter(|question| self.answers.contains(question.id))
            .count()
    }

    pub fn is_complete(&self) -> bool {
        self.answered_count() == self.questions.len()
    }

    /// Zero-based indices of questions still without an answer.
    pub fn unanswered(&self) -> Vec<usize> {
        self.questions
            .iter()
            .enumerate()
            .filter(|(_, question)| !self.answers.contains(question.id))
            .map(|(index, _)| index)
            .collect()
    }

    pub fn progress_percent(&self) -> u8 {
        let percent = (self.answered_count() * 100 + self.len() / 2) / self.len();
        percent.min(100) as u8
    }

    /// Builds the final payload. User submissions require every question to be
    /// answered; timer expiry submits whatever is present.
    pub fn submission(
        &self,
        trigger: SubmitTrigger,
        time_taken_seconds: u32,
    ) -> Result<AttemptSubmission, SessionError> {
        if trigger == SubmitTrigger::User && !self.is_complete() {
            return Err(SessionError::IncompleteAnswers {
                answered: self.answered_count(),
                total: self.len(),
            });
        }
        Ok(AttemptSubmission {
            answers: self.answers.clone(),
            time_taken_seconds,
        })
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;

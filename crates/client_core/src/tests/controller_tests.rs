use super::*;
use std::{
    sync::atomic::{AtomicU32, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use shared::{
    domain::{AttemptId, LocalizedText},
    error::ErrorCode,
    protocol::{AttemptResult, AttemptSubmission},
};
use tokio::{
    sync::Semaphore,
    time::{sleep, timeout},
};

use crate::{error::ClientError, result::CertificateAction};

struct RecordingBackend {
    questions: Vec<Question>,
    load_failures: AtomicU32,
    finish_failures: AtomicU32,
    reject_saves: bool,
    cin_lookup_down: bool,
    save_gate: Option<Arc<Semaphore>>,
    saved: Mutex<Vec<AnswerSubmission>>,
    finished: Mutex<Vec<AttemptSubmission>>,
}

impl RecordingBackend {
    fn with_questions(expected: &[bool]) -> Self {
        let questions = expected
            .iter()
            .enumerate()
            .map(|(index, expected_answer)| Question {
                id: QuestionId(index as i64 + 1),
                question_code: Some(format!("Q{}", index + 1)),
                prompt: LocalizedText {
                    enonce_fr: Some(format!("Consigne {} ?", index + 1)),
                    ..LocalizedText::default()
                },
                expected_answer: *expected_answer,
                mandatory: Some(index == 0),
                points: Some(1),
                image: None,
            })
            .collect();
        Self {
            questions,
            load_failures: AtomicU32::new(0),
            finish_failures: AtomicU32::new(0),
            reject_saves: false,
            cin_lookup_down: false,
            save_gate: None,
            saved: Mutex::new(Vec::new()),
            finished: Mutex::new(Vec::new()),
        }
    }

    fn finished(&self) -> Vec<AttemptSubmission> {
        self.finished.lock().expect("finished").clone()
    }

    fn saved_count(&self) -> usize {
        self.saved.lock().expect("saved").len()
    }
}

fn unavailable() -> ClientError {
    ClientError::Api {
        status: 503,
        code: ErrorCode::Internal,
        message: "service unavailable".into(),
    }
}

fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl TestBackend for RecordingBackend {
    async fn verify_cin(&self, _cin: &Cin) -> Result<bool, ClientError> {
        if self.cin_lookup_down {
            return Err(unavailable());
        }
        Ok(true)
    }

    async fn fetch_questions(&self, _version_id: VersionId) -> Result<Vec<Question>, ClientError> {
        if take_failure(&self.load_failures) {
            return Err(unavailable());
        }
        Ok(self.questions.clone())
    }

    async fn save_answer(
        &self,
        _version_id: VersionId,
        submission: &AnswerSubmission,
    ) -> Result<(), ClientError> {
        if let Some(gate) = &self.save_gate {
            gate.acquire().await.expect("gate").forget();
        }
        if self.reject_saves {
            return Err(unavailable());
        }
        self.saved.lock().expect("saved").push(submission.clone());
        Ok(())
    }

    async fn finish_attempt(
        &self,
        _version_id: VersionId,
        submission: &AttemptSubmission,
    ) -> Result<FinishAcknowledgement, ClientError> {
        if take_failure(&self.finish_failures) {
            return Err(unavailable());
        }
        self.finished.lock().expect("finished").push(submission.clone());
        Ok(FinishAcknowledgement {
            success: Some(true),
            ..FinishAcknowledgement::default()
        })
    }

    async fn fetch_result(&self, _version_id: VersionId) -> Result<AttemptResult, ClientError> {
        let finished = self.finished();
        let last = finished.last().expect("a finished attempt");
        let score = self
            .questions
            .iter()
            .filter(|question| {
                last.answers.get(question.id).map(Answer::as_bool) == Some(question.expected_answer)
            })
            .count() as u32;
        Ok(AttemptResult {
            score: Some(score),
            attempt_id: Some(AttemptId(11)),
            ..AttemptResult::default()
        })
    }
}

fn cin() -> Cin {
    Cin::parse("ab123456").expect("cin")
}

fn controller(backend: &Arc<RecordingBackend>, pass_threshold_percent: u8) -> SessionController {
    let backend: Arc<dyn TestBackend> = backend.clone();
    SessionController::new(
        backend,
        SessionSettings {
            duration_seconds: 600,
            pass_threshold_percent,
        },
    )
}

#[tokio::test(start_paused = true)]
async fn completed_attempt_is_scored_and_offers_certificate() {
    let backend = Arc::new(RecordingBackend::with_questions(&[true, false, false]));
    let mut controller = controller(&backend, 60);

    controller.start(VersionId(3), cin()).await.expect("start");
    assert_eq!(controller.phase(), SessionPhase::InProgress);
    assert_eq!(controller.remaining_seconds(), Some(600));

    controller.answer_current(Answer::Yes).expect("q1");
    assert_eq!(controller.go_next().expect("next"), 1);
    controller.answer_current(Answer::Yes).expect("q2");

    let err = controller.submit().await.expect_err("incomplete");
    assert!(matches!(
        err,
        SessionError::IncompleteAnswers { answered: 2, total: 3 }
    ));
    assert_eq!(controller.phase(), SessionPhase::InProgress);
    assert!(backend.finished().is_empty());

    controller.go_next().expect("next");
    controller.answer_current(Answer::No).expect("q3");
    sleep(Duration::from_millis(30_500)).await;

    let completed = controller.submit().await.expect("submit");
    assert_eq!(completed.trigger, SubmitTrigger::User);
    assert_eq!(completed.time_taken_seconds, 30);
    assert_eq!(controller.phase(), SessionPhase::Completed);
    assert_eq!(controller.remaining_seconds(), None);
    assert_eq!(backend.finished()[0].answers.len(), 3);

    let view = controller.fetch_result().await.expect("result");
    assert_eq!(view.score_label(), "2/3");
    assert!(view.meets_threshold());
    assert_eq!(
        view.certificate_action(),
        Some(CertificateAction::Generate(AttemptId(11)))
    );

    let strict = ResultView::new(view.result().clone(), 3, 80);
    assert_eq!(strict.certificate_action(), None);
}

#[tokio::test(start_paused = true)]
async fn expiry_submits_partial_answers_once() {
    let backend = Arc::new(RecordingBackend::with_questions(&[true; 5]));
    let mut controller = controller(&backend, 70);
    controller.start(VersionId(1), cin()).await.expect("start");
    controller.record_answer(QuestionId(2), Answer::Yes).expect("q2");
    controller.record_answer(QuestionId(4), Answer::No).expect("q4");

    let expired = controller.expired().await;
    assert_eq!(Some(expired), controller.session_id());
    let completed = controller
        .handle_timer_expired(expired)
        .await
        .expect("forced submit")
        .expect("live attempt");

    assert_eq!(completed.trigger, SubmitTrigger::TimerExpired);
    assert_eq!(completed.answered_count, 2);
    assert_eq!(completed.time_taken_seconds, 600);
    let finished = backend.finished();
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].answers.len(), 2);

    let again = controller.handle_timer_expired(expired).await.expect("stale");
    assert!(again.is_none());
    assert_eq!(backend.finished().len(), 1);
    assert!(matches!(
        controller.record_answer(QuestionId(1), Answer::Yes),
        Err(SessionError::NoActiveAttempt)
    ));
}

#[tokio::test(start_paused = true)]
async fn failed_forced_submit_locks_answers_and_retry_skips_gate() {
    let backend = Arc::new(RecordingBackend::with_questions(&[true, true, true]));
    backend.finish_failures.store(1, Ordering::SeqCst);
    let mut controller = controller(&backend, 70);
    controller.start(VersionId(1), cin()).await.expect("start");
    controller.answer_current(Answer::Yes).expect("q1");

    let expired = controller.expired().await;
    let err = controller
        .handle_timer_expired(expired)
        .await
        .expect_err("backend down");
    assert!(matches!(err, SessionError::Backend(_)));
    assert_eq!(controller.phase(), SessionPhase::Failed(FailureStage::Submit));
    assert!(controller.is_time_up());

    assert!(matches!(
        controller.record_answer(QuestionId(2), Answer::Yes),
        Err(SessionError::TimeUp)
    ));

    let completed = controller.submit().await.expect("retry");
    assert_eq!(completed.trigger, SubmitTrigger::TimerExpired);
    assert_eq!(backend.finished()[0].answers.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn user_retry_after_failed_submit_keeps_answers() {
    let backend = Arc::new(RecordingBackend::with_questions(&[true]));
    backend.finish_failures.store(1, Ordering::SeqCst);
    let mut controller = controller(&backend, 70);
    controller.start(VersionId(1), cin()).await.expect("start");
    controller.answer_current(Answer::No).expect("q1");

    controller.submit().await.expect_err("first submit fails");
    assert_eq!(controller.phase(), SessionPhase::Failed(FailureStage::Submit));
    controller.answer_current(Answer::Yes).expect("still answerable");

    let completed = controller.submit().await.expect("retry");
    assert_eq!(completed.trigger, SubmitTrigger::User);
    assert_eq!(
        backend.finished()[0].answers.get(QuestionId(1)),
        Some(Answer::Yes)
    );
}

#[tokio::test(start_paused = true)]
async fn acknowledgements_for_abandoned_attempts_are_dropped() {
    let gate = Arc::new(Semaphore::new(0));
    let mut backend = RecordingBackend::with_questions(&[true, true]);
    backend.save_gate = Some(Arc::clone(&gate));
    let backend = Arc::new(backend);
    let mut controller = controller(&backend, 70);

    controller.start(VersionId(1), cin()).await.expect("first");
    controller.answer_current(Answer::Yes).expect("answer");
    let first = controller.session_id();
    controller.abandon();
    assert_eq!(controller.phase(), SessionPhase::Uninitialized);

    controller.start(VersionId(1), cin()).await.expect("second");
    assert_ne!(controller.session_id(), first);

    gate.add_permits(1);
    sleep(Duration::from_millis(10)).await;
    assert_eq!(backend.saved_count(), 1);
    assert_eq!(controller.confirmed_count(), 0);

    controller.answer_current(Answer::No).expect("answer");
    gate.add_permits(1);
    sleep(Duration::from_millis(10)).await;
    assert_eq!(controller.confirmed_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn persistence_failures_do_not_block_submission() {
    let mut backend = RecordingBackend::with_questions(&[true, false]);
    backend.reject_saves = true;
    backend.cin_lookup_down = true;
    let backend = Arc::new(backend);
    let mut controller = controller(&backend, 70);

    controller.start(VersionId(1), cin()).await.expect("start despite CIN lookup");
    controller.record_answer(QuestionId(1), Answer::Yes).expect("q1");
    controller.record_answer(QuestionId(2), Answer::No).expect("q2");
    sleep(Duration::from_millis(10)).await;
    assert_eq!(controller.confirmed_count(), 0);

    controller.submit().await.expect("submit");
    assert_eq!(backend.finished()[0].answers.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn load_failure_can_be_retried() {
    let backend = Arc::new(RecordingBackend::with_questions(&[true]));
    backend.load_failures.store(1, Ordering::SeqCst);
    let mut controller = controller(&backend, 70);
    let mut events = controller.subscribe();

    controller.start(VersionId(1), cin()).await.expect_err("load fails");
    assert_eq!(controller.phase(), SessionPhase::Failed(FailureStage::Load));
    assert!(controller.session().is_none());

    let mut saw_notice = false;
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::Notice(notice) = event {
            assert_eq!(notice.message(), "service unavailable");
            saw_notice = true;
        }
    }
    assert!(saw_notice);

    controller.start(VersionId(1), cin()).await.expect("retry");
    assert_eq!(controller.phase(), SessionPhase::InProgress);
}

#[tokio::test(start_paused = true)]
async fn empty_version_fails_to_load() {
    let backend = Arc::new(RecordingBackend::with_questions(&[]));
    let mut controller = controller(&backend, 70);
    let err = controller.start(VersionId(1), cin()).await.expect_err("no questions");
    assert!(matches!(err, SessionError::NoQuestions));
    assert_eq!(controller.phase(), SessionPhase::Failed(FailureStage::Load));
}

#[tokio::test(start_paused = true)]
async fn second_start_is_rejected_while_in_progress() {
    let backend = Arc::new(RecordingBackend::with_questions(&[true]));
    let mut controller = controller(&backend, 70);
    controller.start(VersionId(1), cin()).await.expect("start");
    let err = controller.start(VersionId(2), cin()).await.expect_err("busy");
    assert!(matches!(err, SessionError::AttemptInProgress));

    assert!(controller
        .handle_timer_expired(SessionId(999))
        .await
        .expect("stale id")
        .is_none());
    assert_eq!(controller.phase(), SessionPhase::InProgress);
    assert_eq!(controller.go_previous().expect("clamped"), 0);
}

#[tokio::test(start_paused = true)]
async fn expiry_does_not_wait_for_in_flight_answer_saves() {
    let gate = Arc::new(Semaphore::new(0));
    let mut backend = RecordingBackend::with_questions(&[true; 5]);
    backend.save_gate = Some(Arc::clone(&gate));
    let backend = Arc::new(backend);
    let mut controller = controller(&backend, 70);

    controller.start(VersionId(1), cin()).await.expect("start");
    controller.record_answer(QuestionId(1), Answer::Yes).expect("q1");
    controller.record_answer(QuestionId(3), Answer::No).expect("q3");

    let expired = controller.expired().await;
    let completed = controller
        .handle_timer_expired(expired)
        .await
        .expect("forced submit")
        .expect("live attempt");
    assert_eq!(completed.answered_count, 2);
    assert_eq!(backend.saved_count(), 0);
    let finished = backend.finished();
    assert_eq!(finished[0].answers.get(QuestionId(1)), Some(Answer::Yes));
    assert_eq!(finished[0].answers.get(QuestionId(3)), Some(Answer::No));

    gate.add_permits(2);
    sleep(Duration::from_millis(10)).await;
    assert_eq!(backend.saved_count(), 2);
    assert_eq!(controller.confirmed_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn expiry_left_over_from_a_closed_attempt_is_discarded_on_start() {
    let backend = Arc::new(RecordingBackend::with_questions(&[true]));
    let mut controller = controller(&backend, 70);

    controller.start(VersionId(1), cin()).await.expect("first");
    sleep(Duration::from_secs(601)).await;
    controller.abandon();

    controller.start(VersionId(1), cin()).await.expect("second");
    let pending = timeout(Duration::from_secs(5), controller.expired()).await;
    assert!(pending.is_err(), "no expiry is due for the new attempt");
    assert_eq!(controller.phase(), SessionPhase::InProgress);
    assert!(controller.session_id().is_some());
}

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use shared::{
    cin::Cin,
    domain::{Answer, Question, QuestionId, VersionId},
    protocol::{AnswerSubmission, FinishAcknowledgement},
};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::{
    backend::TestBackend,
    notice::Notice,
    result::{ResultView, DEFAULT_PASS_THRESHOLD_PERCENT},
    session::{FailureStage, SessionError, SessionPhase, SubmitTrigger, TestSession},
    timer::{Timer, TimerHandle},
};

pub const DEFAULT_TEST_DURATION_SECONDS: u32 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub duration_seconds: u32,
    pub pass_threshold_percent: u8,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            duration_seconds: DEFAULT_TEST_DURATION_SECONDS,
            pass_threshold_percent: DEFAULT_PASS_THRESHOLD_PERCENT,
        }
    }
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    PhaseChanged(SessionPhase),
    PositionChanged {
        position: usize,
        total: usize,
    },
    AnswerRecorded {
        question_id: QuestionId,
        answer: Answer,
        answered: usize,
        total: usize,
    },
    TimeUp(SessionId),
    Notice(Notice),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedAttempt {
    pub session_id: SessionId,
    pub version_id: VersionId,
    pub trigger: SubmitTrigger,
    pub question_count: usize,
    pub answered_count: usize,
    pub time_taken_seconds: u32,
    pub acknowledgement: FinishAcknowledgement,
}

/// Answers the backend has acknowledged, tagged with the attempt they belong to.
#[derive(Debug, Default)]
struct ConfirmedAnswers {
    session: Option<SessionId>,
    questions: HashSet<QuestionId>,
}

struct ActiveAttempt {
    id: SessionId,
    session: TestSession,
    timer: TimerHandle,
    time_up: bool,
}

pub struct SessionController {
    backend: Arc<dyn TestBackend>,
    settings: SessionSettings,
    phase: SessionPhase,
    active: Option<ActiveAttempt>,
    completed: Option<CompletedAttempt>,
    next_session: u64,
    confirmed: Arc<Mutex<ConfirmedAnswers>>,
    expiry_tx: mpsc::UnboundedSender<SessionId>,
    expiry_rx: mpsc::UnboundedReceiver<SessionId>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionController {
    pub fn new(backend: Arc<dyn TestBackend>, settings: SessionSettings) -> Self {
        let (expiry_tx, expiry_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(256);
        Self {
            backend,
            settings,
            phase: SessionPhase::Uninitialized,
            active: None,
            completed: None,
            next_session: 1,
            confirmed: Arc::new(Mutex::new(ConfirmedAnswers::default())),
            expiry_tx,
            expiry_rx,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn settings(&self) -> SessionSettings {
        self.settings
    }

    pub fn session(&self) -> Option<&TestSession> {
        self.active.as_ref().map(|active| &active.session)
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.active.as_ref().map(|active| active.id)
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.session().map(TestSession::current)
    }

    pub fn remaining_seconds(&self) -> Option<u32> {
        self.active.as_ref().map(|active| active.timer.remaining())
    }

    pub fn watch_remaining(&self) -> Option<watch::Receiver<u32>> {
        self.active.as_ref().map(|active| active.timer.subscribe())
    }

    pub fn is_time_up(&self) -> bool {
        self.active.as_ref().is_some_and(|active| active.time_up)
    }

    pub fn completed(&self) -> Option<&CompletedAttempt> {
        self.completed.as_ref()
    }

    /// Number of answers of the live attempt the backend has acknowledged.
    pub fn confirmed_count(&self) -> usize {
        let confirmed = lock(&self.confirmed);
        match self.session_id() {
            Some(id) if confirmed.session == Some(id) => confirmed.questions.len(),
            _ => 0,
        }
    }

    /// Loads `version_id` for `cin` and starts the countdown.
    pub async fn start(&mut self, version_id: VersionId, cin: Cin) -> Result<(), SessionError> {
        if !self.phase.can_start() {
            return Err(SessionError::AttemptInProgress);
        }
        self.completed = None;
        self.set_phase(SessionPhase::Loading);
        info!(version_id = version_id.0, "session: loading questions");

        match self.backend.verify_cin(&cin).await {
            Ok(true) => {}
            Ok(false) => warn!(version_id = version_id.0, "session: CIN not on record; continuing"),
            Err(err) => warn!(error = %err, "session: CIN verification unavailable; continuing"),
        }

        let session = match self.backend.fetch_questions(version_id).await {
            Ok(questions) => TestSession::new(version_id, cin, questions),
            Err(err) => Err(SessionError::from(err)),
        };
        let session = match session {
            Ok(session) => session,
            Err(err) => {
                warn!(version_id = version_id.0, error = %err, "session: load failed");
                self.set_phase(SessionPhase::Failed(FailureStage::Load));
                self.emit(SessionEvent::Notice(Notice::from(&err)));
                return Err(err);
            }
        };

        let id = SessionId(self.next_session);
        self.next_session += 1;
        while let Ok(stale) = self.expiry_rx.try_recv() {
            debug!(session = stale.0, "session: discarding expiry of a previous attempt");
        }
        {
            let mut confirmed = lock(&self.confirmed);
            confirmed.session = Some(id);
            confirmed.questions.clear();
        }

        let expiry_tx = self.expiry_tx.clone();
        let timer = Timer::start(self.settings.duration_seconds, move || {
            let _ = expiry_tx.send(id);
        });
        let total = session.len();
        info!(
            session = id.0,
            version_id = version_id.0,
            questions = total,
            duration_seconds = self.settings.duration_seconds,
            "session: attempt started"
        );
        self.active = Some(ActiveAttempt {
            id,
            session,
            timer,
            time_up: false,
        });
        self.set_phase(SessionPhase::InProgress);
        self.emit(SessionEvent::PositionChanged { position: 0, total });
        Ok(())
    }

    /// Records `answer` locally and persists it in the background. Persistence
    /// failures are logged only; the final submission carries every answer.
    pub fn record_answer(
        &mut self,
        question_id: QuestionId,
        answer: Answer,
    ) -> Result<(), SessionError> {
        let active = self.answerable_mut()?;
        if active.time_up {
            return Err(SessionError::TimeUp);
        }
        active.session.record_answer(question_id, answer)?;
        let session_id = active.id;
        let version_id = active.session.version_id();
        let answered = active.session.answered_count();
        let total = active.session.len();

        self.emit(SessionEvent::AnswerRecorded {
            question_id,
            answer,
            answered,
            total,
        });
        self.persist_answer(session_id, version_id, question_id, answer);
        Ok(())
    }

    pub fn answer_current(&mut self, answer: Answer) -> Result<(), SessionError> {
        let question_id = self
            .current_question()
            .map(|question| question.id)
            .ok_or(SessionError::NoActiveAttempt)?;
        self.record_answer(question_id, answer)
    }

    pub fn go_next(&mut self) -> Result<usize, SessionError> {
        self.navigate(TestSession::go_next)
    }

    pub fn go_previous(&mut self) -> Result<usize, SessionError> {
        self.navigate(TestSession::go_previous)
    }

    pub fn go_to(&mut self, index: usize) -> Result<usize, SessionError> {
        self.navigate(|session| session.go_to(index))
    }

    pub async fn submit(&mut self) -> Result<CompletedAttempt, SessionError> {
        self.submit_with(SubmitTrigger::User).await
    }

    /// Resolves with the id of the attempt whose countdown ran out. Pending
    /// forever while no countdown is running.
    pub async fn expired(&mut self) -> SessionId {
        loop {
            if let Some(id) = self.expiry_rx.recv().await {
                return id;
            }
        }
    }

    /// Force-submits the attempt `id` after its countdown expired. Expiries of
    /// attempts that are no longer live are ignored.
    pub async fn handle_timer_expired(
        &mut self,
        id: SessionId,
    ) -> Result<Option<CompletedAttempt>, SessionError> {
        let Some(active) = self.active.as_mut().filter(|active| active.id == id) else {
            debug!(session = id.0, "session: ignoring expiry of a closed attempt");
            return Ok(None);
        };
        if !self.phase.is_answerable() {
            return Ok(None);
        }
        active.time_up = true;
        info!(session = id.0, "session: time is up, submitting");
        self.emit(SessionEvent::TimeUp(id));
        self.submit_with(SubmitTrigger::TimerExpired).await.map(Some)
    }

    /// Drops the live attempt without submitting it.
    pub fn abandon(&mut self) {
        if let Some(active) = self.active.take() {
            active.timer.cancel();
            lock(&self.confirmed).session = None;
            info!(session = active.id.0, "session: attempt abandoned");
        }
        self.set_phase(SessionPhase::Uninitialized);
    }

    /// Scored result of the last completed attempt.
    pub async fn fetch_result(&self) -> Result<ResultView, SessionError> {
        let completed = self
            .completed
            .as_ref()
            .ok_or(SessionError::NoCompletedAttempt)?;
        let result = self.backend.fetch_result(completed.version_id).await?;
        Ok(ResultView::new(
            result,
            completed.question_count,
            self.settings.pass_threshold_percent,
        ))
    }

    async fn submit_with(
        &mut self,
        trigger: SubmitTrigger,
    ) -> Result<CompletedAttempt, SessionError> {
        if !self.phase.is_answerable() {
            return Err(SessionError::NoActiveAttempt);
        }
        let active = self.active.as_ref().ok_or(SessionError::NoActiveAttempt)?;
        let trigger = if active.time_up {
            SubmitTrigger::TimerExpired
        } else {
            trigger
        };
        let time_taken_seconds = self
            .settings
            .duration_seconds
            .saturating_sub(active.timer.remaining());
        let submission = match active.session.submission(trigger, time_taken_seconds) {
            Ok(submission) => submission,
            Err(err) => {
                self.emit(SessionEvent::Notice(Notice::from(&err)));
                return Err(err);
            }
        };
        let session_id = active.id;
        let version_id = active.session.version_id();
        let question_count = active.session.len();
        let answered_count = submission.answers.len();

        self.set_phase(SessionPhase::Submitting);
        info!(
            session = session_id.0,
            answered = answered_count,
            total = question_count,
            time_taken_seconds,
            ?trigger,
            "session: submitting attempt"
        );

        match self.backend.finish_attempt(version_id, &submission).await {
            Ok(acknowledgement) => {
                if let Some(active) = self.active.take() {
                    active.timer.cancel();
                }
                lock(&self.confirmed).session = None;
                let completed = CompletedAttempt {
                    session_id,
                    version_id,
                    trigger,
                    question_count,
                    answered_count,
                    time_taken_seconds,
                    acknowledgement,
                };
                self.completed = Some(completed.clone());
                self.set_phase(SessionPhase::Completed);
                Ok(completed)
            }
            Err(err) => {
                let err = SessionError::from(err);
                warn!(session = session_id.0, error = %err, "session: submission failed");
                self.set_phase(SessionPhase::Failed(FailureStage::Submit));
                self.emit(SessionEvent::Notice(Notice::from(&err)));
                Err(err)
            }
        }
    }

    fn answerable_mut(&mut self) -> Result<&mut ActiveAttempt, SessionError> {
        if !self.phase.is_answerable() {
            return Err(SessionError::NoActiveAttempt);
        }
        self.active.as_mut().ok_or(SessionError::NoActiveAttempt)
    }

    fn navigate(
        &mut self,
        step: impl FnOnce(&mut TestSession) -> usize,
    ) -> Result<usize, SessionError> {
        let active = self.answerable_mut()?;
        let position = step(&mut active.session);
        let total = active.session.len();
        self.emit(SessionEvent::PositionChanged { position, total });
        Ok(position)
    }

    fn persist_answer(
        &self,
        session_id: SessionId,
        version_id: VersionId,
        question_id: QuestionId,
        answer: Answer,
    ) {
        let backend = Arc::clone(&self.backend);
        let confirmed = Arc::clone(&self.confirmed);
        tokio::spawn(async move {
            let submission = AnswerSubmission {
                question_id,
                answer,
            };
            match backend.save_answer(version_id, &submission).await {
                Ok(()) => {
                    let mut confirmed = lock(&confirmed);
                    if confirmed.session == Some(session_id) {
                        confirmed.questions.insert(question_id);
                    } else {
                        debug!(
                            session = session_id.0,
                            question_id = question_id.0,
                            "session: dropping acknowledgement for a closed attempt"
                        );
                    }
                }
                Err(err) => warn!(
                    session = session_id.0,
                    question_id = question_id.0,
                    error = %err,
                    "session: answer not persisted; final submission still carries it"
                ),
            }
        });
    }

    fn set_phase(&mut self, phase: SessionPhase) {
        if self.phase != phase {
            debug!(from = ?self.phase, to = ?phase, "session: phase change");
            self.phase = phase;
            self.emit(SessionEvent::PhaseChanged(phase));
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

fn lock(confirmed: &Mutex<ConfirmedAnswers>) -> MutexGuard<'_, ConfirmedAnswers> {
    confirmed.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;

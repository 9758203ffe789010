pub mod api;
pub mod auth;
pub mod backend;
pub mod config;
pub mod controller;
pub mod error;
pub mod listing;
pub mod notice;
pub mod result;
pub mod session;
pub mod timer;

pub use api::{ApiClient, ImageUpload};
pub use auth::{AuthSession, SessionContext};
pub use backend::TestBackend;
pub use config::{load_settings, Settings};
pub use controller::{
    CompletedAttempt, SessionController, SessionEvent, SessionId, SessionSettings,
};
pub use error::ClientError;
pub use notice::{Notice, NoticeCategory};
pub use result::{CertificateAction, ResultView};
pub use session::{FailureStage, SessionError, SessionPhase, SubmitTrigger, TestSession};
pub use timer::{format_clock, Timer, TimerHandle};

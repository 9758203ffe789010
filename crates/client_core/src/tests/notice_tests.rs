use super::*;
use shared::{domain::QuestionId, error::ErrorCode};

#[test]
fn classifies_failures() {
    let auth = Notice::from(&ClientError::Unauthorized);
    assert!(auth.requires_reauth());

    let api = Notice::from(&ClientError::Api {
        status: 500,
        code: ErrorCode::Internal,
        message: "Version introuvable".into(),
    });
    assert_eq!(api.category(), NoticeCategory::Network);
    assert_eq!(api.message(), "Version introuvable");

    let gate = Notice::from(&SessionError::IncompleteAnswers {
        answered: 1,
        total: 3,
    });
    assert_eq!(gate.category(), NoticeCategory::Validation);
    assert!(gate.message().contains("1/3"));

    let unknown = Notice::from(&SessionError::UnknownQuestion(QuestionId(5)));
    assert!(!unknown.requires_reauth());
}

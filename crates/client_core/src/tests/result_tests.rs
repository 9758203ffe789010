use super::*;
use uuid::Uuid;

fn result(score: u32) -> AttemptResult {
    AttemptResult {
        score: Some(score),
        attempt_id: Some(AttemptId(9)),
        ..AttemptResult::default()
    }
}

#[test]
fn label_uses_question_count_when_backend_omits_total() {
    let view = ResultView::new(result(2), 3, 70);
    assert_eq!(view.score_label(), "2/3");

    let unknown = ResultView::new(AttemptResult::default(), 0, 70);
    assert_eq!(unknown.score_label(), "?/?");
    assert!(!unknown.meets_threshold());
}

#[test]
fn threshold_gates_generation() {
    let view = ResultView::new(result(2), 3, 60);
    assert!(view.meets_threshold());
    assert_eq!(
        view.certificate_action(),
        Some(CertificateAction::Generate(AttemptId(9)))
    );

    let strict = ResultView::new(result(2), 3, 80);
    assert!(!strict.meets_threshold());
    assert_eq!(strict.certificate_action(), None);

    let exact = ResultView::new(result(7), 10, 70);
    assert!(exact.meets_threshold());
}

#[test]
fn issued_certificate_is_preferred_over_generation() {
    let id = CertificateId(Uuid::new_v4());
    let with_certificate = |score| AttemptResult {
        certificate_id: Some(id),
        ..result(score)
    };

    let passed = ResultView::new(with_certificate(8), 10, 70);
    assert_eq!(passed.certificate_action(), Some(CertificateAction::Download(id)));

    let failed = ResultView::new(with_certificate(3), 10, 70);
    assert_eq!(failed.certificate_action(), None);
}

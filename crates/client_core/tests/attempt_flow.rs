use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use client_core::{
    ApiClient, SessionContext, SessionController, SessionPhase,
    SessionSettings, TestBackend,
};
use serde_json::{json, Value};
use shared::{
    cin::Cin,
    domain::{Answer, AttemptId, VersionId},
};
use tokio::{
    net::TcpListener,
    time::{sleep, Duration},
};

#[derive(Clone, Default)]
struct Backend {
    saved: Arc<Mutex<Vec<Value>>>,
    finished: Arc<Mutex<Vec<Value>>>,
}

const EXPECTED: [bool; 3] = [true, false, true];

async fn verify(Json(_body): Json<Value>) -> Json<Value> {
    Json(json!({"success": false}))
}

async fn questions(Path(version): Path<i64>) -> Json<Value> {
    let questions: Vec<Value> = EXPECTED
        .iter()
        .enumerate()
        .map(|(index, expected)| {
            json!({
                "id": index + 1,
                "question_code": format!("V{version}-Q{}", index + 1),
                "enonce_fr": format!("Consigne {} ?", index + 1),
                "reponse_correcte": expected,
                "is_mandatory": index == 0
            })
        })
        .collect();
    Json(json!({"questions": questions, "test_id": version, "version": 1}))
}

async fn reponse(State(backend): State<Backend>, Json(body): Json<Value>) -> Json<Value> {
    backend.saved.lock().expect("saved").push(body);
    Json(json!({"success": true}))
}

async fn terminer(State(backend): State<Backend>, Json(body): Json<Value>) -> Json<Value> {
    backend.finished.lock().expect("finished").push(body);
    Json(json!({"success": true}))
}

async fn resultat(State(backend): State<Backend>) -> Json<Value> {
    let finished = backend.finished.lock().expect("finished").clone();
    let answers = &finished.last().expect("finished attempt")["answers"];
    let score = EXPECTED
        .iter()
        .enumerate()
        .filter(|(index, expected)| answers[(index + 1).to_string()] == json!(expected))
        .count();
    Json(json!({
        "success": true,
        "score": score,
        "total_questions": EXPECTED.len(),
        "version": 1,
        "attempt_id": 31
    }))
}

async fn spawn_backend() -> (String, Backend) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    std::env::set_var("no_proxy", "127.0.0.1,localhost");

    let backend = Backend::default();
    let app = Router::new()
        .route("/api/test/verifier-cni", post(verify))
        .route("/api/test/:version/questions", get(questions))
        .route("/api/test/:version/reponse", post(reponse))
        .route("/api/test/:version/terminer", post(terminer))
        .route("/api/test/:version/resultat", get(resultat))
        .with_state(backend.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    (format!("http://{addr}"), backend)
}

#[tokio::test]
async fn candidate_takes_the_test_over_http() {
    let (base_url, server) = spawn_backend().await;
    let api = ApiClient::new(&base_url, SessionContext::new()).expect("client");
    let backend: Arc<dyn TestBackend> = Arc::new(api.clone());
    let mut controller = SessionController::new(backend, SessionSettings::default());

    controller
        .start(VersionId(1), Cin::parse("bk778899").expect("cin"))
        .await
        .expect("unknown CIN does not block the attempt");
    assert_eq!(controller.phase(), SessionPhase::InProgress);
    assert_eq!(controller.session().expect("session").len(), 3);

    controller.answer_current(Answer::Yes).expect("q1");
    controller.go_next().expect("next");
    controller.answer_current(Answer::Yes).expect("q2");
    controller.go_next().expect("next");
    controller.answer_current(Answer::Yes).expect("q3");

    for _ in 0..50 {
        if server.saved.lock().expect("saved").len() == 3 {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(server.saved.lock().expect("saved").len(), 3);
    assert_eq!(controller.confirmed_count(), 3);

    let completed = controller.submit().await.expect("submit");
    assert_eq!(completed.answered_count, 3);
    let finished = server.finished.lock().expect("finished").clone();
    assert_eq!(finished[0]["answers"], json!({"1": true, "2": true, "3": true}));
    assert!(finished[0]["time_taken_seconds"].as_u64().expect("seconds") < 5);

    let view = controller.fetch_result().await.expect("result");
    assert_eq!(view.score_label(), "2/3");
    assert!(!view.meets_threshold());
    assert_eq!(view.certificate_action(), None);
    assert_eq!(view.result().attempt_id, Some(AttemptId(31)));
}

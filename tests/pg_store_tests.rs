// tests/pg_store_tests.rs
//
// Runs against a real Postgres. Each test returns early when DATABASE_URL is unset.

use std::sync::Arc;

use hunt_backend::{
    config::{Config, ResubmissionPolicy},
    evaluator::{AnswerEvaluator, EvaluatorSettings},
    oracle::mock::MockOracle,
    routes,
    state::AppState,
    store::{AnswerStore, PgStore, ProgressStore},
};
use sqlx::{PgPool, postgres::PgPoolOptions};

async fn connect() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    Some(pool)
}

async fn spawn_app(pool: PgPool, oracle: Arc<MockOracle>) -> String {
    let config = Config {
        database_url: String::new(),
        jwt_secret: "pg_test_secret".to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        admin_username: None,
        admin_password: None,
        oracle_api_key: "unused".to_string(),
        oracle_base_url: "http://localhost:0".to_string(),
        oracle_model: "mock".to_string(),
        oracle_timeout_secs: 5,
        request_timeout_secs: 10,
        max_hints: 2,
        resubmission_policy: ResubmissionPolicy::LastWriteWins,
    };

    let store = Arc::new(PgStore::new(pool.clone()));
    let evaluator = AnswerEvaluator::new(store.clone(), oracle, EvaluatorSettings::from(&config));

    let state = AppState {
        pool,
        config,
        store,
        evaluator: Arc::new(evaluator),
    };

    let app = routes::create_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    address
}

fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, &uuid::Uuid::new_v4().simple().to_string()[..8])
}

/// Registers a user, optionally promotes it, and returns its bearer header.
async fn login_as(client: &reqwest::Client, address: &str, pool: &PgPool, admin: bool) -> String {
    let username = unique("user");
    let password = "password123";

    let response = client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({"username": username, "password": password}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);

    if admin {
        sqlx::query("UPDATE users SET role = 'admin' WHERE username = $1")
            .bind(&username)
            .execute(pool)
            .await
            .unwrap();
    }

    let body: serde_json::Value = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({"username": username, "password": password}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    format!("Bearer {}", body["token"].as_str().unwrap())
}

#[tokio::test]
async fn hunt_flow_against_postgres() {
    let Some(pool) = connect().await else { return };
    let oracle = Arc::new(MockOracle::with_fixed_response("Score: 8\nExplanation: Close enough."));
    let address = spawn_app(pool.clone(), oracle.clone()).await;
    let client = reqwest::Client::new();

    let admin = login_as(&client, &address, &pool, true).await;
    let player = login_as(&client, &address, &pool, false).await;

    // 1. Admin creates the event and its questions
    let slug = unique("hunt");
    let event: serde_json::Value = client
        .post(format!("{}/api/admin/events", address))
        .header("Authorization", &admin)
        .json(&serde_json::json!({"slug": slug, "name": "Old Town Hunt"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let event_id = event["id"].as_i64().unwrap();

    let forbidden = client
        .post(format!("{}/api/admin/events", address))
        .header("Authorization", &player)
        .json(&serde_json::json!({"slug": unique("nope"), "name": "Nope"}))
        .send()
        .await
        .unwrap();
    assert_eq!(forbidden.status().as_u16(), 403);

    let mut question_ids = Vec::new();
    for body in [
        serde_json::json!({
            "type": "text",
            "content": "What is carved above the town hall door?",
            "expectedAnswer": "A lion",
            "aiThreshold": 6,
            "hintEnabled": true
        }),
        serde_json::json!({
            "type": "multiple_choice",
            "content": "Which bridge is oldest?",
            "options": {"a": "Stone bridge", "b": "Iron bridge"},
            "expectedAnswer": "a"
        }),
    ] {
        let created: serde_json::Value = client
            .post(format!("{}/api/admin/events/{}/questions", address, event_id))
            .header("Authorization", &admin)
            .json(&body)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        question_ids.push(created["id"].as_i64().unwrap());
    }

    // 2. Player registers and answers
    let registration = client
        .post(format!("{}/api/events/{}/register", address, slug))
        .header("Authorization", &player)
        .send()
        .await
        .unwrap();
    assert_eq!(registration.status().as_u16(), 201);

    let hint = client
        .post(format!("{}/api/events/{}/hints", address, slug))
        .header("Authorization", &player)
        .json(&serde_json::json!({"questionId": question_ids[0]}))
        .send()
        .await
        .unwrap();
    assert_eq!(hint.status().as_u16(), 200);

    let text: serde_json::Value = client
        .post(format!("{}/api/events/{}/answers", address, slug))
        .header("Authorization", &player)
        .json(&serde_json::json!({"questionId": question_ids[0], "submission": "a lion"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(text["status"], "correct");
    assert_eq!(text["completed"], false);

    // Resubmitting the same question does not double count
    let again: serde_json::Value = client
        .post(format!("{}/api/events/{}/answers", address, slug))
        .header("Authorization", &player)
        .json(&serde_json::json!({"questionId": question_ids[0], "submission": "the lion"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(again["stats"]["correctCount"], 1);

    let choice: serde_json::Value = client
        .post(format!("{}/api/events/{}/answers", address, slug))
        .header("Authorization", &player)
        .json(&serde_json::json!({"questionId": question_ids[1], "submission": "a"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(choice["completed"], true);
    assert_eq!(choice["stats"]["correctCount"], 2);
    assert_eq!(choice["stats"]["totalQuestions"], 2);

    // 3. Stored state
    let store = PgStore::new(pool.clone());
    let progress_id = choice_progress_id(&pool, event_id).await;
    let answers = store.list_answers(progress_id).await.unwrap();
    assert_eq!(answers.len(), 2);
    let text_answer = answers.iter().find(|a| a.question_id == question_ids[0]).unwrap();
    assert_eq!(text_answer.hint_count, 1);
    assert_eq!(text_answer.recent_attempts.len(), 2);

    // 4. Admin dashboard shows the finisher
    let dashboard: serde_json::Value = client
        .get(format!("{}/api/admin/events/{}/progress", address, event_id))
        .header("Authorization", &admin)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(dashboard[0]["completed"], true);
    assert_eq!(dashboard[0]["correctCount"], 2);

    // The multiple choice answer never reached the oracle
    assert_eq!(oracle.call_count(), 3);
}

async fn choice_progress_id(pool: &PgPool, event_id: i64) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT id FROM progress WHERE event_id = $1")
        .bind(event_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn re_registration_resets_progress() {
    let Some(pool) = connect().await else { return };
    let store = PgStore::new(pool.clone());

    let user_id: i64 = sqlx::query_scalar(
        "INSERT INTO users (username, password) VALUES ($1, 'x') RETURNING id",
    )
    .bind(unique("reset"))
    .fetch_one(&pool)
    .await
    .unwrap();
    let event_id: i64 =
        sqlx::query_scalar("INSERT INTO events (slug, name) VALUES ($1, 'Reset') RETURNING id")
            .bind(unique("reset"))
            .fetch_one(&pool)
            .await
            .unwrap();
    let question_id: i64 = sqlx::query_scalar(
        "INSERT INTO questions (event_id, type, content, expected_answer) VALUES ($1, 'text', 'Q', 'A') RETURNING id",
    )
    .bind(event_id)
    .fetch_one(&pool)
    .await
    .unwrap();

    let first = store
        .register_progress(user_id, event_id, &[question_id])
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO answers (progress_id, question_id, status, ai_score) VALUES ($1, $2, 'correct', 9)",
    )
    .bind(first.id)
    .bind(question_id)
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query("UPDATE progress SET completed = TRUE WHERE id = $1")
        .bind(first.id)
        .execute(&pool)
        .await
        .unwrap();

    let second = store
        .register_progress(user_id, event_id, &[question_id])
        .await
        .unwrap();

    assert_eq!(second.id, first.id);
    assert!(!second.completed);
    assert_eq!(store.count_correct(second.id).await.unwrap(), 0);
    assert_eq!(store.question_count(second.id).await.unwrap(), 1);
}

#[tokio::test]
async fn deleting_a_question_keeps_the_hunt_completable() {
    let Some(pool) = connect().await else { return };
    let oracle = Arc::new(MockOracle::with_fixed_response("Score: 9\nExplanation: Yes."));
    let address = spawn_app(pool.clone(), oracle).await;
    let client = reqwest::Client::new();

    let admin = login_as(&client, &address, &pool, true).await;
    let early = login_as(&client, &address, &pool, false).await;
    let late = login_as(&client, &address, &pool, false).await;

    let slug = unique("shrink");
    let event: serde_json::Value = client
        .post(format!("{}/api/admin/events", address))
        .header("Authorization", &admin)
        .json(&serde_json::json!({"slug": slug, "name": "Shrinking Hunt"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let event_id = event["id"].as_i64().unwrap();

    let mut question_ids = Vec::new();
    for content in ["First clue", "Second clue", "Third clue"] {
        let created: serde_json::Value = client
            .post(format!("{}/api/admin/events/{}/questions", address, event_id))
            .header("Authorization", &admin)
            .json(&serde_json::json!({"type": "text", "content": content, "expectedAnswer": "yes"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        question_ids.push(created["id"].as_i64().unwrap());
    }

    for player in [&early, &late] {
        let registration = client
            .post(format!("{}/api/events/{}/register", address, slug))
            .header("Authorization", player)
            .send()
            .await
            .unwrap();
        assert_eq!(registration.status().as_u16(), 201);
    }

    // The early player answers the two questions that will remain
    for qid in &question_ids[..2] {
        let answer: serde_json::Value = client
            .post(format!("{}/api/events/{}/answers", address, slug))
            .header("Authorization", &early)
            .json(&serde_json::json!({"questionId": qid, "submission": "yes"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(answer["completed"], false);
    }

    let deleted = client
        .delete(format!("{}/api/admin/questions/{}", address, question_ids[2]))
        .header("Authorization", &admin)
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status().as_u16(), 204);

    // The deletion itself completes the early player's hunt
    let early_view: serde_json::Value = client
        .get(format!("{}/api/events/{}/progress", address, slug))
        .header("Authorization", &early)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(early_view["completed"], true);
    assert_eq!(early_view["stats"]["totalQuestions"], 2);

    // The late player finishes with the two remaining questions
    let late_view: serde_json::Value = client
        .get(format!("{}/api/events/{}/progress", address, slug))
        .header("Authorization", &late)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(late_view["questions"].as_array().unwrap().len(), 2);
    assert_eq!(late_view["stats"]["totalQuestions"], 2);

    let mut last = serde_json::Value::Null;
    for qid in &question_ids[..2] {
        last = client
            .post(format!("{}/api/events/{}/answers", address, slug))
            .header("Authorization", &late)
            .json(&serde_json::json!({"questionId": qid, "submission": "yes"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
    }
    assert_eq!(last["completed"], true);
    assert_eq!(last["stats"]["correctCount"], 2);
    assert_eq!(last["stats"]["totalQuestions"], 2);

    let removed = client
        .post(format!("{}/api/events/{}/answers", address, slug))
        .header("Authorization", &late)
        .json(&serde_json::json!({"questionId": question_ids[2], "submission": "yes"}))
        .send()
        .await
        .unwrap();
    assert_eq!(removed.status().as_u16(), 404);
}

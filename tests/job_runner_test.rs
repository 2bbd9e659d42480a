mod common;

use common::{chat_completion_body, create_test_db, test_pipeline};
use decision_engine::services::{CreditEngine, JobRunner};
use serde_json::json;
use sqlx::SqlitePool;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn insert_job(pool: &SqlitePool, user_id: &str, rows: serde_json::Value, deep_search: bool) -> i64 {
    let mappings = json!({ "company_name": "Company", "location": "City" });
    let result = sqlx::query(
        "INSERT INTO jobs (user_id, support_id, filename, status, total_companies, column_mappings, \
         companies_data, selected_platforms, options) VALUES (?, 'supp', 'rows.csv', 'queued', ?, ?, ?, '[]', ?)",
    )
    .bind(user_id)
    .bind(rows.as_array().map(|a| a.len()).unwrap_or(0) as i64)
    .bind(mappings.to_string())
    .bind(rows.to_string())
    .bind(json!({ "deep_search": deep_search, "job_titles": [] }).to_string())
    .execute(pool)
    .await
    .unwrap();

    result.last_insert_rowid()
}

async fn job_row(pool: &SqlitePool, job_id: i64) -> (String, Option<String>, i64, i64) {
    sqlx::query_as(
        "SELECT status, stop_reason, decision_makers_found, credits_spent FROM jobs WHERE id = ?",
    )
    .bind(job_id)
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn processed_companies(pool: &SqlitePool, job_id: i64) -> i64 {
    sqlx::query_as("SELECT processed_companies FROM jobs WHERE id = ?")
        .bind(job_id)
        .fetch_one(pool)
        .await
        .map(|(v,): (i64,)| v)
        .unwrap()
}

#[tokio::test]
async fn clean_single_company_job_produces_contact_and_spends_one_credit() {
    let pool = create_test_db().await;
    let credits = Arc::new(CreditEngine::new(pool.clone()));
    credits.grant_monthly("user-1", 20, chrono::Utc::now() + chrono::Duration::days(30), "trial").await.unwrap();

    let search_server = MockServer::start().await;
    let llm_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "organic": [] })))
        .mount(&search_server)
        .await;

    let extraction = json!({
        "people": [{
            "name": "Jane Smith",
            "title": "Chief Executive Officer",
            "platform": "linkedin",
            "profile_url": "https://linkedin.com/in/janesmith",
            "confidence": "HIGH",
            "emails_found": [],
        }],
        "company": { "company_website": "acme.example.com", "company_type": "Manufacturing" },
    });
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion_body(&extraction.to_string())))
        .mount(&llm_server)
        .await;

    let pipeline = test_pipeline(&search_server, &llm_server).await;
    let runner = JobRunner::new(pool.clone(), pipeline, Arc::clone(&credits), 5, 10, 1.0, 1.0, 1.0);

    let rows = json!([{ "Company": "Acme Corp", "City": "Austin" }]);
    let job_id = insert_job(&pool, "user-1", rows, false).await;

    runner.run(job_id).await.unwrap();

    let (status, stop_reason, dm_found, spent) = job_row(&pool, job_id).await;
    assert_eq!(status, "completed");
    assert_eq!(stop_reason, None);
    assert_eq!(dm_found, 1);
    assert_eq!(spent, 1);

    let names: Vec<(String,)> =
        sqlx::query_as("SELECT name FROM decision_makers WHERE job_id = ?").bind(job_id).fetch_all(&pool).await.unwrap();
    assert_eq!(names, vec![("Jane Smith".to_string(),)]);

    let balance = credits.recalculate_effective_balance("user-1", chrono::Utc::now()).await.unwrap();
    assert_eq!(balance, 19);
}

#[tokio::test]
async fn hallucinated_placeholder_person_is_filtered_and_no_credit_spent() {
    let pool = create_test_db().await;
    let credits = Arc::new(CreditEngine::new(pool.clone()));
    credits.grant_monthly("user-1", 20, chrono::Utc::now() + chrono::Duration::days(30), "trial").await.unwrap();

    let search_server = MockServer::start().await;
    let llm_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "organic": [] })))
        .mount(&search_server)
        .await;

    let extraction = json!({
        "people": [{
            "name": "John Doe",
            "title": "Chief Executive Officer",
            "platform": "linkedin",
            "profile_url": "https://linkedin.com/in/johndoe",
            "confidence": "LOW",
            "emails_found": [],
        }],
        "company": {},
    });
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion_body(&extraction.to_string())))
        .mount(&llm_server)
        .await;

    let pipeline = test_pipeline(&search_server, &llm_server).await;
    let runner = JobRunner::new(pool.clone(), pipeline, Arc::clone(&credits), 5, 10, 1.0, 1.0, 1.0);

    let rows = json!([{ "Company": "Acme Corp", "City": "Austin" }]);
    let job_id = insert_job(&pool, "user-1", rows, false).await;

    runner.run(job_id).await.unwrap();

    let (status, stop_reason, dm_found, spent) = job_row(&pool, job_id).await;
    assert_eq!(status, "completed");
    assert_eq!(stop_reason, None);
    assert_eq!(dm_found, 0);
    assert_eq!(spent, 0);

    let balance = credits.recalculate_effective_balance("user-1", chrono::Utc::now()).await.unwrap();
    assert_eq!(balance, 20);
}

#[tokio::test]
async fn job_stops_with_credits_exhausted_once_balance_runs_out() {
    let pool = create_test_db().await;
    let credits = Arc::new(CreditEngine::new(pool.clone()));
    // One credit only: the first row succeeds, the second can't be billed.
    credits.grant_monthly("user-1", 1, chrono::Utc::now() + chrono::Duration::days(30), "trial").await.unwrap();

    let search_server = MockServer::start().await;
    let llm_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "organic": [] })))
        .mount(&search_server)
        .await;

    let extraction = json!({
        "people": [{
            "name": "Jane Smith",
            "title": "Founder",
            "platform": "linkedin",
            "profile_url": "https://linkedin.com/in/janesmith",
            "confidence": "HIGH",
            "emails_found": [],
        }],
        "company": {},
    });
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion_body(&extraction.to_string())))
        .mount(&llm_server)
        .await;

    let pipeline = test_pipeline(&search_server, &llm_server).await;
    // Batch of 1 forces each row through its own commit, so the stop takes
    // effect before the second row ever runs.
    let runner = JobRunner::new(pool.clone(), pipeline, Arc::clone(&credits), 1, 10, 1.0, 1.0, 1.0);

    let rows = json!([
        { "Company": "Acme Corp", "City": "Austin" },
        { "Company": "Globex Inc", "City": "Dallas" },
    ]);
    let job_id = insert_job(&pool, "user-1", rows, false).await;

    runner.run(job_id).await.unwrap();

    let (status, stop_reason, dm_found, spent) = job_row(&pool, job_id).await;
    assert_eq!(status, "completed");
    assert_eq!(stop_reason.as_deref(), Some("credits_exhausted"));
    assert_eq!(dm_found, 1);
    assert_eq!(spent, 1);
    // Row 2 triggers the exhaustion break before its own processed_companies
    // increment, so only row 1 counts as processed.
    assert_eq!(processed_companies(&pool, job_id).await, 1);
}

#[tokio::test]
async fn cancelled_job_is_left_untouched_by_the_runner() {
    let pool = create_test_db().await;
    let credits = Arc::new(CreditEngine::new(pool.clone()));
    credits.grant_monthly("user-1", 20, chrono::Utc::now() + chrono::Duration::days(30), "trial").await.unwrap();

    let search_server = MockServer::start().await;
    let llm_server = MockServer::start().await;
    let pipeline = test_pipeline(&search_server, &llm_server).await;
    let runner = JobRunner::new(pool.clone(), pipeline, Arc::clone(&credits), 5, 10, 1.0, 1.0, 1.0);

    let rows = json!([{ "Company": "Acme Corp", "City": "Austin" }]);
    let job_id = insert_job(&pool, "user-1", rows, false).await;

    sqlx::query("UPDATE jobs SET status = 'cancelled' WHERE id = ?").bind(job_id).execute(&pool).await.unwrap();

    runner.run(job_id).await.unwrap();

    let (status, _, dm_found, spent) = job_row(&pool, job_id).await;
    assert_eq!(status, "cancelled");
    assert_eq!(dm_found, 0);
    assert_eq!(spent, 0);
}

#[tokio::test]
async fn missing_user_id_fails_the_job_without_calling_any_provider() {
    let pool = create_test_db().await;
    let credits = Arc::new(CreditEngine::new(pool.clone()));

    let search_server = MockServer::start().await;
    let llm_server = MockServer::start().await;
    let pipeline = test_pipeline(&search_server, &llm_server).await;
    let runner = JobRunner::new(pool.clone(), pipeline, Arc::clone(&credits), 5, 10, 1.0, 1.0, 1.0);

    let rows = json!([{ "Company": "Acme Corp", "City": "Austin" }]);
    let job_id = insert_job(&pool, "  ", rows, false).await;

    runner.run(job_id).await.unwrap();

    let (status, stop_reason, _, _) = job_row(&pool, job_id).await;
    assert_eq!(status, "failed");
    assert_eq!(stop_reason.as_deref(), Some("missing_user"));
}

//! A small job-board API used as the target of integration tests and demo runs.
//!
//! Read routes answer with canned JSON under `/rest/v1/*` and require an `apikey` header.
//! `POST /auth/v1/signup` accepts an email once and answers `422` for duplicates.
use axum::{
    debug_handler,
    extract::{Path, Query},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use lazy_static::lazy_static;
#[allow(unused)]
use metrics::{counter, gauge, histogram};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, RwLock};
use std::{
    num::NonZeroU32,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use tower_http::trace::TraceLayer;
use tracing::debug;

pub const JOB_COUNT: usize = 20;

pub fn router() -> Router {
    Router::new()
        .route("/delay/ms/:delay_ms", get(delay))
        .route("/status/:code", get(status))
        .route("/limited/:max_tps/server/:server_id", get(limited))
        .route("/rest/v1/jobs", get(jobs))
        .route("/rest/v1/:table", get(table))
        .route("/auth/v1/signup", post(signup))
        .layer(TraceLayer::new_for_http())
}

pub async fn run(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    debug!("Mock service listening on {addr}");
    axum::serve(listener, router()).await?;
    Ok(())
}

#[debug_handler]
pub async fn delay(Path(delay_ms): Path<u64>) {
    measure();
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
}

#[debug_handler]
pub async fn status(Path(code): Path<u16>) -> StatusCode {
    measure();
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

lazy_static! {
    static ref LIMITED_MAP: Arc<RwLock<HashMap<String, Arc<DefaultDirectRateLimiter>>>> =
        Arc::new(RwLock::new(HashMap::new()));
}

/// Answers `429` once `server_id` exceeds `max_tps`.
#[debug_handler]
pub async fn limited(
    Path((max_tps, server_id)): Path<(u32, String)>,
) -> Result<(), StatusCode> {
    measure();

    let read = LIMITED_MAP.read().unwrap().get(&server_id).cloned();
    let limiter = if let Some(limiter) = read {
        limiter
    } else {
        let limiter = Arc::new(rate_limiter(max_tps).ok_or(StatusCode::BAD_REQUEST)?);
        LIMITED_MAP
            .write()
            .unwrap()
            .entry(server_id)
            .or_insert(limiter)
            .clone()
    };

    limiter.check().map_err(|_| StatusCode::TOO_MANY_REQUESTS)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub title: String,
    pub company: String,
}

fn all_jobs() -> Vec<Job> {
    let titles = ["desenvolvedor", "designer", "marketing", "vendas"];
    (0..JOB_COUNT)
        .map(|i| Job {
            id: format!("job-{i:03}"),
            title: format!("{} {i}", titles[i % titles.len()]),
            company: format!("company-{}", i % 5),
        })
        .collect()
}

#[debug_handler]
pub async fn jobs(
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<Job>>, StatusCode> {
    authorize(&headers)?;
    jitter().await;

    let jobs = all_jobs();
    let jobs = match params.get("id").and_then(|f| f.strip_prefix("eq.")) {
        Some(id) => jobs.into_iter().filter(|j| j.id == id).collect(),
        None => jobs,
    };
    Ok(Json(jobs))
}

#[debug_handler]
pub async fn table(
    headers: HeaderMap,
    Path(table): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    authorize(&headers)?;
    jitter().await;

    let rows = match table.as_str() {
        "profiles" | "applications" | "matches" | "notifications" => 10,
        _ => return Err(StatusCode::NOT_FOUND),
    };

    if params.get("select").map(String::as_str) == Some("count") {
        return Ok(Json(json!([{ "count": rows }])));
    }

    let rows: Vec<Value> = (0..rows)
        .map(|i| json!({ "id": format!("{table}-{i}"), "created_at": i }))
        .collect();
    Ok(Json(Value::Array(rows)))
}

#[derive(Debug, Deserialize)]
pub struct Signup {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub data: Value,
}

lazy_static! {
    static ref SIGNUPS: Mutex<HashSet<String>> = Mutex::new(HashSet::new());
}

#[debug_handler]
pub async fn signup(
    headers: HeaderMap,
    Json(signup): Json<Signup>,
) -> Result<Json<Value>, StatusCode> {
    authorize(&headers)?;
    jitter().await;

    if !signup.email.contains('@') || signup.password.len() < 6 {
        return Err(StatusCode::BAD_REQUEST);
    }
    if !SIGNUPS.lock().unwrap().insert(signup.email.clone()) {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }
    Ok(Json(json!({ "email": signup.email, "user_metadata": signup.data })))
}

/** Utils **/

fn authorize(headers: &HeaderMap) -> Result<(), StatusCode> {
    measure();
    if headers.contains_key("apikey") {
        Ok(())
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

/// A few milliseconds of normally distributed service time.
async fn jitter() {
    let ms = {
        let normal: Normal<f64> = Normal::new(5., 2.).unwrap();
        normal.sample(&mut rand::thread_rng()).max(0.)
    };
    tokio::time::sleep(Duration::from_secs_f64(ms / 1000.)).await;
}

pub fn rate_limiter(tps: u32) -> Option<DefaultDirectRateLimiter> {
    Some(RateLimiter::direct(Quota::per_second(NonZeroU32::new(tps)?)))
}

/** TPS Printer **/

static TPS_MEASURE: AtomicU64 = AtomicU64::new(0);

fn measure() {
    counter!("mock-service.requests").increment(1);
    TPS_MEASURE.fetch_add(1, Ordering::Relaxed);
}

pub async fn tps_measure_task() {
    loop {
        tokio::time::sleep(Duration::from_millis(1000)).await;
        let requests = TPS_MEASURE.swap(0, Ordering::Relaxed);
        if requests > 0 {
            println!("{requests} TPS");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_ids_are_unique() {
        let jobs = all_jobs();
        let ids: HashSet<_> = jobs.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids.len(), JOB_COUNT);
    }

    #[test]
    fn zero_tps_has_no_limiter() {
        assert!(rate_limiter(0).is_none());
        assert!(rate_limiter(10).is_some());
    }

    #[tokio::test]
    async fn duplicate_signup_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert("apikey", "anon".parse().unwrap());
        let payload = || Signup {
            email: "dup@loadtest.com".into(),
            password: "TestPassword123!".into(),
            data: Value::Null,
        };

        assert!(signup(headers.clone(), Json(payload())).await.is_ok());
        assert_eq!(
            signup(headers, Json(payload())).await.unwrap_err(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[tokio::test]
    async fn reads_require_apikey() {
        let res = jobs(HeaderMap::new(), Query(HashMap::new())).await;
        assert_eq!(res.unwrap_err(), StatusCode::UNAUTHORIZED);
    }
}

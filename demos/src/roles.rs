//! The job board's user roles, as data.
//!
//! Every role is a row in [`ROLES`]: think time, which default headers it sends and its
//! weighted tasks. [`registry`] turns the table into profiles for a given API key.
use horde::prelude::*;
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{json, Value};
use std::time::Duration;

/// Session key holding the job ids from the latest job listing.
pub const JOBS: &str = "jobs";

pub const SEARCH_TERMS: [&str; 4] = ["desenvolvedor", "designer", "marketing", "vendas"];

pub const SIGNUP_PASSWORD: &str = "TestPassword123!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Header {
    /// `apikey: <key>`
    ApiKey,
    /// `Authorization: Bearer <key>`, set when the session starts.
    Bearer,
    Json,
    /// `Prefer: return=representation`
    Representation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Get(&'static str),
    /// GET, then remember the listed job ids in the session. An empty listing forgets
    /// the ids from earlier ones.
    ListJobs(&'static str),
    /// GET one of the remembered jobs; skipped until a listing succeeded.
    JobDetails,
    /// GET with a random search term in place of `{term}`.
    Search(&'static str),
    /// Sign up a new account with the given role. Duplicate or rejected signups
    /// (400/422) are expected behavior, not failures.
    Signup(&'static str),
}

#[derive(Debug, Clone, Copy)]
pub struct TaskRow {
    pub name: &'static str,
    pub weight: u32,
    pub action: Action,
}

#[derive(Debug, Clone, Copy)]
pub struct Role {
    pub class: &'static str,
    pub wait_secs: (u64, u64),
    pub headers: &'static [Header],
    pub tasks: &'static [TaskRow],
}

const fn task(name: &'static str, weight: u32, action: Action) -> TaskRow {
    TaskRow {
        name,
        weight,
        action,
    }
}

pub const ROLES: [Role; 4] = [
    Role {
        class: "candidate",
        wait_secs: (1, 3),
        headers: &[Header::ApiKey, Header::Bearer, Header::Json, Header::Representation],
        tasks: &[
            task(
                "GET /jobs",
                3,
                Action::ListJobs(
                    "/rest/v1/jobs?select=*,company_profiles(fantasy_name,logo_url)&order=created_at.desc&limit=20",
                ),
            ),
            task("GET /job-details", 2, Action::JobDetails),
            task(
                "GET /search-jobs",
                1,
                Action::Search(
                    "/rest/v1/jobs?or=(title.ilike.%25{term}%25,description.ilike.%25{term}%25)&limit=20",
                ),
            ),
            task("GET /profiles", 1, Action::Get("/rest/v1/profiles?select=*&limit=20")),
        ],
    },
    Role {
        class: "company",
        wait_secs: (2, 5),
        headers: &[Header::ApiKey, Header::Bearer, Header::Json, Header::Representation],
        tasks: &[
            task("GET /candidates", 3, Action::Get("/rest/v1/profiles?select=*&limit=20")),
            task(
                "GET /company-jobs",
                2,
                Action::Get("/rest/v1/jobs?select=*&order=created_at.desc&limit=10"),
            ),
            task(
                "GET /applications",
                1,
                Action::Get("/rest/v1/applications?select=*,profiles(*),jobs(*)&limit=20"),
            ),
            task(
                "GET /matches",
                1,
                Action::Get("/rest/v1/matches?select=*,profiles(*),jobs(*)&limit=20"),
            ),
        ],
    },
    Role {
        class: "auth",
        wait_secs: (5, 10),
        headers: &[Header::ApiKey, Header::Json],
        tasks: &[
            task("POST /auth/signup", 1, Action::Signup("candidate")),
            task("POST /auth/signup-company", 1, Action::Signup("company")),
        ],
    },
    Role {
        class: "notification",
        wait_secs: (3, 6),
        headers: &[Header::ApiKey, Header::Bearer, Header::Json],
        tasks: &[
            task(
                "GET /notifications",
                5,
                Action::Get("/rest/v1/notifications?select=*&order=created_at.desc&limit=20"),
            ),
            task(
                "GET /notifications/unread-count",
                1,
                Action::Get("/rest/v1/notifications?select=count&read=eq.false"),
            ),
        ],
    },
];

pub fn role(class: &str) -> Option<&'static Role> {
    ROLES.iter().find(|r| r.class == class)
}

/// Every role, ready to run against a backend accepting `api_key`.
pub fn registry(api_key: &str) -> Result<TaskRegistry, ConfigError> {
    let mut registry = TaskRegistry::new();
    for role in &ROLES {
        registry.register(role.profile(api_key)?)?;
    }
    Ok(registry)
}

impl Role {
    pub fn profile(&self, api_key: &str) -> Result<UserClassProfile, ConfigError> {
        let mut builder = UserClassProfile::builder(self.class).wait_between(
            Duration::from_secs(self.wait_secs.0),
            Duration::from_secs(self.wait_secs.1),
        );

        for header in self.headers {
            builder = match header {
                Header::ApiKey => builder.header("apikey", api_key),
                Header::Json => builder.header("Content-Type", "application/json"),
                Header::Representation => builder.header("Prefer", "return=representation"),
                Header::Bearer => builder.on_start(|session| {
                    let key = session
                        .header("apikey")
                        .ok_or_else(|| ActionError::MissingData("apikey".into()))?
                        .to_string();
                    session.set_header("Authorization", format!("Bearer {key}"));
                    Ok(())
                }),
            };
        }

        builder.tasks(self.tasks.iter().map(TaskRow::spec)).build()
    }
}

impl TaskRow {
    pub fn spec(&self) -> TaskSpec {
        let spec = match self.action {
            Action::Get(path) => TaskSpec::get(self.name, path),
            Action::ListJobs(path) => TaskSpec::get(self.name, path).after(remember_jobs),
            Action::JobDetails => TaskSpec::new(self.name, job_details),
            Action::Search(template) => {
                TaskSpec::new(self.name, move |session| Ok(Some(search(session, template))))
            }
            Action::Signup(role) => TaskSpec::new(self.name, move |session| signup(session, role))
                .classify(AcceptStatus::new(&[400, 422])),
        };
        spec.weight(self.weight)
    }
}

fn remember_jobs(session: &mut Session, res: &HttpResponse) -> Result<(), ActionError> {
    let jobs: Vec<Value> = res.json()?;
    let ids: Vec<String> = jobs
        .iter()
        .filter_map(|job| match job.get("id")? {
            Value::String(id) => Some(id.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        })
        .collect();

    if ids.is_empty() {
        session.remove::<Vec<String>>(JOBS);
    } else {
        session.insert(JOBS, ids);
    }
    Ok(())
}

fn job_details(session: &mut Session) -> Result<Option<TaskRequest>, ActionError> {
    let count = session.get::<Vec<String>>(JOBS).map_or(0, Vec::len);
    if count == 0 {
        return Ok(None);
    }

    let idx = session.rng().gen_range(0..count);
    let id = session
        .get::<Vec<String>>(JOBS)
        .and_then(|jobs| jobs.get(idx))
        .ok_or_else(|| ActionError::MissingData(JOBS.into()))?;
    Ok(Some(TaskRequest::get(&format!(
        "/rest/v1/jobs?id=eq.{id}&select=*,company_profiles(*)"
    ))))
}

fn search(session: &mut Session, template: &str) -> TaskRequest {
    let term = SEARCH_TERMS
        .choose(session.rng())
        .copied()
        .unwrap_or(SEARCH_TERMS[0]);
    TaskRequest::get(&template.replace("{term}", term))
}

fn signup(session: &mut Session, role: &str) -> Result<Option<TaskRequest>, ActionError> {
    let rng = session.rng();
    let email = format!("{role}_{}@loadtest.com", rng.gen_range(1000..=9999));
    let full_name = format!("{} Test {}", capitalize(role), rng.gen_range(1..=1000));

    let payload = json!({
        "email": email,
        "password": SIGNUP_PASSWORD,
        "data": {
            "role": role,
            "full_name": full_name,
        }
    });
    Ok(Some(TaskRequest::post("/auth/v1/signup").json(&payload)?))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

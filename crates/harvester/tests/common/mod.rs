//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use harvester::clone::{CloneError, CloneJob, RepoCloner};
use harvester::http::{HttpError, HttpRequest, HttpResponse, HttpTransport};
use harvester::{ClientConfig, OwnerKind, RateLimitedClient, ResourceDescriptor, Snapshot};

pub const API: &str = "https://api.test";

/// Scripted in-memory transport keyed by URL.
///
/// Queued responses are served first, then the sticky fallback.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    inner: Arc<Mutex<Script>>,
}

#[derive(Default)]
struct Script {
    queued: HashMap<String, VecDeque<HttpResponse>>,
    sticky: HashMap<String, HttpResponse>,
    requests: Vec<String>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, url: impl Into<String>, response: HttpResponse) {
        self.inner
            .lock()
            .unwrap()
            .queued
            .entry(url.into())
            .or_default()
            .push_back(response);
    }

    pub fn always(&self, url: impl Into<String>, response: HttpResponse) {
        self.inner.lock().unwrap().sticky.insert(url.into(), response);
    }

    pub fn requests(&self) -> Vec<String> {
        self.inner.lock().unwrap().requests.clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut script = self.inner.lock().unwrap();
        script.requests.push(request.url.clone());
        if let Some(response) = script
            .queued
            .get_mut(&request.url)
            .and_then(VecDeque::pop_front)
        {
            return Ok(response);
        }
        script
            .sticky
            .get(&request.url)
            .cloned()
            .ok_or_else(|| HttpError::Unscripted {
                url: request.url.clone(),
            })
    }
}

pub fn client(transport: &ScriptedTransport) -> RateLimitedClient {
    let config = ClientConfig::new().with_api_url(API);
    RateLimitedClient::with_transport(config, Arc::new(transport.clone())).unwrap()
}

pub fn ok_json(body: impl Into<String>) -> HttpResponse {
    HttpResponse {
        status: 200,
        headers: Vec::new(),
        body: body.into().into_bytes(),
    }
}

/// `GET /repos/{full_name}` body with the given counters.
pub fn repo_json(full_name: &str, stars: u64, forks: u64) -> String {
    let (owner, name) = full_name.split_once('/').unwrap();
    format!(
        r#"{{"full_name":"{full_name}","name":"{name}",
            "clone_url":"https://github.com/{full_name}.git",
            "owner":{{"login":"{owner}","type":"User"}},
            "stargazers_count":{stars},"watchers_count":{stars},"forks_count":{forks},
            "size":100,"has_issues":true,"topics":[],
            "updated_at":"2024-01-01T00:00:00Z"}}"#
    )
}

pub fn descriptor(full_name: &str, stars: u64) -> ResourceDescriptor {
    let (owner, name) = full_name.split_once('/').unwrap();
    let snapshot = Snapshot {
        size_kb: 100,
        stars,
        watchers: stars,
        forks: 0,
        updated_at: "2024-01-01T00:00:00Z".parse().ok(),
    };
    ResourceDescriptor {
        full_name: full_name.to_string(),
        name: name.to_string(),
        clone_url: format!("https://github.com/{full_name}.git"),
        owner_login: owner.to_string(),
        owner_kind: OwnerKind::User,
        stars,
        size_kb: snapshot.size_kb,
        watchers: snapshot.watchers,
        forks: snapshot.forks,
        topics: BTreeSet::new(),
        has_issues: true,
        updated_at: snapshot.updated_at,
        snapshot,
    }
}

/// Fake cloner: writes a marker file, fails for names listed in `fail`.
///
/// Failing jobs create a partial destination first so cleanup is observable.
#[derive(Default)]
pub struct FakeCloner {
    pub fail: BTreeSet<String>,
    pub calls: AtomicUsize,
    pub delay: Option<Duration>,
}

impl FakeCloner {
    pub fn failing(names: &[&str]) -> Self {
        Self {
            fail: names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RepoCloner for FakeCloner {
    async fn clone_repo(&self, job: &CloneJob) -> Result<(), CloneError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let io = |e| CloneError::local_io(&job.destination, e);
        tokio::fs::create_dir_all(job.destination.join(".git"))
            .await
            .map_err(io)?;
        if self.fail.contains(job.repo()) {
            return Err(CloneError::Git {
                status: "exit status: 128".to_string(),
                stderr: format!("fatal: could not read from remote {}", job.repo()),
            });
        }
        tokio::fs::write(job.destination.join("HEAD"), b"ref: refs/heads/main\n")
            .await
            .map_err(io)
    }
}

pub fn dir_entries(path: &Path) -> BTreeSet<String> {
    std::fs::read_dir(path)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default()
}

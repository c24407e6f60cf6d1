#![allow(dead_code, clippy::expect_used, clippy::unwrap_used)]

use std::{
    collections::HashMap,
    fs,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use gateway::{
    breaker::BreakerConfig,
    dispatcher::{Downstream, DownstreamError, DownstreamRequest, DownstreamResponse},
    registry::{RegistryError, ServiceRegistry},
    types::{HealthStatus, SelfDescriptor, ServiceInstance},
};
use reqwest::Method;
use serde_json::Value;
use sqlx::{
    Connection, SqliteConnection, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use tempfile::NamedTempFile;

pub struct TestDb {
    pub pool: SqlitePool,
    _db_file: NamedTempFile,
}

pub async fn setup_db() -> TestDb {
    let db_file = NamedTempFile::new().expect("create temp sqlite file");
    let options = SqliteConnectOptions::new()
        .filename(db_file.path())
        .create_if_missing(true)
        .busy_timeout(Duration::from_millis(500));

    let mut conn = SqliteConnection::connect_with(&options)
        .await
        .expect("connect sqlite for migrations");

    let mut entries: Vec<_> = fs::read_dir("migrations")
        .expect("read migrations dir")
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().and_then(|ext| ext.to_str()) == Some("sql"))
        .collect();
    entries.sort_by_key(|entry| entry.file_name());
    for entry in entries {
        let contents = fs::read_to_string(entry.path()).expect("read migration");
        for statement in contents.split(';') {
            let statement = statement.trim();
            if !statement.is_empty() {
                sqlx::query(statement)
                    .execute(&mut conn)
                    .await
                    .expect("run migration");
            }
        }
    }
    conn.close().await.expect("close migration conn");

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("connect sqlite file");

    TestDb {
        pool,
        _db_file: db_file,
    }
}

pub fn replica(service: &str, address: &str, port: u16) -> ServiceInstance {
    ServiceInstance {
        service_name: service.to_string(),
        address: address.to_string(),
        port,
        health_status: HealthStatus::Passing,
    }
}

/// Breaker settings that never trip, for tests that count raw attempts.
pub fn lenient_breaker() -> BreakerConfig {
    BreakerConfig {
        call_timeout: Duration::from_secs(60),
        error_threshold_percentage: 100,
        volume_threshold: u32::MAX,
        rolling_window_size: 100,
        rolling_window_duration: Duration::from_secs(60),
        reset_timeout: Duration::from_secs(30),
    }
}

/// In-memory registry. Deregistered replicas disappear from later queries.
#[derive(Default)]
pub struct FakeRegistry {
    instances: Mutex<Vec<ServiceInstance>>,
    deregistered: Mutex<Vec<ServiceInstance>>,
    queries: AtomicUsize,
    unreachable: AtomicBool,
    fail_deregister: AtomicBool,
}

impl FakeRegistry {
    pub fn with(instances: Vec<ServiceInstance>) -> Self {
        Self {
            instances: Mutex::new(instances),
            ..Self::default()
        }
    }

    pub fn set_unreachable(&self, value: bool) {
        self.unreachable.store(value, Ordering::SeqCst);
    }

    pub fn set_fail_deregister(&self, value: bool) {
        self.fail_deregister.store(value, Ordering::SeqCst);
    }

    pub fn deregistered(&self) -> Vec<ServiceInstance> {
        self.deregistered.lock().unwrap().clone()
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn unavailable() -> RegistryError {
        RegistryError::Status {
            status: 503,
            body: "registry down".to_string(),
        }
    }
}

#[async_trait]
impl ServiceRegistry for FakeRegistry {
    async fn register(&self, _descriptor: &SelfDescriptor) -> Result<(), RegistryError> {
        Ok(())
    }

    async fn list_healthy_instances(
        &self,
        service_name: &str,
    ) -> Result<Vec<ServiceInstance>, RegistryError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        Ok(self
            .instances
            .lock()
            .unwrap()
            .iter()
            .filter(|instance| {
                instance.service_name == service_name
                    && instance.health_status == HealthStatus::Passing
            })
            .cloned()
            .collect())
    }

    async fn deregister(
        &self,
        service_name: &str,
        address: &str,
        port: u16,
    ) -> Result<bool, RegistryError> {
        let target = replica(service_name, address, port);
        self.deregistered.lock().unwrap().push(target.clone());
        if self.fail_deregister.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        let mut instances = self.instances.lock().unwrap();
        let before = instances.len();
        instances.retain(|instance| !instance.is_same_replica(&target));
        Ok(instances.len() != before)
    }

    async fn list_services(&self) -> Result<Vec<String>, RegistryError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        let mut names: Vec<String> = self
            .instances
            .lock()
            .unwrap()
            .iter()
            .map(|instance| instance.service_name.clone())
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

#[derive(Debug, Clone)]
pub enum Behavior {
    Succeed(Value),
    Fail,
    /// Fails this many calls, then succeeds with the value.
    FailThenSucceed(u32, Value),
    /// Never answers.
    Hang,
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub endpoint: String,
    pub request: DownstreamRequest,
}

/// Downstream whose answers are scripted per replica endpoint, optionally per method.
#[derive(Default)]
pub struct ScriptedDownstream {
    behaviors: Mutex<HashMap<(String, Option<Method>), Behavior>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedDownstream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, endpoint: &str, behavior: Behavior) -> &Self {
        self.behaviors
            .lock()
            .unwrap()
            .insert((endpoint.to_string(), None), behavior);
        self
    }

    pub fn on_method(&self, endpoint: &str, method: Method, behavior: Behavior) -> &Self {
        self.behaviors
            .lock()
            .unwrap()
            .insert((endpoint.to_string(), Some(method)), behavior);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, endpoint: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.endpoint == endpoint)
            .count()
    }

    fn next_behavior(&self, endpoint: &str, method: &Method) -> Behavior {
        let mut behaviors = self.behaviors.lock().unwrap();
        let key = if behaviors.contains_key(&(endpoint.to_string(), Some(method.clone()))) {
            (endpoint.to_string(), Some(method.clone()))
        } else {
            (endpoint.to_string(), None)
        };
        match behaviors.get_mut(&key) {
            Some(Behavior::FailThenSucceed(remaining, _)) if *remaining > 0 => {
                *remaining -= 1;
                Behavior::Fail
            }
            Some(Behavior::FailThenSucceed(_, value)) => Behavior::Succeed(value.clone()),
            Some(behavior) => behavior.clone(),
            None => Behavior::Fail,
        }
    }
}

#[async_trait]
impl Downstream for ScriptedDownstream {
    async fn call(
        &self,
        replica: &ServiceInstance,
        request: &DownstreamRequest,
    ) -> Result<DownstreamResponse, DownstreamError> {
        let endpoint = replica.endpoint();
        self.calls.lock().unwrap().push(RecordedCall {
            endpoint: endpoint.clone(),
            request: request.clone(),
        });

        match self.next_behavior(&endpoint, &request.method) {
            Behavior::Succeed(value) => Ok(DownstreamResponse {
                status: 200,
                content_type: Some("application/json".to_string()),
                body: serde_json::to_vec(&value).unwrap(),
            }),
            Behavior::Hang => std::future::pending().await,
            Behavior::Fail | Behavior::FailThenSucceed(..) => Err(DownstreamError::Status {
                replica: endpoint,
                status: 503,
                body: "unavailable".to_string(),
            }),
        }
    }
}

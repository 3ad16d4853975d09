use crate::legislative::{LegislativeData, UpstreamError};
use crate::overrides::{OverrideLoadError, OverrideRow, OverrideSource, parse_rows};
use crate::types::PersonRecord;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

pub fn person(name: Option<&str>, email: Option<&str>, person_id: Option<&str>) -> PersonRecord {
    PersonRecord {
        name: name.map(String::from),
        email: email.map(String::from),
        person_id: person_id.map(String::from),
        ..Default::default()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Postcode(String),
    Person(String),
    Constituency(String),
}

/// Canned responses per operation. Every call is recorded.
#[derive(Default)]
pub struct FakeLegislativeData {
    postcode: Option<Result<PersonRecord, UpstreamError>>,
    person: Option<Result<PersonRecord, UpstreamError>>,
    constituency: Option<Result<PersonRecord, UpstreamError>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeLegislativeData {
    pub fn with_postcode(mut self, result: Result<PersonRecord, UpstreamError>) -> Self {
        self.postcode = Some(result);
        self
    }

    pub fn with_person(mut self, result: Result<PersonRecord, UpstreamError>) -> Self {
        self.person = Some(result);
        self
    }

    pub fn with_constituency(mut self, result: Result<PersonRecord, UpstreamError>) -> Self {
        self.constituency = Some(result);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    fn respond(
        &self,
        call: Call,
        response: &Option<Result<PersonRecord, UpstreamError>>,
    ) -> Result<PersonRecord, UpstreamError> {
        self.calls.lock().push(call);
        response.clone().unwrap_or(Err(UpstreamError::Status(404)))
    }
}

#[async_trait]
impl LegislativeData for FakeLegislativeData {
    async fn lookup_by_postcode(&self, postcode: &str) -> Result<PersonRecord, UpstreamError> {
        self.respond(Call::Postcode(postcode.into()), &self.postcode)
    }

    async fn lookup_by_person_id(&self, person_id: &str) -> Result<PersonRecord, UpstreamError> {
        self.respond(Call::Person(person_id.into()), &self.person)
    }

    async fn lookup_by_constituency(
        &self,
        constituency: &str,
    ) -> Result<PersonRecord, UpstreamError> {
        self.respond(Call::Constituency(constituency.into()), &self.constituency)
    }
}

/// Serves a fixed JSON payload and counts fetches. Can be switched to fail.
pub struct StaticOverrideSource {
    payload: Mutex<Value>,
    failing: AtomicBool,
    fetches: AtomicUsize,
    delay: Mutex<Duration>,
}

impl StaticOverrideSource {
    pub fn new(payload: Value) -> Self {
        StaticOverrideSource {
            payload: Mutex::new(payload),
            failing: AtomicBool::new(false),
            fetches: AtomicUsize::new(0),
            delay: Mutex::new(Duration::ZERO),
        }
    }

    pub fn set_payload(&self, payload: Value) {
        *self.payload.lock() = payload;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every fetch sleeps this long before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OverrideSource for StaticOverrideSource {
    async fn fetch(&self) -> Result<Vec<OverrideRow>, OverrideLoadError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(OverrideLoadError::Status(500));
        }
        parse_rows(self.payload.lock().clone())
    }
}

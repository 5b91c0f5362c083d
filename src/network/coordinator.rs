//! Request coordination
//!
//! Every (query, variables) signature moves through Idle -> Pending -> Succeeded or
//! Failed. While Pending, callers join the one in-flight fetch. Once Succeeded, calls
//! are answered from the cache without touching the network. A failure is delivered
//! to everyone waiting and leaves the signature ready to fetch again.
//!
//! Each installed fetch or read carries a ticket. Completions only touch the state
//! entry holding their own ticket, so work started before a `clear` neither writes
//! into the emptied cache nor disturbs requests made after it.

use super::Transport;
use crate::cache::{IngestOptions, NormalizedCache};
use crate::query::Selection;
use crate::{CacheError, Result};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

type Outcome = std::result::Result<Value, Arc<CacheError>>;
type SharedOutcome = Shared<BoxFuture<'static, Outcome>>;

/// Query text plus canonical variables
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestSignature {
    query: String,
    variables: String,
}

impl RequestSignature {
    pub fn new(query: &str, variables: &Value) -> Self {
        Self {
            query: query.to_string(),
            variables: canonical(variables).to_string(),
        }
    }
}

/// Object keys sorted at every level so equal variables hash equally
fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(fields) => {
            let mut keys: Vec<&String> = fields.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonical(&fields[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Idle,
    Pending,
    Succeeded,
    Failed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Idle => "idle",
            RequestStatus::Pending => "pending",
            RequestStatus::Succeeded => "succeeded",
            RequestStatus::Failed => "failed",
        }
    }
}

struct RequestState {
    status: RequestStatus,
    outcome: Option<SharedOutcome>,
    ticket: u64,
}

impl RequestState {
    fn idle() -> Self {
        Self {
            status: RequestStatus::Idle,
            outcome: None,
            ticket: 0,
        }
    }
}

type RequestTable = Arc<Mutex<HashMap<RequestSignature, RequestState>>>;

/// State entry for a signature, if it still belongs to `ticket`
fn owned_state<'t>(
    requests: &'t mut HashMap<RequestSignature, RequestState>,
    signature: &RequestSignature,
    ticket: u64,
) -> Option<&'t mut RequestState> {
    requests
        .get_mut(signature)
        .filter(|state| state.ticket == ticket)
}

/// Single outstanding network operation per request signature
pub struct RequestCoordinator<T> {
    cache: Arc<NormalizedCache>,
    transport: Arc<T>,
    requests: RequestTable,
    tickets: AtomicU64,
}

impl<T: Transport + 'static> RequestCoordinator<T> {
    pub fn new(cache: Arc<NormalizedCache>, transport: Arc<T>) -> Self {
        Self {
            cache,
            transport,
            requests: Arc::new(Mutex::new(HashMap::new())),
            tickets: AtomicU64::new(1),
        }
    }

    pub fn cache(&self) -> &Arc<NormalizedCache> {
        &self.cache
    }

    /// Run a query through the network or the cache
    ///
    /// The first call for a signature fetches and resolves with the response's data
    /// payload. Later calls resolve with `read` executed against the cache.
    pub async fn execute(
        &self,
        query: &str,
        variables: Value,
        read: Vec<Selection>,
        options: IngestOptions,
    ) -> Result<Value> {
        let outcome = self.outcome_for(query, variables, read, options)?;
        outcome.await.map_err(CacheError::Shared)
    }

    /// Current status of a signature
    pub fn state(&self, query: &str, variables: &Value) -> RequestStatus {
        let signature = RequestSignature::new(query, variables);
        match self.lock() {
            Ok(requests) => requests
                .get(&signature)
                .map_or(RequestStatus::Idle, |state| state.status),
            Err(_) => RequestStatus::Idle,
        }
    }

    /// Forget every request and empty the cache
    pub fn clear(&self) -> Result<()> {
        let mut requests = self.lock()?;
        requests.clear();
        self.cache.clear()
    }

    fn outcome_for(
        &self,
        query: &str,
        variables: Value,
        read: Vec<Selection>,
        options: IngestOptions,
    ) -> Result<SharedOutcome> {
        let signature = RequestSignature::new(query, &variables);
        let mut requests = self.lock()?;
        let state = requests
            .entry(signature.clone())
            .or_insert_with(RequestState::idle);

        match state.status {
            RequestStatus::Pending => {
                if let Some(ref outcome) = state.outcome {
                    tracing::debug!(query, "Joining in-flight request");
                    crate::metrics::record_coalesced();
                    return Ok(outcome.clone());
                }
            }
            RequestStatus::Succeeded => {
                if let Some(ref outcome) = state.outcome {
                    return Ok(outcome.clone());
                }
                let ticket = self.tickets.fetch_add(1, Ordering::Relaxed);
                let outcome = self.cache_read(signature, ticket, variables, read);
                state.ticket = ticket;
                state.outcome = Some(outcome.clone());
                return Ok(outcome);
            }
            RequestStatus::Idle | RequestStatus::Failed => {}
        }

        tracing::debug!(query, "Fetching");
        let ticket = self.tickets.fetch_add(1, Ordering::Relaxed);
        let outcome = self.fetch(signature, ticket, query.to_string(), variables, options);
        state.status = RequestStatus::Pending;
        state.ticket = ticket;
        state.outcome = Some(outcome.clone());
        Ok(outcome)
    }

    fn fetch(
        &self,
        signature: RequestSignature,
        ticket: u64,
        query: String,
        variables: Value,
        options: IngestOptions,
    ) -> SharedOutcome {
        let cache = Arc::clone(&self.cache);
        let transport = Arc::clone(&self.transport);
        let requests = Arc::clone(&self.requests);

        async move {
            let response = transport
                .post(&query, &variables)
                .await
                .and_then(|response| response.into_data());
            let result = complete_fetch(&requests, &signature, ticket, &cache, response, options);

            let status = if result.is_ok() { "succeeded" } else { "failed" };
            crate::metrics::record_fetch(status);
            if let Err(ref e) = result {
                tracing::warn!(query = %query, error = %e, "Fetch failed");
            }
            result.map_err(Arc::new)
        }
        .boxed()
        .shared()
    }

    /// Retained read of an already fetched signature
    ///
    /// A read that misses is dropped and the signature goes back to Idle, so the
    /// next call fetches again.
    fn cache_read(
        &self,
        signature: RequestSignature,
        ticket: u64,
        variables: Value,
        read: Vec<Selection>,
    ) -> SharedOutcome {
        let cache = Arc::clone(&self.cache);
        let requests = Arc::clone(&self.requests);
        let variables = match variables {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        async move {
            let result = cache.read_with_variables(&read, &variables);
            if result.is_err() {
                if let Ok(mut requests) = requests.lock() {
                    if let Some(state) = owned_state(&mut requests, &signature, ticket) {
                        state.status = RequestStatus::Idle;
                        state.outcome = None;
                    }
                }
            }
            result.map_err(Arc::new)
        }
        .boxed()
        .shared()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<RequestSignature, RequestState>>> {
        self.requests
            .lock()
            .map_err(|_| CacheError::Storage("request table lock poisoned".to_string()))
    }
}

/// Record a finished fetch under the request table lock
///
/// The response is ingested only while the signature still holds this fetch's
/// ticket. `clear` takes the same lock first, so a stale response can never land in
/// a cache emptied after the fetch started. Stale responses are still handed to the
/// callers that asked for them.
fn complete_fetch(
    requests: &Mutex<HashMap<RequestSignature, RequestState>>,
    signature: &RequestSignature,
    ticket: u64,
    cache: &NormalizedCache,
    response: Result<Value>,
    options: IngestOptions,
) -> Result<Value> {
    let mut requests = requests
        .lock()
        .map_err(|_| CacheError::Storage("request table lock poisoned".to_string()))?;

    let Some(state) = owned_state(&mut requests, signature, ticket) else {
        tracing::debug!(ticket, "Request cleared while in flight, response not cached");
        return response;
    };

    let result = response.and_then(|data| cache.ingest_with(&data, options).map(|_| data));
    state.status = if result.is_ok() {
        RequestStatus::Succeeded
    } else {
        RequestStatus::Failed
    };
    state.outcome = None;
    result
}

//! Hand-written doubles for the pipeline's collaborators. Compiled unconditionally so
//! the integration tests under `tests/` can use them too.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tonic::Status;

use crate::broker::{IdentityToken, TokenExchanger};
use crate::credentials::ServiceToken;
use crate::dispatcher::ImportService;
use crate::error::AuthError;
use crate::fetcher::Clock;
use crate::payload::ImportRequest;

/// Answers exchanges from a fixed table keyed by identity token. Unknown identity
/// tokens are refused with `Unauthenticated`.
#[derive(Clone, Default)]
pub struct MockTokenExchanger {
    responses: HashMap<String, Result<ServiceToken, Status>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockTokenExchanger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exchange_ret(mut self, identity: &str, result: Result<&str, Status>) -> Self {
        self.responses
            .insert(identity.to_owned(), result.map(ServiceToken::new));
        self
    }

    /// Identity tokens seen so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenExchanger for MockTokenExchanger {
    async fn exchange_token(&self, identity: &IdentityToken) -> Result<ServiceToken, AuthError> {
        self.calls.lock().unwrap().push(identity.as_str().to_owned());

        match self.responses.get(identity.as_str()) {
            Some(Ok(token)) => Ok(token.clone()),
            Some(Err(status)) => Err(AuthError::Exchange(status.clone())),
            None => Err(AuthError::Exchange(Status::unauthenticated(
                "unknown identity token",
            ))),
        }
    }
}

/// Records every payload it is handed. Optionally sleeps before answering, which with
/// paused tokio time is how tests hold a tick in DISPATCHING.
#[derive(Clone)]
pub struct MockImportService {
    response: Result<(), Status>,
    delay: Option<Duration>,
    received: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl Default for MockImportService {
    fn default() -> Self {
        Self {
            response: Ok(()),
            delay: None,
            received: Arc::default(),
        }
    }
}

impl MockImportService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(status: Status) -> Self {
        Self {
            response: Err(status),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn received(&self) -> Vec<Vec<u8>> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImportService for MockImportService {
    async fn import(&self, request: ImportRequest) -> Result<(), Status> {
        self.received.lock().unwrap().push(request.payload);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.response.clone()
    }
}

pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

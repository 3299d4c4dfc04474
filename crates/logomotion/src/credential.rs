/// Credential gate in front of every remote generation call.
///
/// The host environment's key selector is injected as a [`CredentialFlow`];
/// without one, the gate falls back to a statically configured key.

use async_trait::async_trait;
use generation::ApiKeySource;
use generation::SharedApiKey;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("no credential selector is available")]
    Unavailable,

    #[error("credential selection failed: {0}")]
    Failed(String),
}

/// Host-side key selection.
#[async_trait]
pub trait CredentialFlow: Send + Sync {
    /// Whether a key is currently selected.
    async fn has_credential(&self) -> bool;

    /// Show the selector and resolve once the user finishes or cancels.
    /// Completion does not say whether a key was actually chosen.
    async fn open_selector(&self) -> Result<(), CredentialError>;
}

/// What the gate concludes after the selector closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorPolicy {
    /// Treat a closed selector as a selected key without checking again.
    #[default]
    AssumeSelected,
    /// Ask the flow again after the selector closes.
    Reverify,
}

pub struct CredentialGate {
    flow: Option<Arc<dyn CredentialFlow>>,
    fallback: Arc<dyn ApiKeySource>,
    policy: SelectorPolicy,
}

impl CredentialGate {
    pub fn new(flow: Option<Arc<dyn CredentialFlow>>, fallback: Arc<dyn ApiKeySource>) -> Self {
        Self {
            flow,
            fallback,
            policy: SelectorPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: SelectorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn flow(&self) -> Option<&dyn CredentialFlow> {
        self.flow.as_deref()
    }

    pub fn policy(&self) -> SelectorPolicy {
        self.policy
    }

    /// Make sure a usable key exists, opening the selector if needed.
    pub async fn ensure_credential(&self) -> bool {
        let Some(flow) = self.flow.as_deref() else {
            let present = self.fallback.api_key().is_some();
            debug!("No credential selector; configured key present: {}", present);
            return present;
        };

        if flow.has_credential().await {
            return true;
        }

        info!("No credential selected, opening selector");
        if let Err(err) = flow.open_selector().await {
            warn!("Failed to select credential: {}", err);
            return false;
        }

        match self.policy {
            SelectorPolicy::AssumeSelected => true,
            SelectorPolicy::Reverify => flow.has_credential().await,
        }
    }
}

/// Flow backed by a [`SharedApiKey`] slot. The selector closure returns the
/// chosen key, or `None` when the user cancels.
pub struct SharedKeyFlow<F> {
    key: SharedApiKey,
    selector: F,
}

impl<F, Fut> SharedKeyFlow<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Option<String>> + Send,
{
    pub fn new(key: SharedApiKey, selector: F) -> Self {
        Self { key, selector }
    }
}

#[async_trait]
impl<F, Fut> CredentialFlow for SharedKeyFlow<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Option<String>> + Send,
{
    async fn has_credential(&self) -> bool {
        self.key.api_key().is_some()
    }

    async fn open_selector(&self) -> Result<(), CredentialError> {
        if let Some(key) = (self.selector)().await {
            self.key.set(key);
        }
        Ok(())
    }
}

/// Scripted flow for tests and headless runs
#[derive(Default)]
pub struct MockCredentialFlow {
    has_key: AtomicBool,
    grant_on_select: AtomicBool,
    selector_results: Mutex<VecDeque<Result<(), CredentialError>>>,
    checks: AtomicUsize,
    selections: AtomicUsize,
}

impl MockCredentialFlow {
    pub fn new(has_key: bool) -> Self {
        let flow = Self::default();
        flow.has_key.store(has_key, Ordering::SeqCst);
        flow
    }

    /// Whether closing the selector leaves a key selected.
    pub fn granting_on_select(self, grant: bool) -> Self {
        self.grant_on_select.store(grant, Ordering::SeqCst);
        self
    }

    pub fn with_selector_result(self, result: Result<(), CredentialError>) -> Self {
        self.selector_results.lock().push_back(result);
        self
    }

    pub fn set_has_key(&self, has_key: bool) {
        self.has_key.store(has_key, Ordering::SeqCst);
    }

    pub fn check_calls(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }

    pub fn selector_calls(&self) -> usize {
        self.selections.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialFlow for MockCredentialFlow {
    async fn has_credential(&self) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst);
        self.has_key.load(Ordering::SeqCst)
    }

    async fn open_selector(&self) -> Result<(), CredentialError> {
        self.selections.fetch_add(1, Ordering::SeqCst);
        let result = self.selector_results.lock().pop_front().unwrap_or(Ok(()));
        if result.is_ok() && self.grant_on_select.load(Ordering::SeqCst) {
            self.has_key.store(true, Ordering::SeqCst);
        }
        result
    }
}

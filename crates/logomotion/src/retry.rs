use crate::credential::CredentialFlow;
use generation::GenerationError;
use std::future::Future;
use tracing::warn;

/// Run `action`, re-selecting the credential and retrying exactly once when
/// it fails with an auth failure. Any other failure, a second failure, or an
/// auth failure with no selector available propagates unchanged.
pub async fn with_auth_retry<T, F, Fut>(
    flow: Option<&dyn CredentialFlow>,
    mut action: F,
) -> Result<T, GenerationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GenerationError>>,
{
    let err = match action().await {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };

    let Some(flow) = flow else {
        return Err(err);
    };
    if !err.is_auth_failure() {
        return Err(err);
    }

    warn!("Credential rejected ({}), re-selecting and retrying once", err);
    if let Err(select_err) = flow.open_selector().await {
        warn!("Credential re-selection failed: {}", select_err);
        return Err(err);
    }
    action().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{CredentialError, MockCredentialFlow};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn auth_error() -> GenerationError {
        GenerationError::Auth("Requested entity was not found.".to_string())
    }

    #[tokio::test]
    async fn test_success_needs_no_selector() {
        let flow = MockCredentialFlow::new(true);
        let result = with_auth_retry(Some(&flow), || async { Ok::<_, GenerationError>(7) }).await;
        assert_eq!(result, Ok(7));
        assert_eq!(flow.selector_calls(), 0);
    }

    #[tokio::test]
    async fn test_auth_failure_retried_once() {
        let flow = MockCredentialFlow::new(true);
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let result = with_auth_retry(Some(&flow), move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(auth_error())
            } else {
                Ok("video")
            }
        })
        .await;

        assert_eq!(result, Ok("video"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(flow.selector_calls(), 1);
    }

    #[tokio::test]
    async fn test_second_auth_failure_propagates() {
        let flow = MockCredentialFlow::new(true);
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let result: Result<(), _> = with_auth_retry(Some(&flow), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(auth_error())
        })
        .await;

        assert_eq!(result, Err(auth_error()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(flow.selector_calls(), 1);
    }

    #[tokio::test]
    async fn test_other_failures_not_retried() {
        let flow = MockCredentialFlow::new(true);
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let result: Result<(), _> = with_auth_retry(Some(&flow), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(GenerationError::transport("timeout"))
        })
        .await;

        assert_eq!(result, Err(GenerationError::transport("timeout")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(flow.selector_calls(), 0);
    }

    #[tokio::test]
    async fn test_no_selector_means_no_retry() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let result: Result<(), _> = with_auth_retry(None, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(auth_error())
        })
        .await;
        assert_eq!(result, Err(auth_error()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_reselection_returns_first_error() {
        let flow = MockCredentialFlow::new(true)
            .with_selector_result(Err(CredentialError::Failed("closed".to_string())));
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let result: Result<(), _> = with_auth_retry(Some(&flow), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(auth_error())
        })
        .await;
        assert_eq!(result, Err(auth_error()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

/// LogoMotion: turn a text description into a logo still, then animate it.
///
/// [`WorkflowController`] drives the pipeline. Remote calls go through the
/// `generation` crate behind a [`CredentialGate`], and auth failures get one
/// retry after the key selector has been shown again.

pub mod config;
pub mod controller;
pub mod credential;
pub mod retry;
pub mod state;
pub mod upload;

pub use config::LogomotionConfig;
pub use controller::{RequestOutcome, WorkflowController, WorkflowError};
pub use credential::{
    CredentialError, CredentialFlow, CredentialGate, MockCredentialFlow, SelectorPolicy,
    SharedKeyFlow,
};
pub use retry::with_auth_retry;
pub use state::{WorkflowSnapshot, WorkflowState};

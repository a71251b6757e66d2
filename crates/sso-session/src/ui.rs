//! The SignOnUI collaborator, §4.3's "UI integration".

use sso_core::SessionData;

/// Interactive UI round-trip surface a session mediates on behalf of a
/// plugin.
///
/// The daemon binary supplies the real implementation (talking to
/// whatever UI agent is registered over the local transport); tests use
/// an in-memory fake.
#[async_trait::async_trait]
pub trait SignOnUi: Send + Sync {
    /// Request interactive input for `request_id`, given the plugin's
    /// `params`. Resolves with the user's reply, or an error if the UI
    /// call itself failed (e.g. no UI agent registered).
    async fn request(&self, request_id: &str, params: SessionData) -> Result<SessionData, String>;

    /// Cancel an outstanding UI call for `request_id`.
    async fn cancel(&self, request_id: &str);
}

/// A `SignOnUi` that always fails, for daemons or tests with no UI
/// agent attached.
#[derive(Debug, Default)]
pub struct NoUi;

#[async_trait::async_trait]
impl SignOnUi for NoUi {
    async fn request(&self, _request_id: &str, _params: SessionData) -> Result<SessionData, String> {
        Err("no-signon-ui".to_owned())
    }

    async fn cancel(&self, _request_id: &str) {}
}

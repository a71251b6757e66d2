//! The identity-list query filter.
//!
//! The distilled spec's only hard requirement is that an empty filter
//! returns every identity in ascending id order; any other key is an
//! equality constraint against the identity's own fields.

use sso_core::SessionData;

/// A filter map for [`crate::Credentials::credentials_matching`].
///
/// Wraps a [`SessionData`] so the recognized keys line up with the
/// identity-map field names used everywhere else (`UserName`, `Type`,
/// `Caption`, …).
#[derive(Debug, Clone, Default)]
pub struct CredentialsFilter(pub SessionData);

impl CredentialsFilter {
    /// The filter that matches every identity.
    #[must_use]
    pub fn all() -> Self {
        Self(SessionData::new())
    }

    /// Whether this filter has no constraints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.0.is_empty()
    }
}

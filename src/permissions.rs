//! Permission collaborator interface
//!
//! The host application owns the permission-prompt flow; the recording
//! core only needs the current authorization answers, checked before any
//! resource allocation. Anything other than `Authorized` is a hard
//! precondition failure.

use serde::{Deserialize, Serialize};

/// Current authorization for a protected capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizationStatus {
    Authorized,
    Denied,
    NotDetermined,
}

impl AuthorizationStatus {
    pub fn is_authorized(&self) -> bool {
        matches!(self, AuthorizationStatus::Authorized)
    }
}

/// Reports authorization for screen capture and microphone access
pub trait PermissionGate: Send + Sync {
    fn screen_capture(&self) -> AuthorizationStatus;
    fn microphone(&self) -> AuthorizationStatus;
}

/// Gate that reports everything as authorized.
///
/// Suitable for platforms without a screen-recording permission model and
/// for hosts that run their own prompt flow before starting a session.
pub struct GrantedPermissions;

impl PermissionGate for GrantedPermissions {
    fn screen_capture(&self) -> AuthorizationStatus {
        AuthorizationStatus::Authorized
    }

    fn microphone(&self) -> AuthorizationStatus {
        AuthorizationStatus::Authorized
    }
}

/// Gate with fixed answers, driven by the host (or a test)
#[derive(Debug, Clone, Copy)]
pub struct StaticPermissions {
    pub screen_capture: AuthorizationStatus,
    pub microphone: AuthorizationStatus,
}

impl PermissionGate for StaticPermissions {
    fn screen_capture(&self) -> AuthorizationStatus {
        self.screen_capture
    }

    fn microphone(&self) -> AuthorizationStatus {
        self.microphone
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_authorized_counts() {
        assert!(AuthorizationStatus::Authorized.is_authorized());
        assert!(!AuthorizationStatus::Denied.is_authorized());
        assert!(!AuthorizationStatus::NotDetermined.is_authorized());
    }
}

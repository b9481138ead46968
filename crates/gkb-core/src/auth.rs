//! Credential verification and mutation rules.
//!
//! Secrets are plain strings compared exactly after trimming. Free text is
//! tried against the credential chain in a FIXED order: admin set first, then
//! the composite resource form (`guide1 2323`, `lesson7 pw`), then the global
//! set. First successful match wins; a failed composite still falls through
//! to the global check.

use std::sync::Arc;

use crate::{
    domain::{GuideId, LessonNumber, ResourceRef, SharedKind},
    ports::CredentialStore,
    Result,
};

/// Result of running free text through the credential chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Admin password matched: `authenticated=true, is_admin=true`.
    Admin,
    /// Global password matched: `authenticated=true, is_admin=false`.
    Regular,
    /// Per-guide password matched: additive grant of the guide id.
    GuideUnlocked(GuideId),
    /// Per-lesson password matched: additive grant of the lesson number.
    LessonUnlocked(LessonNumber),
    /// Nothing matched. Session untouched; user told to try again.
    Rejected,
}

pub struct AuthEngine {
    credentials: Arc<dyn CredentialStore>,
}

impl AuthEngine {
    pub fn new(credentials: Arc<dyn CredentialStore>) -> Self {
        Self { credentials }
    }

    pub async fn authenticate(&self, candidate: &str) -> Result<AuthOutcome> {
        let candidate = candidate.trim();
        if candidate.is_empty() {
            return Ok(AuthOutcome::Rejected);
        }

        if self.matches_shared(SharedKind::Admin, candidate).await? {
            return Ok(AuthOutcome::Admin);
        }

        if let Some((resource, secret)) = parse_resource_claim(candidate) {
            if self.matches_resource(&resource, secret).await? {
                return Ok(match resource {
                    ResourceRef::Guide(g) => AuthOutcome::GuideUnlocked(g),
                    ResourceRef::Lesson(n) => AuthOutcome::LessonUnlocked(n),
                });
            }
        }

        if self.matches_shared(SharedKind::Global, candidate).await? {
            return Ok(AuthOutcome::Regular);
        }

        Ok(AuthOutcome::Rejected)
    }

    async fn matches_shared(&self, kind: SharedKind, candidate: &str) -> Result<bool> {
        let secrets = self.credentials.shared_secrets(kind).await?;
        Ok(secrets.iter().any(|s| s.trim() == candidate))
    }

    /// Absent resource secret fails closed.
    async fn matches_resource(&self, resource: &ResourceRef, candidate: &str) -> Result<bool> {
        Ok(match self.credentials.resource_secret(resource).await? {
            Some(stored) => stored.trim() == candidate.trim(),
            None => false,
        })
    }

    pub async fn global_passwords(&self) -> Result<Vec<String>> {
        self.credentials.shared_secrets(SharedKind::Global).await
    }

    pub async fn add_global_password(&self, secret: &str) -> Result<()> {
        self.credentials
            .add_shared_secret(SharedKind::Global, secret.trim())
            .await
    }

    pub async fn remove_global_password(&self, secret: &str) -> Result<bool> {
        self.credentials
            .remove_shared_secret(SharedKind::Global, secret.trim())
            .await
    }

    pub async fn set_resource_password(&self, resource: &ResourceRef, secret: &str) -> Result<()> {
        self.credentials
            .set_resource_secret(resource, secret.trim())
            .await
    }

    /// Removal of a missing secret is a reported no-op. Existing grants for
    /// chats that already unlocked the resource are deliberately NOT revoked.
    pub async fn remove_resource_password(&self, resource: &ResourceRef) -> Result<bool> {
        self.credentials.remove_resource_secret(resource).await
    }
}

/// Parse the composite unlock form: `"<kind><id> <password>"`.
pub fn parse_resource_claim(text: &str) -> Option<(ResourceRef, &str)> {
    let (head, rest) = text.split_once(char::is_whitespace)?;
    let secret = rest.trim();
    if secret.is_empty() {
        return None;
    }
    let resource = parse_resource_ref(head)?;
    Some((resource, secret))
}

/// Parse a bare resource token: `lesson7` or `guide1`. The guide id is the
/// whole token; the lesson id is the numeric suffix.
pub fn parse_resource_ref(token: &str) -> Option<ResourceRef> {
    if let Some(num) = token.strip_prefix("lesson") {
        let n = num.parse::<i64>().ok()?;
        return Some(ResourceRef::Lesson(LessonNumber(n)));
    }
    if token.len() > "guide".len() && token.starts_with("guide") {
        return Some(ResourceRef::Guide(GuideId(token.to_string())));
    }
    None
}

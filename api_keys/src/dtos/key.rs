use chrono::{DateTime, Utc};
use db::models::credential::Credential;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateKeyRequest {
    pub subscription_id: Uuid,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RevokeKeyRequest {
    pub credential_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshKeyRequest {
    pub credential_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct KeyListQuery {
    pub subscription_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyKeyRequest {
    pub credential: String,
}

/// Credential metadata. The secret is never part of it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiKeyListItem {
    pub credential_id: Uuid,
    pub subscription_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl From<Credential> for ApiKeyListItem {
    fn from(credential: Credential) -> Self {
        ApiKeyListItem {
            credential_id: credential.credential_id,
            subscription_id: credential.subscription_id,
            name: credential.name,
            created_at: credential.created_at,
            expires_at: credential.expires_at,
            is_active: credential.is_active,
            last_used_at: credential.last_used_at,
        }
    }
}

/// Returned once, at mint or refresh time. `key` cannot be retrieved later.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateKeyResponse {
    pub key: String,
    #[serde(flatten)]
    pub credential: ApiKeyListItem,
}

use actix_web::{HttpMessage, HttpResponse, dev::ServiceRequest};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Res};

const KEY_PREFIX: &str = "sk_";

/// Claims embedded in a minted API credential.
///
/// The credential travels as `sk_<HS256 JWT>`. `credential_id` is the stable
/// lookup handle; `secret` is checked against the stored hash so a leaked
/// signing key alone cannot forge a usable credential.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct KeyClaims {
    pub owner_id: Uuid,
    pub subscription_id: Uuid,
    pub credential_id: Uuid,
    pub plan_name: String,
    pub api_calls_limit: i64,
    pub data_limit_mb: i64,
    pub iat: i64,
    pub exp: i64,
    pub secret: String,
}

impl KeyClaims {
    pub fn to_key(&self, signing_secret: &str) -> Res<String> {
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            self,
            &EncodingKey::from_secret(signing_secret.as_bytes()),
        )?;
        Ok(format!("{}{}", KEY_PREFIX, token))
    }

    /// Decodes and checks the signature. Expiry is judged later against the
    /// stored credential, not here.
    pub fn from_key(key: &str, signing_secret: &str) -> Res<Self> {
        let token = key
            .strip_prefix(KEY_PREFIX)
            .ok_or_else(|| AppError::CredentialMalformed("Missing prefix 'sk_'".to_string()))?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;

        jsonwebtoken::decode::<KeyClaims>(
            token,
            &DecodingKey::from_secret(signing_secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| AppError::CredentialMalformed(e.to_string()))
    }

    pub fn scope(&self, expires_at: DateTime<Utc>) -> CredentialScope {
        CredentialScope {
            owner_id: self.owner_id,
            subscription_id: self.subscription_id,
            credential_id: self.credential_id,
            plan_name: self.plan_name.clone(),
            api_calls_limit: self.api_calls_limit,
            data_limit_mb: self.data_limit_mb,
            expires_at,
        }
    }
}

/// What a verified credential entitles its bearer to.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CredentialScope {
    pub owner_id: Uuid,
    pub subscription_id: Uuid,
    pub credential_id: Uuid,
    pub plan_name: String,
    pub api_calls_limit: i64,
    pub data_limit_mb: i64,
    pub expires_at: DateTime<Utc>,
}

pub fn get_key_claims_or_error(req: &ServiceRequest) -> Result<KeyClaims, HttpResponse> {
    if let Some(key_claims_res) = req.extensions().get::<Res<KeyClaims>>() {
        match key_claims_res {
            Ok(claims) => Ok(claims.clone()),
            Err(app_error) => Err(app_error.to_http_response()),
        }
    } else {
        Err(AppError::Unauthorized("No API key provided".to_string()).to_http_response())
    }
}

pub fn get_scope(req: &ServiceRequest) -> Option<CredentialScope> {
    req.extensions().get::<CredentialScope>().cloned()
}

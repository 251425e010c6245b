use std::sync::Arc;

use actix_web::{Responder, get, post, web};
use chrono::Utc;
use common::{env_config::Config, error::Res, http::Success, key::CredentialScope};
use db::store::SharedStore;

use crate::{dtos::key::VerifyKeyRequest, service};

/// Verifies a raw credential for the resource API.
///
/// # Returns
///
/// `200` with the credential scope, or `401` with one of the codes
/// `CREDENTIAL_MALFORMED`, `CREDENTIAL_UNKNOWN`, `CREDENTIAL_REVOKED`, `CREDENTIAL_EXPIRED`.
#[post("/verify")]
pub async fn post_verify(
    config: web::Data<Arc<Config>>,
    store: web::Data<SharedStore>,
    req: web::Json<VerifyKeyRequest>,
) -> Res<impl Responder> {
    let scope = service::key::verify_key(
        &***store,
        &config.credential_config.secret,
        &req.credential,
        Utc::now(),
    )
    .await?;
    Success::ok(scope)
}

/// Echoes the scope of the credential used to call it.
#[get("/scope")]
pub async fn get_scope(scope: web::ReqData<CredentialScope>) -> Res<impl Responder> {
    Success::ok(scope.into_inner())
}

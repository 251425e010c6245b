use actix_web::HttpResponse;
use thiserror::Error;

pub type Res<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    // === CONVERSION ERRORS ===
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JWT error: {0}")]
    JWT(#[from] jsonwebtoken::errors::Error),

    #[error("Stripe error: {0}")]
    Stripe(#[from] stripe::StripeError),

    // === REQUEST ERRORS ===
    #[error("Authorization error: {0}")]
    Unauthorized(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Too Many Requests: {0}")]
    TooManyRequests(String),

    // === DOMAIN ERRORS ===
    /// Unknown id, or an id owned by somebody else. Both read the same to the caller.
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Plan is not available for purchase")]
    PlanInactive,

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Credential quota of {0} active credentials reached for this subscription")]
    QuotaExceeded(u32),

    #[error("An active credential named '{0}' already exists for this subscription")]
    DuplicateName(String),

    #[error("Subscription is not eligible: {0}")]
    SubscriptionNotEligible(String),

    // === VERIFICATION ERRORS ===
    #[error("Malformed credential: {0}")]
    CredentialMalformed(String),

    #[error("Unknown credential")]
    CredentialUnknown,

    #[error("Credential has been revoked")]
    CredentialRevoked,

    #[error("Credential has expired")]
    CredentialExpired,

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine readable code rendered next to the message.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::JWT(_) => "SIGNING_ERROR",
            AppError::Stripe(_) => "PAYMENT_PROVIDER_ERROR",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::TooManyRequests(_) => "TOO_MANY_REQUESTS",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::InvalidTransition(_) => "INVALID_TRANSITION",
            AppError::PlanInactive => "PLAN_INACTIVE",
            AppError::InvalidDuration(_) => "INVALID_DURATION",
            AppError::QuotaExceeded(_) => "QUOTA_EXCEEDED",
            AppError::DuplicateName(_) => "DUPLICATE_NAME",
            AppError::SubscriptionNotEligible(_) => "SUBSCRIPTION_NOT_ELIGIBLE",
            AppError::CredentialMalformed(_) => "CREDENTIAL_MALFORMED",
            AppError::CredentialUnknown => "CREDENTIAL_UNKNOWN",
            AppError::CredentialRevoked => "CREDENTIAL_REVOKED",
            AppError::CredentialExpired => "CREDENTIAL_EXPIRED",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Caller-recoverable outcomes, rendered as 4xx.
    pub fn is_expected(&self) -> bool {
        !matches!(
            self,
            AppError::Database(_) | AppError::JWT(_) | AppError::Stripe(_) | AppError::Internal(_)
        )
    }

    pub fn to_http_response(&self) -> HttpResponse {
        let is_dev = cfg!(debug_assertions);

        let to_internal_json = |err_msg: &str| {
            if is_dev {
                serde_json::json!({ "error": err_msg, "code": self.code() })
            } else {
                serde_json::json!({ "error": "Internal server error", "code": self.code() })
            }
        };
        let to_json = || serde_json::json!({ "error": self.to_string(), "code": self.code() });

        match self {
            // === CONVERSION ERRORS ===
            AppError::Database(error) => {
                log::error!("Database error: {}", error);
                HttpResponse::InternalServerError().json(to_internal_json(&error.to_string()))
            }
            AppError::JWT(error) => {
                log::error!("JWT error: {}", error);
                HttpResponse::InternalServerError().json(to_internal_json(&error.to_string()))
            }
            AppError::Stripe(error) => {
                log::error!("Stripe error: {}", error);
                HttpResponse::InternalServerError().json(to_internal_json(&error.to_string()))
            }
            AppError::Internal(error) => {
                log::error!("Internal error: {}", error);
                HttpResponse::InternalServerError().json(to_internal_json(error))
            }

            // === REQUEST ERRORS ===
            AppError::Unauthorized(_)
            | AppError::CredentialMalformed(_)
            | AppError::CredentialUnknown
            | AppError::CredentialRevoked
            | AppError::CredentialExpired => HttpResponse::Unauthorized().json(to_json()),
            AppError::BadRequest(_) | AppError::InvalidDuration(_) => {
                HttpResponse::BadRequest().json(to_json())
            }
            AppError::TooManyRequests(_) => HttpResponse::TooManyRequests().json(to_json()),

            // === DOMAIN ERRORS ===
            AppError::NotFound(_) => HttpResponse::NotFound().json(to_json()),
            AppError::InvalidTransition(_)
            | AppError::QuotaExceeded(_)
            | AppError::DuplicateName(_) => HttpResponse::Conflict().json(to_json()),
            AppError::PlanInactive | AppError::SubscriptionNotEligible(_) => {
                HttpResponse::UnprocessableEntity().json(to_json())
            }
        }
    }
}

impl actix_web::ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        self.to_http_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;

    #[test]
    fn expected_errors_render_as_client_errors() {
        let cases = [
            (AppError::NotFound("subscription".into()), StatusCode::NOT_FOUND),
            (AppError::InvalidTransition("x".into()), StatusCode::CONFLICT),
            (AppError::QuotaExceeded(5), StatusCode::CONFLICT),
            (AppError::PlanInactive, StatusCode::UNPROCESSABLE_ENTITY),
            (AppError::CredentialExpired, StatusCode::UNAUTHORIZED),
            (AppError::InvalidDuration("3-days".into()), StatusCode::BAD_REQUEST),
        ];
        for (err, status) in cases {
            assert!(err.is_expected());
            assert_eq!(err.to_http_response().status(), status);
        }
    }

    #[test]
    fn unexpected_errors_render_as_server_errors() {
        let err = AppError::Internal("store unavailable".into());
        assert!(!err.is_expected());
        assert_eq!(
            err.to_http_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn verification_errors_have_distinct_codes() {
        let codes = [
            AppError::CredentialMalformed("x".into()).code(),
            AppError::CredentialUnknown.code(),
            AppError::CredentialRevoked.code(),
            AppError::CredentialExpired.code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in codes.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }
}

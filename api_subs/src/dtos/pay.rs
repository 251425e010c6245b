use bigdecimal::BigDecimal;
use uuid::Uuid;

/// Proof of payment handed to the lifecycle engine by the payment collaborator.
#[derive(Debug, Clone)]
pub struct PaymentConfirmed {
    pub owner_id: Uuid,
    pub plan_id: Uuid,
    pub duration_key: String,
    pub amount_charged: Option<BigDecimal>,
}

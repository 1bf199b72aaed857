//! Promo code validation. Side-effect free: validating never consumes or
//! reserves a code. Offering-level promo permission is the orchestrator's
//! concern, since it needs the offering.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use crate::domain::promo::normalize_code;
use crate::domain::PromoCode;
use crate::ports::{PromoCodes, StoreError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PromoRejection {
    #[error("promo code not found")]
    NotFound,
    #[error("promo code is inactive")]
    Inactive,
    #[error("promo code is outside its validity window")]
    Expired,
}

#[derive(Clone)]
pub struct PromoValidator {
    codes: Arc<dyn PromoCodes>,
}

impl PromoValidator {
    pub fn new(codes: Arc<dyn PromoCodes>) -> Self {
        Self { codes }
    }

    /// Case-insensitive lookup on the trimmed code, then activity and
    /// validity-window checks against the current time.
    pub async fn validate(&self, raw_code: &str) -> Result<Result<PromoCode, PromoRejection>, StoreError> {
        let code = normalize_code(raw_code);
        let Some(promo) = self.codes.find(&code).await? else {
            return Ok(Err(PromoRejection::NotFound));
        };
        if !promo.active {
            return Ok(Err(PromoRejection::Inactive));
        }
        let now = Utc::now();
        if promo.valid_from.is_some_and(|from| now < from)
            || promo.valid_until.is_some_and(|until| now > until)
        {
            return Ok(Err(PromoRejection::Expired));
        }
        Ok(Ok(promo))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryPromoCodes;
    use crate::domain::Discount;
    use bigdecimal::BigDecimal;
    use chrono::Duration;

    fn promo(code: &str, active: bool) -> PromoCode {
        PromoCode {
            code: code.to_string(),
            discount: Discount::Fixed(BigDecimal::from(50_000)),
            active,
            valid_from: None,
            valid_until: None,
        }
    }

    async fn validator_with(promos: Vec<PromoCode>) -> PromoValidator {
        let store = MemoryPromoCodes::new();
        for p in promos {
            store.insert(p).await;
        }
        PromoValidator::new(Arc::new(store))
    }

    #[tokio::test]
    async fn lookup_is_case_insensitive_and_trimmed() {
        let v = validator_with(vec![promo("HEMAT50", true)]).await;
        let result = v.validate("  hemat50 ").await.unwrap();
        assert_eq!(result.unwrap().code, "HEMAT50");
    }

    #[tokio::test]
    async fn missing_code_is_not_found() {
        let v = validator_with(vec![]).await;
        assert_eq!(
            v.validate("NOPE").await.unwrap(),
            Err(PromoRejection::NotFound)
        );
    }

    #[tokio::test]
    async fn disabled_code_is_inactive() {
        let v = validator_with(vec![promo("HEMAT50", false)]).await;
        assert_eq!(
            v.validate("HEMAT50").await.unwrap(),
            Err(PromoRejection::Inactive)
        );
    }

    #[tokio::test]
    async fn code_outside_window_is_expired() {
        let mut expired = promo("LAMA", true);
        expired.valid_until = Some(Utc::now() - Duration::days(1));
        let mut early = promo("BESOK", true);
        early.valid_from = Some(Utc::now() + Duration::days(1));

        let v = validator_with(vec![expired, early]).await;
        assert_eq!(v.validate("LAMA").await.unwrap(), Err(PromoRejection::Expired));
        assert_eq!(v.validate("BESOK").await.unwrap(), Err(PromoRejection::Expired));
    }
}

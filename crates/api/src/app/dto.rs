//! Request parsing and validation.
//!
//! Parsing turns the raw path segment and body into typed data and fails with
//! 400. Validation checks the parsed values and fails with 422. A JSON `null`
//! body parses fine but does not validate; fields missing from an object
//! default to zero and are caught by the amount check.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tally_core::{Account, AccountId, ParseAccountIdError};

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request body is mandatory")]
    MissingBody,

    #[error("cannot parse account id: {0}")]
    InvalidAccountId(#[from] ParseAccountIdError),

    #[error("request body is not valid json: {0}")]
    MalformedBody(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("request data is mandatory")]
    MissingData,

    #[error("amount cannot be less than 1")]
    AmountBelowOne,
}

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TopUpData {
    pub amount: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TransferData {
    pub target: i64,
    pub amount: i64,
}

/// `POST /account/:id/topup`
#[derive(Debug)]
pub struct TopUpRequest {
    pub target: AccountId,
    pub data: Option<TopUpData>,
}

/// `POST /account/:id/transfer`
#[derive(Debug)]
pub struct TransferRequest {
    pub source: AccountId,
    pub data: Option<TransferData>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TopUp {
    pub target: AccountId,
    pub amount: i64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub source: AccountId,
    pub target: AccountId,
    pub amount: i64,
}

impl TopUpRequest {
    pub fn parse(raw_id: &str, body: &[u8]) -> Result<Self, RequestError> {
        let data = parse_body(body)?;
        let target = raw_id.parse()?;
        Ok(Self { target, data })
    }

    pub fn validate(self) -> Result<TopUp, ValidationError> {
        let data = self.data.ok_or(ValidationError::MissingData)?;
        check_amount(data.amount)?;
        Ok(TopUp {
            target: self.target,
            amount: data.amount,
        })
    }
}

impl TransferRequest {
    pub fn parse(raw_id: &str, body: &[u8]) -> Result<Self, RequestError> {
        let data = parse_body(body)?;
        let source = raw_id.parse()?;
        Ok(Self { source, data })
    }

    pub fn validate(self) -> Result<Transfer, ValidationError> {
        let data = self.data.ok_or(ValidationError::MissingData)?;
        check_amount(data.amount)?;
        Ok(Transfer {
            source: self.source,
            target: AccountId::new(data.target),
            amount: data.amount,
        })
    }
}

fn parse_body<T: for<'de> Deserialize<'de>>(body: &[u8]) -> Result<Option<T>, RequestError> {
    if body.is_empty() {
        return Err(RequestError::MissingBody);
    }
    Ok(serde_json::from_slice(body)?)
}

fn check_amount(amount: i64) -> Result<(), ValidationError> {
    if amount < 1 {
        return Err(ValidationError::AmountBelowOne);
    }
    Ok(())
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub id: AccountId,
    pub balance: i64,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            balance: account.balance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_is_a_parse_error() {
        let err = TopUpRequest::parse("1", b"").unwrap_err();
        assert!(matches!(err, RequestError::MissingBody));
        assert_eq!(err.to_string(), "request body is mandatory");
    }

    #[test]
    fn non_numeric_id_is_a_parse_error() {
        let err = TransferRequest::parse("abc", br#"{"target":2,"amount":1}"#).unwrap_err();
        assert!(matches!(err, RequestError::InvalidAccountId(_)));
    }

    #[test]
    fn wrong_field_type_is_a_parse_error() {
        let err = TopUpRequest::parse("1", br#"{"amount":"ten"}"#).unwrap_err();
        assert!(matches!(err, RequestError::MalformedBody(_)));

        let err = TopUpRequest::parse("1", br#"{"amount":1.5}"#).unwrap_err();
        assert!(matches!(err, RequestError::MalformedBody(_)));
    }

    #[test]
    fn null_body_parses_but_fails_validation() {
        let req = TopUpRequest::parse("1", b"null").unwrap();
        assert!(req.data.is_none());
        assert_eq!(req.validate().unwrap_err(), ValidationError::MissingData);
    }

    #[test]
    fn missing_amount_defaults_to_zero_and_is_rejected() {
        let req = TopUpRequest::parse("1", b"{}").unwrap();
        assert_eq!(req.validate().unwrap_err(), ValidationError::AmountBelowOne);

        let req = TransferRequest::parse("1", br#"{"target":2,"amount":-5}"#).unwrap();
        assert_eq!(req.validate().unwrap_err(), ValidationError::AmountBelowOne);
    }

    #[test]
    fn valid_transfer_carries_all_fields() {
        let req = TransferRequest::parse("7", br#"{"target":9,"amount":40}"#).unwrap();
        assert_eq!(
            req.validate().unwrap(),
            Transfer {
                source: AccountId::new(7),
                target: AccountId::new(9),
                amount: 40,
            }
        );
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let req = TopUpRequest::parse("3", br#"{"amount":5,"note":"x"}"#).unwrap();
        assert_eq!(req.validate().unwrap().amount, 5);
    }
}

//! Canonical operation results

use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::payments::codec::Payload;
use crate::payments::types::{Currency, TransactionType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PaymentStatus {
    Approved,
    Declined,
}

/// Coarse category of a bank return code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StatusDetail {
    Approved,
    BankCall,
    Reject,
    TryAgain,
    InvalidTransaction,
    InsufficientBalance,
    ExpiredCard,
    DoesNotAllowCardHolder,
    RestrictedCard,
    RequestRejected,
    GeneralError,
    /// 3D authentication or the callback hash did not check out
    AuthenticationFailed,
    UnrecognizedCode,
}

/// Normalized outcome of one operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentResult {
    pub status: PaymentStatus,
    pub status_detail: StatusDetail,
    pub transaction_type: TransactionType,
    /// Bank literal for the transaction type
    pub transaction: Option<String>,
    pub proc_return_code: Option<String>,
    pub order_id: Option<String>,
    pub group_id: Option<String>,
    pub trans_id: Option<String>,
    pub auth_code: Option<String>,
    pub host_ref_num: Option<String>,
    pub response: Option<String>,
    pub masked_number: Option<String>,
    pub amount: Option<Decimal>,
    pub currency: Option<Currency>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,

    // 3D Secure
    pub transaction_security: Option<String>,
    pub md_status: Option<String>,
    pub md_error_message: Option<String>,
    pub eci: Option<String>,
    pub cavv: Option<String>,
    pub xid: Option<String>,
    pub hash: Option<String>,

    // Queries
    pub order_status: Option<String>,
    pub first_amount: Option<Decimal>,
    pub capture_amount: Option<Decimal>,
    pub refund_amount: Option<Decimal>,
    pub capture: Option<bool>,
    pub trans_count: Option<u32>,

    /// Untouched bank reply
    pub all: Payload,
    /// Untouched 3D callback, when the operation had one
    pub three_d_all: Option<Payload>,
}

impl PaymentResult {
    pub fn new(transaction_type: TransactionType) -> Self {
        Self {
            status: PaymentStatus::Declined,
            status_detail: StatusDetail::UnrecognizedCode,
            transaction_type,
            transaction: None,
            proc_return_code: None,
            order_id: None,
            group_id: None,
            trans_id: None,
            auth_code: None,
            host_ref_num: None,
            response: None,
            masked_number: None,
            amount: None,
            currency: None,
            error_code: None,
            error_message: None,
            transaction_security: None,
            md_status: None,
            md_error_message: None,
            eci: None,
            cavv: None,
            xid: None,
            hash: None,
            order_status: None,
            first_amount: None,
            capture_amount: None,
            refund_amount: None,
            capture: None,
            trans_count: None,
            all: Payload::new(),
            three_d_all: None,
        }
    }

    /// Declined result for a callback whose integrity check failed. Nothing
    /// was sent to the bank.
    pub fn hash_rejected(
        transaction_type: TransactionType,
        order_id: Option<String>,
        callback: Payload,
    ) -> Self {
        let mut result = Self::new(transaction_type);
        result.status_detail = StatusDetail::AuthenticationFailed;
        result.order_id = order_id;
        result.error_message = Some("hash check failed".to_string());
        result.three_d_all = Some(callback);
        result
    }

    pub fn approve(&mut self) {
        self.status = PaymentStatus::Approved;
        self.status_detail = StatusDetail::Approved;
    }

    pub fn is_approved(&self) -> bool {
        self.status == PaymentStatus::Approved
    }

    /// Combine a 3D authentication result with the provisioning result that
    /// followed it.
    ///
    /// The payment step decides status and owns the financial fields unless
    /// it left them empty; the 3D step owns the security fields.
    pub fn merge(three_d: PaymentResult, payment: PaymentResult) -> PaymentResult {
        fn prefer<T>(payment: Option<T>, three_d: Option<T>) -> Option<T> {
            payment.or(three_d)
        }

        PaymentResult {
            status: payment.status,
            status_detail: payment.status_detail,
            transaction_type: payment.transaction_type,
            transaction: prefer(payment.transaction, three_d.transaction),
            proc_return_code: prefer(payment.proc_return_code, three_d.proc_return_code),
            order_id: prefer(payment.order_id, three_d.order_id),
            group_id: prefer(payment.group_id, three_d.group_id),
            trans_id: prefer(payment.trans_id, three_d.trans_id),
            auth_code: prefer(payment.auth_code, three_d.auth_code),
            host_ref_num: prefer(payment.host_ref_num, three_d.host_ref_num),
            response: prefer(payment.response, three_d.response),
            masked_number: prefer(payment.masked_number, three_d.masked_number),
            amount: prefer(payment.amount, three_d.amount),
            currency: prefer(payment.currency, three_d.currency),
            error_code: prefer(payment.error_code, three_d.error_code),
            error_message: prefer(payment.error_message, three_d.error_message),
            transaction_security: prefer(three_d.transaction_security, payment.transaction_security),
            md_status: prefer(three_d.md_status, payment.md_status),
            md_error_message: prefer(three_d.md_error_message, payment.md_error_message),
            eci: prefer(three_d.eci, payment.eci),
            cavv: prefer(three_d.cavv, payment.cavv),
            xid: prefer(three_d.xid, payment.xid),
            hash: prefer(three_d.hash, payment.hash),
            order_status: prefer(payment.order_status, three_d.order_status),
            first_amount: prefer(payment.first_amount, three_d.first_amount),
            capture_amount: prefer(payment.capture_amount, three_d.capture_amount),
            refund_amount: prefer(payment.refund_amount, three_d.refund_amount),
            capture: prefer(payment.capture, three_d.capture),
            trans_count: prefer(payment.trans_count, three_d.trans_count),
            all: payment.all,
            three_d_all: prefer(three_d.three_d_all, payment.three_d_all),
        }
    }
}

/// Security level implied by a 3D `mdStatus`
pub fn transaction_security(md_status: Option<&str>) -> &'static str {
    match md_status {
        Some("1") => "Full 3D Secure",
        Some("2") | Some("3") | Some("4") => "Half 3D Secure",
        _ => "MPI fallback",
    }
}

/// `mdStatus` values under which the bank still accepts provisioning
pub fn md_status_authorized(md_status: Option<&str>) -> bool {
    matches!(md_status, Some("1") | Some("2") | Some("3") | Some("4"))
}

/// Form the caller must auto-submit to the cardholder's browser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectForm {
    pub gateway: String,
    pub inputs: IndexMap<String, String>,
}

/// Outcome of preparing a 3D Secure redirect
#[derive(Debug, Clone, PartialEq)]
pub enum ThreeDInit {
    /// Card participates; present the form
    Redirect(RedirectForm),
    /// Card is not enrolled in 3D Secure
    NotEnrolled { raw: Payload },
    /// Directory server could not decide
    CannotProcess { raw: Payload },
    /// Bank refused the enrollment or initialisation request
    Rejected {
        code: Option<String>,
        message: Option<String>,
        raw: Payload,
    },
}

impl ThreeDInit {
    pub fn redirect_form(&self) -> Option<&RedirectForm> {
        match self {
            ThreeDInit::Redirect(form) => Some(form),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_merge_prefers_payment_for_financial_fields() {
        let mut three_d = PaymentResult::new(TransactionType::Pay);
        three_d.order_id = Some("ORD-1".to_string());
        three_d.amount = Some(dec!(1.00));
        three_d.md_status = Some("1".to_string());
        three_d.eci = Some("05".to_string());
        three_d.auth_code = Some("stale".to_string());

        let mut payment = PaymentResult::new(TransactionType::Pay);
        payment.approve();
        payment.auth_code = Some("P12345".to_string());
        payment.eci = Some("07".to_string());

        let merged = PaymentResult::merge(three_d, payment);
        assert!(merged.is_approved());
        assert_eq!(merged.auth_code.as_deref(), Some("P12345"));
        assert_eq!(merged.order_id.as_deref(), Some("ORD-1"));
        assert_eq!(merged.amount, Some(dec!(1.00)));
        assert_eq!(merged.eci.as_deref(), Some("05"));
        assert_eq!(merged.md_status.as_deref(), Some("1"));
    }

    #[test]
    fn test_transaction_security_levels() {
        assert_eq!(transaction_security(Some("1")), "Full 3D Secure");
        assert_eq!(transaction_security(Some("4")), "Half 3D Secure");
        assert_eq!(transaction_security(Some("0")), "MPI fallback");
        assert_eq!(transaction_security(None), "MPI fallback");
    }

    #[test]
    fn test_hash_rejected_is_declined() {
        let result = PaymentResult::hash_rejected(TransactionType::Pay, Some("ORD-1".into()), Payload::new());
        assert!(!result.is_approved());
        assert_eq!(result.status_detail, StatusDetail::AuthenticationFailed);
        assert_eq!(result.error_message.as_deref(), Some("hash check failed"));
    }

    #[test]
    fn test_status_serializes_in_snake_case() {
        let json = serde_json::to_string(&StatusDetail::InsufficientBalance).unwrap();
        assert_eq!(json, "\"insufficient_balance\"");
        assert_eq!(PaymentStatus::Approved.to_string(), "approved");
    }
}

//! PayFor virtual POS (QNB Finansbank and its white labels)
//!
//! API calls are `PayforRequest` XML documents. Every request carries the
//! institution code `MbrId`; follow-up operations reference the original
//! order as `OrgOrderId`. 3D model payments are finalized with the
//! `RequestGuid` the bank posts back, not with the card.

use tracing::debug;

use crate::error::{GatewayError, GatewayResult};
use crate::payments::amount::{amount_plain, parse_amount};
use crate::payments::codec::{encode_xml, Decoded, Payload, XmlOptions};
use crate::payments::hash::constant_time_eq;
use crate::payments::providers::{decode_xml_reply, BankTables, EST_RETURN_CODES, ISO_CURRENCIES};
use crate::payments::result::{PaymentResult, PaymentStatus, RedirectForm, StatusDetail};
use crate::payments::traits::{BankProvider, EncodedBody, RequestKind};
use crate::payments::types::{Account, Bank, Card, Order, SecurityModel, TransactionType};

static TABLES: BankTables = BankTables {
    bank: Bank::PayFor,
    transaction_types: &[
        (TransactionType::Pay, "Auth"),
        (TransactionType::PreAuth, "PreAuth"),
        (TransactionType::PostAuth, "PostAuth"),
        (TransactionType::Cancel, "Void"),
        (TransactionType::Refund, "Refund"),
        (TransactionType::History, "TxnHistory"),
        (TransactionType::Status, "OrderInquiry"),
    ],
    security_models: &[
        (SecurityModel::ThreeDSecure, "3DModel"),
        (SecurityModel::ThreeDPay, "3DPay"),
        (SecurityModel::ThreeDHost, "3DHost"),
        (SecurityModel::NonSecure, "NonSecure"),
    ],
    card_brands: &[],
    currencies: ISO_CURRENCIES,
    frequency_units: &[],
    return_codes: EST_RETURN_CODES,
    approved_code: "00",
    moto: "0",
};

const XML: XmlOptions = XmlOptions::new("PayforRequest", "UTF-8");

/// Institution code assigned by the bank
const MBR_ID: &str = "5";
const THREE_D_PAYMENT: &str = "3DModelPayment";
const INQUIRY: &str = "Inquiry";
const REPORT: &str = "Report";

pub fn tables() -> &'static BankTables {
    &TABLES
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PayForProvider;

impl PayForProvider {
    fn credentials(account: &Account) -> Payload {
        Payload::new()
            .with("MerchantId", account.client_id.as_str())
            .with("UserCode", account.username.as_str())
            .with("UserPass", account.password.as_str())
    }

    fn non_secure() -> GatewayResult<&'static str> {
        TABLES.security_model(SecurityModel::NonSecure)
    }

    fn card_fields(payload: &mut Payload, card: &Card) {
        payload.insert("CardHolderName", card.holder_name().map(str::to_string));
        payload.insert("Pan", card.number());
        payload.insert("Expiry", card.expiry_month_year());
        payload.insert("Cvv2", card.cvv());
    }

    fn three_d_authorized(callback: &Payload) -> bool {
        callback.text("3DStatus") == Some("1")
    }

    /// Hosted models: the callback carries both the 3D outcome and the
    /// provisioning result.
    fn callback_result(&self, tx: TransactionType, callback: &Payload) -> PaymentResult {
        let three_d = self.map_three_d_callback(tx, callback);
        let payment = self.map_payment_response(tx, callback);
        let mut result = PaymentResult::merge(three_d, payment);
        if !Self::three_d_authorized(callback) {
            result.status = PaymentStatus::Declined;
            result.status_detail = StatusDetail::AuthenticationFailed;
        }
        result
    }
}

impl BankProvider for PayForProvider {
    fn bank(&self) -> Bank {
        Bank::PayFor
    }

    fn tables(&self) -> &'static BankTables {
        &TABLES
    }

    fn payment_request(
        &self,
        account: &Account,
        order: &Order,
        card: &Card,
        tx: TransactionType,
        _test_mode: bool,
    ) -> GatewayResult<Payload> {
        let mut payload = Self::credentials(account)
            .with("MbrId", MBR_ID)
            .with("MOTO", TABLES.moto)
            .with("OrderId", order.id.as_str())
            .with("SecureType", Self::non_secure()?)
            .with("TxnType", TABLES.transaction_type(tx)?)
            .with("PurchAmount", amount_plain(order.amount))
            .with("Currency", TABLES.currency(order.currency())?)
            .with("InstallmentCount", TABLES.installment(order.installment()))
            .with("Lang", order.lang(account).to_string());
        Self::card_fields(&mut payload, card);
        Ok(payload)
    }

    fn three_d_payment_request(
        &self,
        account: &Account,
        order: &Order,
        _card: Option<&Card>,
        tx: TransactionType,
        callback: &Payload,
        _test_mode: bool,
    ) -> GatewayResult<Payload> {
        TABLES.transaction_type(tx)?;
        let request_guid = callback
            .string("RequestGuid")
            .ok_or_else(|| GatewayError::missing_field("RequestGuid"))?;

        Ok(Payload::new()
            .with("RequestGuid", request_guid)
            .with("UserCode", account.username.as_str())
            .with("UserPass", account.password.as_str())
            .with("OrderId", order.id.as_str())
            .with("SecureType", THREE_D_PAYMENT))
    }

    fn post_auth_request(
        &self,
        account: &Account,
        order: &Order,
        _test_mode: bool,
    ) -> GatewayResult<Payload> {
        Ok(Self::credentials(account)
            .with("MbrId", MBR_ID)
            .with("OrgOrderId", order.id.as_str())
            .with("SecureType", Self::non_secure()?)
            .with("TxnType", TABLES.transaction_type(TransactionType::PostAuth)?)
            .with("PurchAmount", amount_plain(order.amount))
            .with("Currency", TABLES.currency(order.currency())?)
            .with("Lang", order.lang(account).to_string()))
    }

    fn cancel_request(
        &self,
        account: &Account,
        order: &Order,
        _test_mode: bool,
    ) -> GatewayResult<Payload> {
        Ok(Self::credentials(account)
            .with("MbrId", MBR_ID)
            .with("OrgOrderId", order.id.as_str())
            .with("SecureType", Self::non_secure()?)
            .with("TxnType", TABLES.transaction_type(TransactionType::Cancel)?)
            .with("Currency", TABLES.currency(order.currency())?)
            .with("Lang", order.lang(account).to_string()))
    }

    fn refund_request(
        &self,
        account: &Account,
        order: &Order,
        _test_mode: bool,
    ) -> GatewayResult<Payload> {
        Ok(Self::credentials(account)
            .with("MbrId", MBR_ID)
            .with("SecureType", Self::non_secure()?)
            .with("Lang", order.lang(account).to_string())
            .with("OrgOrderId", order.id.as_str())
            .with("TxnType", TABLES.transaction_type(TransactionType::Refund)?)
            .with("PurchAmount", amount_plain(order.amount))
            .with("Currency", TABLES.currency(order.currency())?))
    }

    fn status_request(
        &self,
        account: &Account,
        order: &Order,
        _test_mode: bool,
    ) -> GatewayResult<Payload> {
        Ok(Self::credentials(account)
            .with("MbrId", MBR_ID)
            .with("OrgOrderId", order.id.as_str())
            .with("SecureType", INQUIRY)
            .with("Lang", order.lang(account).to_string())
            .with("TxnType", TABLES.transaction_type(TransactionType::Status)?))
    }

    fn history_request(
        &self,
        account: &Account,
        order: &Order,
        _test_mode: bool,
    ) -> GatewayResult<Payload> {
        Ok(Self::credentials(account)
            .with("MbrId", MBR_ID)
            .with("SecureType", REPORT)
            .with("TxnType", TABLES.transaction_type(TransactionType::History)?)
            .with("Lang", order.lang(account).to_string())
            .with("OrderId", order.id.as_str()))
    }

    fn three_d_form(
        &self,
        account: &Account,
        order: &Order,
        card: Option<&Card>,
        tx: TransactionType,
        gateway_url: &str,
        _test_mode: bool,
    ) -> GatewayResult<RedirectForm> {
        let tx_literal = TABLES.transaction_type(tx)?;
        let amount = amount_plain(order.amount);
        let installment = TABLES.installment(order.installment());
        let success_url = order.success_url()?;
        let fail_url = order.fail_url()?;

        let hash = self.hash_engine().compute(
            &[
                MBR_ID,
                order.id.as_str(),
                amount.as_str(),
                success_url,
                fail_url,
                tx_literal,
                installment.as_str(),
                order.rand(),
            ],
            &account.store_key,
        );

        let mut inputs = Payload::new()
            .with("MbrId", MBR_ID)
            .with("MerchantID", account.client_id.as_str())
            .with("UserCode", account.username.as_str())
            .with("OrderId", order.id.as_str())
            .with("Lang", order.lang(account).to_string())
            .with("SecureType", TABLES.security_model(account.model)?)
            .with("TxnType", tx_literal)
            .with("PurchAmount", amount)
            .with("InstallmentCount", installment)
            .with("Currency", TABLES.currency(order.currency())?)
            .with("OkUrl", success_url)
            .with("FailUrl", fail_url)
            .with("Rnd", order.rand())
            .with("Hash", hash);
        if let Some(card) = card {
            Self::card_fields(&mut inputs, card);
        }

        debug!("Prepared PayFor 3D form for order {}", order.id);
        Ok(RedirectForm {
            gateway: gateway_url.to_string(),
            inputs: inputs.to_flat(),
        })
    }

    /// `ResponseHash` covers merchant, store key, the outcome fields and the
    /// API user, in that order.
    fn verify_callback(&self, account: &Account, _order: &Order, callback: &Payload) -> bool {
        let Some(received) = callback.text("ResponseHash") else {
            return false;
        };
        let field = |key: &str| callback.text(key).unwrap_or_default();
        let expected = self.hash_engine().digest(
            &[
                account.client_id.as_str(),
                account.store_key.as_str(),
                field("OrderId"),
                field("AuthCode"),
                field("ProcReturnCode"),
                field("3DStatus"),
                field("ResponseRnd"),
                account.username.as_str(),
            ]
            .concat(),
        );
        constant_time_eq(&expected, &received.trim().to_ascii_uppercase())
    }

    fn callback_authorizes_payment(&self, callback: &Payload) -> bool {
        Self::three_d_authorized(callback)
    }

    fn encode(&self, _kind: RequestKind, payload: &Payload) -> GatewayResult<EncodedBody> {
        Ok(EncodedBody {
            body: encode_xml(&XML, payload)?,
            content_type: "text/xml; charset=UTF-8",
        })
    }

    fn decode(&self, _kind: RequestKind, body: &[u8]) -> GatewayResult<Decoded> {
        decode_xml_reply(Bank::PayFor, body, XML.encoding)
    }

    fn map_payment_response(&self, tx: TransactionType, raw: &Payload) -> PaymentResult {
        let mut result = TABLES.result_for(tx, raw.text("ProcReturnCode"));
        result.order_id = raw.string("OrderId");
        result.trans_id = raw.string("TransId");
        result.auth_code = raw.string("AuthCode");
        result.host_ref_num = raw.string("HostRefNum");
        result.error_message = raw.string("ErrMsg");
        result.error_code = result
            .error_message
            .as_ref()
            .and(result.proc_return_code.clone());
        result.all = raw.clone();
        result
    }

    fn map_three_d_callback(&self, tx: TransactionType, callback: &Payload) -> PaymentResult {
        let authorized = Self::three_d_authorized(callback);
        let security = if authorized { "Full 3D Secure" } else { "MPI fallback" };
        let mut result = PaymentResult::new(tx);
        result.transaction = TABLES.transaction_type(tx).ok().map(str::to_string);
        result.order_id = callback.string("OrderId");
        result.xid = callback.string("OrderId");
        result.md_status = callback.string("3DStatus");
        result.transaction_security = Some(security.to_string());
        result.hash = callback.string("ResponseHash");
        result.masked_number = callback.string("CardMask");
        result.amount = callback.text("PurchAmount").and_then(parse_amount);
        result.currency = callback
            .text("Currency")
            .and_then(|code| TABLES.currency_from(code));
        if !authorized {
            result.status_detail = StatusDetail::AuthenticationFailed;
            result.md_error_message = callback.string("ErrMsg");
        }
        result.three_d_all = Some(callback.clone());
        result
    }

    fn map_three_d_pay(
        &self,
        tx: TransactionType,
        callback: &Payload,
    ) -> GatewayResult<PaymentResult> {
        Ok(self.callback_result(tx, callback))
    }

    fn map_three_d_host(
        &self,
        tx: TransactionType,
        callback: &Payload,
    ) -> GatewayResult<PaymentResult> {
        Ok(self.callback_result(tx, callback))
    }

    fn map_status_response(&self, raw: &Payload) -> PaymentResult {
        let mut result = self.map_payment_response(TransactionType::Status, raw);
        result.order_status = raw.string("TxnResult");
        result.refund_amount = raw.text("RefundedAmount").and_then(parse_amount);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::codec::Value;
    use crate::payments::types::Lang;
    use rust_decimal_macros::dec;

    fn create_test_account() -> Account {
        Account::new(
            Bank::PayFor,
            "085300000009704",
            "QNB_API_KULLANICI_3DPAY",
            "UcBN0",
            "12345678",
            SecurityModel::ThreeDSecure,
        )
        .with_lang(Lang::Tr)
    }

    fn create_test_order() -> Order {
        Order::new("order222", dec!(100.01))
            .unwrap()
            .with_redirect_urls("https://domain.com/success", "https://domain.com/fail_url")
            .with_rand("0.43625700 1604831630")
            .with_installment(0)
            .with_defaults()
    }

    fn create_test_card() -> Card {
        Card::new("4155650100416111", 1, 25, "123")
            .unwrap()
            .with_holder_name("John Doe")
    }

    fn signed_callback(account: &Account, three_d_status: &str) -> Payload {
        let hash = PayForProvider.hash_engine().digest(&format!(
            "{}{}order222P1234500{}rnd-1{}",
            account.client_id, account.store_key, three_d_status, account.username
        ));
        Payload::new()
            .with("OrderId", "order222")
            .with("AuthCode", "P12345")
            .with("ProcReturnCode", "00")
            .with("3DStatus", three_d_status)
            .with("ResponseRnd", "rnd-1")
            .with("RequestGuid", "1000000057437884")
            .with("PurchAmount", "100.01")
            .with("Currency", "949")
            .with("ResponseHash", hash)
    }

    #[test]
    fn test_non_secure_payment_request() {
        let payload = PayForProvider
            .payment_request(
                &create_test_account(),
                &create_test_order(),
                &create_test_card(),
                TransactionType::Pay,
                true,
            )
            .unwrap();

        assert_eq!(payload.text("MerchantId"), Some("085300000009704"));
        assert_eq!(payload.text("MbrId"), Some("5"));
        assert_eq!(payload.text("MOTO"), Some("0"));
        assert_eq!(payload.text("SecureType"), Some("NonSecure"));
        assert_eq!(payload.text("TxnType"), Some("Auth"));
        assert_eq!(payload.text("PurchAmount"), Some("100.01"));
        assert_eq!(payload.text("InstallmentCount"), Some("0"));
        assert_eq!(payload.text("Expiry"), Some("0125"));
        assert_eq!(payload.text("CardHolderName"), Some("John Doe"));
    }

    #[test]
    fn test_three_d_form_hash_field_order() {
        let account = create_test_account();
        let form = PayForProvider
            .three_d_form(&account, &create_test_order(), None, TransactionType::Pay, "https://vpostest.qnbfinansbank.com/Gateway/Default.aspx", true)
            .unwrap();

        let expected = PayForProvider.hash_engine().digest(
            "5order222100.01https://domain.com/successhttps://domain.com/fail_urlAuth00.43625700 160483163012345678",
        );
        assert_eq!(form.inputs["Hash"], expected);
        assert_eq!(form.inputs["SecureType"], "3DModel");
        assert_eq!(form.inputs["MerchantID"], "085300000009704");
        assert!(!form.inputs.contains_key("Pan"));
    }

    #[test]
    fn test_three_d_form_secure_type_follows_model() {
        let account = Account::new(Bank::PayFor, "1", "api", "pass", "key", SecurityModel::ThreeDHost);
        let form = PayForProvider
            .three_d_form(&account, &create_test_order(), None, TransactionType::PreAuth, "https://bank.test/3d", true)
            .unwrap();
        assert_eq!(form.inputs["SecureType"], "3DHost");
        assert_eq!(form.inputs["TxnType"], "PreAuth");
    }

    #[test]
    fn test_three_d_payment_finalized_by_request_guid() {
        let account = create_test_account();
        let callback = signed_callback(&account, "1");
        let payload = PayForProvider
            .three_d_payment_request(&account, &create_test_order(), None, TransactionType::Pay, &callback, true)
            .unwrap();

        assert_eq!(payload.text("RequestGuid"), Some("1000000057437884"));
        assert_eq!(payload.text("SecureType"), Some("3DModelPayment"));
        assert_eq!(payload.text("OrderId"), Some("order222"));
        assert!(payload.get("Pan").is_none());

        let err = PayForProvider
            .three_d_payment_request(&account, &create_test_order(), None, TransactionType::Pay, &Payload::new(), true)
            .unwrap_err();
        assert!(matches!(err, GatewayError::MissingField { .. }));
    }

    #[test]
    fn test_query_requests() {
        let account = create_test_account();
        let order = create_test_order();

        let status = PayForProvider.status_request(&account, &order, true).unwrap();
        assert_eq!(status.text("SecureType"), Some("Inquiry"));
        assert_eq!(status.text("TxnType"), Some("OrderInquiry"));
        assert_eq!(status.text("OrgOrderId"), Some("order222"));

        let history = PayForProvider.history_request(&account, &order, true).unwrap();
        assert_eq!(history.text("SecureType"), Some("Report"));
        assert_eq!(history.text("TxnType"), Some("TxnHistory"));
        assert_eq!(history.text("OrderId"), Some("order222"));
    }

    #[test]
    fn test_cancel_and_refund_reference_original_order() {
        let account = create_test_account();
        let order = create_test_order();

        let cancel = PayForProvider.cancel_request(&account, &order, true).unwrap();
        assert_eq!(cancel.text("TxnType"), Some("Void"));
        assert_eq!(cancel.text("OrgOrderId"), Some("order222"));
        assert!(cancel.get("PurchAmount").is_none());

        let refund = PayForProvider.refund_request(&account, &order, true).unwrap();
        assert_eq!(refund.text("TxnType"), Some("Refund"));
        assert_eq!(refund.text("PurchAmount"), Some("100.01"));

        let body = PayForProvider
            .encode(RequestKind::Transaction, &refund)
            .unwrap()
            .body;
        let body = String::from_utf8(body).unwrap();
        assert!(body.contains("<PayforRequest>"));
        assert!(body.contains("<OrgOrderId>order222</OrgOrderId>"));
    }

    #[test]
    fn test_callback_hash_check() {
        let account = create_test_account();
        let order = create_test_order();
        let callback = signed_callback(&account, "1");
        assert!(PayForProvider.verify_callback(&account, &order, &callback));

        let tampered = callback.clone().with("ProcReturnCode", "05");
        assert!(!PayForProvider.verify_callback(&account, &order, &tampered));

        let unsigned = callback.with("ResponseHash", Value::Null);
        assert!(!PayForProvider.verify_callback(&account, &order, &unsigned));
    }

    #[test]
    fn test_failed_authentication_blocks_provisioning() {
        let callback = signed_callback(&create_test_account(), "0");
        assert!(!PayForProvider.callback_authorizes_payment(&callback));

        let result = PayForProvider.map_three_d_callback(TransactionType::Pay, &callback);
        assert_eq!(result.status_detail, StatusDetail::AuthenticationFailed);
        assert_eq!(result.md_status.as_deref(), Some("0"));

        let result = PayForProvider.map_three_d_pay(TransactionType::Pay, &callback).unwrap();
        assert!(!result.is_approved());
    }

    #[test]
    fn test_three_d_pay_approved() {
        let callback = signed_callback(&create_test_account(), "1");
        let result = PayForProvider.map_three_d_pay(TransactionType::Pay, &callback).unwrap();
        assert!(result.is_approved());
        assert_eq!(result.auth_code.as_deref(), Some("P12345"));
        assert_eq!(result.amount, Some(dec!(100.01)));
        assert_eq!(result.transaction_security.as_deref(), Some("Full 3D Secure"));
    }

    #[test]
    fn test_declined_payment_response() {
        let reply = br#"<?xml version="1.0" encoding="UTF-8"?>
<PayforResponse>
  <OrderId>order222</OrderId>
  <AuthCode></AuthCode>
  <ProcReturnCode>51</ProcReturnCode>
  <ErrMsg>Yetersiz bakiye</ErrMsg>
</PayforResponse>"#;
        let Decoded::Structured(raw) = PayForProvider.decode(RequestKind::Transaction, reply).unwrap()
        else {
            panic!("expected structured reply");
        };
        let result = PayForProvider.map_payment_response(TransactionType::Pay, &raw.normalized());

        assert!(!result.is_approved());
        assert_eq!(result.status_detail, StatusDetail::InsufficientBalance);
        assert_eq!(result.error_code.as_deref(), Some("51"));
        assert_eq!(result.auth_code, None);
    }
}

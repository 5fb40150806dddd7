//! Garanti BBVA virtual POS (GVPS)
//!
//! Requests are `GVPSRequest` XML documents. Every request carries a
//! `HashData` keyed by a security token derived from the terminal password;
//! refund and cancel are signed with the refund password instead.

use tracing::debug;

use crate::error::GatewayResult;
use crate::payments::amount::{amount_format, parse_minor_amount};
use crate::payments::codec::{encode_xml, Decoded, Payload, Value, XmlOptions};
use crate::payments::hash::HashParamKeys;
use crate::payments::providers::{
    decode_xml_reply, BankTables, EST_RETURN_CODES, ISO_CURRENCIES,
};
use crate::payments::result::{
    md_status_authorized, transaction_security, PaymentResult, PaymentStatus, RedirectForm,
    StatusDetail,
};
use crate::payments::traits::{BankProvider, EncodedBody, RequestKind};
use crate::payments::types::{
    Account, Bank, Card, FrequencyUnit, Order, SecurityModel, TransactionType,
};

static TABLES: BankTables = BankTables {
    bank: Bank::Garanti,
    transaction_types: &[
        (TransactionType::Pay, "sales"),
        (TransactionType::PreAuth, "preauth"),
        (TransactionType::PostAuth, "postauth"),
        (TransactionType::Cancel, "void"),
        (TransactionType::Refund, "refund"),
        (TransactionType::History, "orderhistoryinq"),
        (TransactionType::Status, "orderinq"),
    ],
    security_models: &[
        (SecurityModel::ThreeDSecure, "3D"),
        (SecurityModel::ThreeDPay, "3D_PAY"),
    ],
    card_brands: &[],
    currencies: ISO_CURRENCIES,
    frequency_units: &[
        (FrequencyUnit::Day, "D"),
        (FrequencyUnit::Week, "W"),
        (FrequencyUnit::Month, "M"),
    ],
    return_codes: EST_RETURN_CODES,
    approved_code: "00",
    moto: "N",
};

const XML: XmlOptions = XmlOptions::new("GVPSRequest", "UTF-8");
const API_VERSION: &str = "v0.01";

pub fn tables() -> &'static BankTables {
    &TABLES
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GarantiProvider;

impl GarantiProvider {
    fn mode(test_mode: bool) -> &'static str {
        if test_mode {
            "TEST"
        } else {
            "PROD"
        }
    }

    /// Terminal id left-padded with zeros to nine digits
    fn padded_terminal_id(terminal_id: &str) -> String {
        match terminal_id.trim().parse::<u64>() {
            Ok(id) => format!("{:09}", id),
            Err(_) => format!("{:0>9}", terminal_id.trim()),
        }
    }

    /// Hash of the password for `tx` and the padded terminal id
    fn security_data(&self, account: &Account, tx: TransactionType) -> GatewayResult<String> {
        let terminal_id = Self::padded_terminal_id(account.terminal_id()?);
        Ok(self
            .hash_engine()
            .digest(&format!("{}{}", account.password_for(tx), terminal_id)))
    }

    fn request_hash(
        &self,
        account: &Account,
        order: &Order,
        tx: TransactionType,
        card: Option<&Card>,
    ) -> GatewayResult<String> {
        let security_data = self.security_data(account, tx)?;
        let amount = amount_format(order.amount)?.to_string();
        Ok(self.hash_engine().compute(
            &[
                order.id.as_str(),
                account.terminal_id()?,
                card.map(Card::number).unwrap_or_default(),
                amount.as_str(),
            ],
            &security_data,
        ))
    }

    fn terminal(account: &Account, tx: TransactionType, hash: String) -> GatewayResult<Payload> {
        let username = account.username_for(tx);
        Ok(Payload::new()
            .with("ProvUserID", username)
            .with("UserID", username)
            .with("HashData", hash)
            .with("ID", account.terminal_id()?)
            .with("MerchantID", account.client_id.as_str()))
    }

    fn envelope(
        &self,
        account: &Account,
        order: &Order,
        tx: TransactionType,
        card: Option<&Card>,
        test_mode: bool,
    ) -> GatewayResult<Payload> {
        let hash = self.request_hash(account, order, tx, card)?;
        Ok(Payload::new()
            .with("Mode", Self::mode(test_mode))
            .with("Version", API_VERSION)
            .with("Terminal", Self::terminal(account, tx, hash)?))
    }

    fn customer(order: &Order) -> Payload {
        Payload::new()
            .with("IPAddress", order.ip.clone().unwrap_or_default())
            .with("EmailAddress", order.email.clone().unwrap_or_default())
    }

    fn address_list(order: &Order) -> Payload {
        let mut address = Payload::new()
            .with("Type", "B")
            .with("Name", order.name.clone());
        for field in [
            "LastName",
            "Company",
            "Text",
            "District",
            "City",
            "PostalCode",
            "Country",
            "PhoneNumber",
        ] {
            address.insert(field, "");
        }
        Payload::new().with("Address", address)
    }

    fn query_transaction(&self, order: &Order, tx: TransactionType) -> GatewayResult<Payload> {
        Ok(Payload::new()
            .with("Type", TABLES.transaction_type(tx)?)
            .with("InstallmentCnt", TABLES.installment(order.installment()))
            .with("Amount", amount_format(order.amount)?)
            .with("CurrencyCode", TABLES.currency(order.currency())?)
            .with("CardholderPresentCode", "0")
            .with("MotoInd", TABLES.moto))
    }

    fn simple_request(
        &self,
        account: &Account,
        order: &Order,
        tx: TransactionType,
        test_mode: bool,
    ) -> GatewayResult<Payload> {
        let mut transaction = self.query_transaction(order, tx)?;
        if matches!(tx, TransactionType::Cancel | TransactionType::Refund) {
            transaction.insert("OriginalRetrefNum", order.ref_ret_num.clone());
        }
        Ok(self
            .envelope(account, order, tx, None, test_mode)?
            .with("Customer", Self::customer(order))
            .with("Order", Payload::new().with("OrderID", order.id.as_str()))
            .with("Transaction", transaction))
    }

    fn recurring(&self, order: &Order, payload: &mut Payload) -> GatewayResult<()> {
        if let Some(recurring) = &order.recurring {
            payload.insert(
                "Recurring",
                Payload::new()
                    .with("TotalPaymentNum", recurring.installment_count.to_string())
                    .with("FrequencyType", TABLES.frequency_unit(recurring.frequency_unit)?)
                    .with("FrequencyInterval", recurring.frequency_interval.to_string())
                    .with("Type", "R")
                    .with(
                        "StartDate",
                        recurring
                            .start_date
                            .map(|date| date.format("%Y%m%d").to_string())
                            .unwrap_or_default(),
                    ),
            );
        }
        Ok(())
    }

    fn proc_return_code(raw: &Payload) -> Option<&str> {
        raw.path(&["Transaction", "Response", "ReasonCode"])
            .or_else(|| raw.path(&["Transaction", "Response", "Code"]))
    }

    fn common_response(&self, tx: TransactionType, raw: &Payload) -> PaymentResult {
        let code = Self::proc_return_code(raw);
        let mut result = TABLES.result_for(tx, code);
        result.order_id = raw.path_string(&["Order", "OrderID"]);
        result.group_id = raw.path_string(&["Order", "GroupID"]);
        result.auth_code = raw.path_string(&["Transaction", "AuthCode"]);
        result.host_ref_num = raw.path_string(&["Transaction", "RetrefNum"]);
        result.trans_id = raw.path_string(&["Transaction", "SequenceNum"]);
        result.response = raw.path_string(&["Transaction", "Response", "Message"]);
        result.masked_number = raw.path_string(&["Transaction", "CardNumberMasked"]);
        if !result.is_approved() {
            result.error_code = code.map(str::to_string);
            result.error_message = raw.path_string(&["Transaction", "Response", "ErrorMsg"]);
        }
        result.all = raw.clone();
        result
    }

    fn callback_fields(&self, tx: TransactionType, callback: &Payload) -> PaymentResult {
        let md_status = callback.text("mdstatus");
        let mut result = PaymentResult::new(tx);
        result.transaction = callback.string("txntype");
        result.order_id = callback.string("orderid");
        result.transaction_security = Some(transaction_security(md_status).to_string());
        result.md_status = md_status.map(str::to_string);
        result.md_error_message = callback.string("mderrormessage");
        result.eci = callback.string("eci");
        result.cavv = callback.string("cavv");
        result.xid = callback.string("xid");
        result.hash = callback.string("hash");
        result.masked_number = callback.string("MaskedPan");
        result.amount = callback.text("txnamount").and_then(parse_minor_amount);
        result.currency = callback
            .text("txncurrencycode")
            .and_then(|code| TABLES.currency_from(code));
        result.three_d_all = Some(callback.clone());
        result
    }
}

impl BankProvider for GarantiProvider {
    fn bank(&self) -> Bank {
        Bank::Garanti
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
        test_mode: bool,
    ) -> GatewayResult<Payload> {
        let mut payload = self
            .envelope(account, order, tx, Some(card), test_mode)?
            .with("Customer", Self::customer(order))
            .with(
                "Card",
                Payload::new()
                    .with("Number", card.number())
                    .with("ExpireDate", card.expiry_month_year())
                    .with("CVV2", card.cvv()),
            )
            .with(
                "Order",
                Payload::new()
                    .with("OrderID", order.id.as_str())
                    .with("AddressList", Self::address_list(order)),
            )
            .with(
                "Transaction",
                Payload::new()
                    .with("Type", TABLES.transaction_type(tx)?)
                    .with("InstallmentCnt", TABLES.installment(order.installment()))
                    .with("Amount", amount_format(order.amount)?)
                    .with("CurrencyCode", TABLES.currency(order.currency())?)
                    .with("CardholderPresentCode", "0")
                    .with("MotoInd", TABLES.moto),
            );
        self.recurring(order, &mut payload)?;
        Ok(payload)
    }

    fn three_d_payment_request(
        &self,
        account: &Account,
        order: &Order,
        _card: Option<&Card>,
        tx: TransactionType,
        callback: &Payload,
        test_mode: bool,
    ) -> GatewayResult<Payload> {
        let mut payload = self
            .envelope(account, order, tx, None, test_mode)?
            .with(
                "Customer",
                Payload::new()
                    .with("IPAddress", callback.string("customeripaddress"))
                    .with("EmailAddress", callback.string("customeremailaddress")),
            )
            .with(
                "Order",
                Payload::new()
                    .with("OrderID", callback.string("orderid"))
                    .with("AddressList", Self::address_list(order)),
            )
            .with(
                "Transaction",
                Payload::new()
                    .with("Type", callback.string("txntype"))
                    .with("InstallmentCnt", TABLES.installment(order.installment()))
                    .with("Amount", callback.string("txnamount"))
                    .with("CurrencyCode", callback.string("txncurrencycode"))
                    .with("CardholderPresentCode", "13")
                    .with("MotoInd", TABLES.moto)
                    .with(
                        "Secure3D",
                        Payload::new()
                            .with("AuthenticationCode", callback.string("cavv"))
                            .with("SecurityLevel", callback.string("eci"))
                            .with("TxnID", callback.string("xid"))
                            .with("Md", callback.string("md")),
                    ),
            );
        self.recurring(order, &mut payload)?;
        Ok(payload)
    }

    fn post_auth_request(
        &self,
        account: &Account,
        order: &Order,
        test_mode: bool,
    ) -> GatewayResult<Payload> {
        let tx = TransactionType::PostAuth;
        Ok(self
            .envelope(account, order, tx, None, test_mode)?
            .with("Customer", Self::customer(order))
            .with("Order", Payload::new().with("OrderID", order.id.as_str()))
            .with(
                "Transaction",
                Payload::new()
                    .with("Type", TABLES.transaction_type(tx)?)
                    .with("Amount", amount_format(order.amount)?)
                    .with("CurrencyCode", TABLES.currency(order.currency())?)
                    .with("OriginalRetrefNum", order.ref_ret_num.clone()),
            ))
    }

    fn cancel_request(
        &self,
        account: &Account,
        order: &Order,
        test_mode: bool,
    ) -> GatewayResult<Payload> {
        self.simple_request(account, order, TransactionType::Cancel, test_mode)
    }

    fn refund_request(
        &self,
        account: &Account,
        order: &Order,
        test_mode: bool,
    ) -> GatewayResult<Payload> {
        self.simple_request(account, order, TransactionType::Refund, test_mode)
    }

    fn status_request(
        &self,
        account: &Account,
        order: &Order,
        test_mode: bool,
    ) -> GatewayResult<Payload> {
        self.simple_request(account, order, TransactionType::Status, test_mode)
    }

    fn history_request(
        &self,
        account: &Account,
        order: &Order,
        test_mode: bool,
    ) -> GatewayResult<Payload> {
        self.simple_request(account, order, TransactionType::History, test_mode)
    }

    fn three_d_form(
        &self,
        account: &Account,
        order: &Order,
        card: Option<&Card>,
        tx: TransactionType,
        gateway_url: &str,
        test_mode: bool,
    ) -> GatewayResult<RedirectForm> {
        let security_level = TABLES.security_model(account.model)?;
        let tx_literal = TABLES.transaction_type(tx)?;
        let terminal_id = account.terminal_id()?;
        let amount = amount_format(order.amount)?.to_string();
        let installment = TABLES.installment(order.installment());
        let success_url = order.success_url()?;
        let fail_url = order.fail_url()?;

        let security_data = self.security_data(account, tx)?;
        let hash = self.hash_engine().compute(
            &[
                terminal_id,
                order.id.as_str(),
                amount.as_str(),
                success_url,
                fail_url,
                tx_literal,
                installment.as_str(),
                account.store_key.as_str(),
            ],
            &security_data,
        );

        let mut form = RedirectForm {
            gateway: gateway_url.to_string(),
            inputs: Default::default(),
        };
        let inputs = &mut form.inputs;
        inputs.insert("secure3dsecuritylevel".into(), security_level.into());
        inputs.insert("mode".into(), Self::mode(test_mode).into());
        inputs.insert("apiversion".into(), API_VERSION.into());
        inputs.insert("terminalprovuserid".into(), account.username.clone());
        inputs.insert("terminaluserid".into(), account.username.clone());
        inputs.insert("terminalmerchantid".into(), account.client_id.clone());
        inputs.insert("terminalid".into(), terminal_id.into());
        inputs.insert("txntype".into(), tx_literal.into());
        inputs.insert("txnamount".into(), amount);
        inputs.insert("txncurrencycode".into(), TABLES.currency(order.currency())?.into());
        inputs.insert("txninstallmentcount".into(), installment);
        inputs.insert("orderid".into(), order.id.clone());
        inputs.insert("successurl".into(), success_url.into());
        inputs.insert("errorurl".into(), fail_url.into());
        inputs.insert("customeremailaddress".into(), order.email.clone().unwrap_or_default());
        inputs.insert("customeripaddress".into(), order.ip.clone().unwrap_or_default());
        inputs.insert("secure3dhash".into(), hash);

        if let Some(card) = card {
            inputs.insert("cardnumber".into(), card.number().into());
            inputs.insert("cardexpiredatemonth".into(), card.month());
            inputs.insert("cardexpiredateyear".into(), card.year_short());
            inputs.insert("cardcvv2".into(), card.cvv().into());
        }

        debug!("Prepared Garanti 3D form for order {}", order.id);
        Ok(form)
    }

    fn verify_callback(&self, account: &Account, _order: &Order, callback: &Payload) -> bool {
        self.hash_engine()
            .verify_hash_params(callback, &HashParamKeys::LOWERCASE, &account.store_key)
            .is_valid()
    }

    fn callback_authorizes_payment(&self, callback: &Payload) -> bool {
        md_status_authorized(callback.text("mdstatus"))
    }

    fn encode(&self, _kind: RequestKind, payload: &Payload) -> GatewayResult<EncodedBody> {
        Ok(EncodedBody {
            body: encode_xml(&XML, payload)?,
            content_type: "text/xml; charset=UTF-8",
        })
    }

    fn decode(&self, _kind: RequestKind, body: &[u8]) -> GatewayResult<Decoded> {
        decode_xml_reply(Bank::Garanti, body, XML.encoding)
    }

    fn map_payment_response(&self, tx: TransactionType, raw: &Payload) -> PaymentResult {
        self.common_response(tx, raw)
    }

    fn map_three_d_callback(&self, tx: TransactionType, callback: &Payload) -> PaymentResult {
        let mut result = self.callback_fields(tx, callback);
        if !self.callback_authorizes_payment(callback) {
            result.status_detail = StatusDetail::AuthenticationFailed;
        }
        result
    }

    fn map_three_d_pay(
        &self,
        tx: TransactionType,
        callback: &Payload,
    ) -> GatewayResult<PaymentResult> {
        let code = callback.text("procreturncode");
        let mut result = self.callback_fields(tx, callback);
        result.proc_return_code = code.map(str::to_string);
        result.auth_code = callback.string("authcode");
        result.host_ref_num = callback.string("hostrefnum");
        result.response = callback.string("response");
        result.status_detail = TABLES.status_detail(code);
        result.all = callback.clone();

        if TABLES.is_approved(code) && self.callback_authorizes_payment(callback) {
            result.approve();
        } else {
            result.status = PaymentStatus::Declined;
            result.error_code = code.map(str::to_string);
            result.error_message = callback.string("errmsg");
            if result.status_detail == StatusDetail::Approved {
                result.status_detail = StatusDetail::AuthenticationFailed;
            }
        }
        Ok(result)
    }

    fn map_status_response(&self, raw: &Payload) -> PaymentResult {
        let mut result = self.common_response(TransactionType::Status, raw);
        result.order_status = raw.path_string(&["Order", "OrderInqResult", "Status"]);
        if result.auth_code.is_none() {
            result.auth_code = raw.path_string(&["Order", "OrderInqResult", "AuthCode"]);
        }
        result
    }

    fn map_history_response(&self, raw: &Payload) -> PaymentResult {
        let mut result = self.common_response(TransactionType::History, raw);
        let transactions = raw
            .map("Order")
            .and_then(|order| order.map("OrderHistInqResult"))
            .and_then(|history| history.map("OrderTxnList"))
            .and_then(|list| list.get("OrderTxn"));
        result.trans_count = Some(match transactions {
            Some(Value::List(items)) => items.len() as u32,
            Some(Value::Map(_)) => 1,
            _ => 0,
        });
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::payments::types::Currency;
    use rust_decimal_macros::dec;

    fn create_test_account() -> Account {
        Account::new(
            Bank::Garanti,
            "7000679",
            "PROVAUT",
            "123qweASD/",
            "12345678",
            SecurityModel::ThreeDSecure,
        )
        .with_terminal_id("30691298")
        .with_refund_credentials("PROVRFN", "123qweASD/refund")
    }

    fn create_test_order() -> Order {
        Order::new("order222", dec!(100.01))
            .unwrap()
            .with_customer("156.155.154.153", "samp@iexample.com")
            .with_redirect_urls("https://domain.com/success", "https://domain.com/fail_url")
            .with_currency(Currency::Try)
            .with_installment(0)
            .with_defaults()
    }

    #[test]
    fn test_padded_terminal_id() {
        assert_eq!(GarantiProvider::padded_terminal_id("30691298"), "030691298");
        assert_eq!(GarantiProvider::padded_terminal_id("000000123"), "000000123");
    }

    #[test]
    fn test_refund_signed_with_refund_password() {
        let account = create_test_account();
        let provider = GarantiProvider;
        let pay = provider.security_data(&account, TransactionType::Pay).unwrap();
        let refund = provider.security_data(&account, TransactionType::Refund).unwrap();

        assert_eq!(pay, provider.hash_engine().digest("123qweASD/030691298"));
        assert_eq!(refund, provider.hash_engine().digest("123qweASD/refund030691298"));
        assert_ne!(pay, refund);
    }

    #[test]
    fn test_refund_request_uses_refund_user() {
        let order = create_test_order().with_ref_ret_num("831803579226");
        let payload = GarantiProvider
            .refund_request(&create_test_account(), &order, true)
            .unwrap();

        assert_eq!(payload.text("Mode"), Some("TEST"));
        assert_eq!(payload.path(&["Terminal", "ProvUserID"]), Some("PROVRFN"));
        assert_eq!(payload.path(&["Transaction", "Type"]), Some("refund"));
        assert_eq!(payload.path(&["Transaction", "Amount"]), Some("10001"));
        assert_eq!(payload.path(&["Transaction", "OriginalRetrefNum"]), Some("831803579226"));
    }

    #[test]
    fn test_amount_beyond_minor_unit_range_is_rejected() {
        let mut order = create_test_order();
        order.amount = dec!(100000000000000000);

        let err = GarantiProvider
            .refund_request(&create_test_account(), &order, true)
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidOrder { .. }));
    }

    #[test]
    fn test_three_d_form_hash_and_fields() {
        let account = create_test_account();
        let order = create_test_order();
        let provider = GarantiProvider;
        let form = provider
            .three_d_form(&account, &order, None, TransactionType::Pay, "https://sanalposprovtest.garanti.com.tr/servlet/gt3dengine", false)
            .unwrap();

        let security_data = provider.security_data(&account, TransactionType::Pay).unwrap();
        let expected = provider.hash_engine().digest(&format!(
            "30691298order22210001https://domain.com/successhttps://domain.com/fail_urlsales12345678{}",
            security_data
        ));
        assert_eq!(form.inputs["secure3dhash"], expected);
        assert_eq!(form.inputs["secure3dsecuritylevel"], "3D");
        assert_eq!(form.inputs["mode"], "PROD");
        assert!(!form.inputs.contains_key("cardnumber"));
    }

    #[test]
    fn test_three_d_host_model_is_unsupported() {
        let mut account = create_test_account();
        account.model = SecurityModel::ThreeDHost;
        let err = GarantiProvider
            .three_d_form(&account, &create_test_order(), None, TransactionType::Pay, "https://x", true)
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_payment_response_mapping() {
        let raw = Payload::new()
            .with("Mode", Value::Null)
            .with("Order", Payload::new().with("OrderID", "order222").with("GroupID", Value::Null))
            .with(
                "Transaction",
                Payload::new()
                    .with(
                        "Response",
                        Payload::new()
                            .with("Source", "HOST")
                            .with("Code", "00")
                            .with("ReasonCode", "00")
                            .with("Message", "Approved"),
                    )
                    .with("RetrefNum", "831803579226")
                    .with("AuthCode", "304919")
                    .with("CardNumberMasked", "554960******5012"),
            );

        let result = GarantiProvider.map_payment_response(TransactionType::Pay, &raw);
        assert!(result.is_approved());
        assert_eq!(result.auth_code.as_deref(), Some("304919"));
        assert_eq!(result.host_ref_num.as_deref(), Some("831803579226"));
        assert_eq!(result.order_id.as_deref(), Some("order222"));
    }

    #[test]
    fn test_history_counts_transactions() {
        let txn = Payload::new().with("Type", "sales");
        let raw = Payload::new()
            .with(
                "Transaction",
                Payload::new().with("Response", Payload::new().with("ReasonCode", "00")),
            )
            .with(
                "Order",
                Payload::new().with(
                    "OrderHistInqResult",
                    Payload::new().with(
                        "OrderTxnList",
                        Payload::new().with(
                            "OrderTxn",
                            Value::List(vec![Value::Map(txn.clone()), Value::Map(txn)]),
                        ),
                    ),
                ),
            );
        let result = GarantiProvider.map_history_response(&raw);
        assert_eq!(result.trans_count, Some(2));
    }
}

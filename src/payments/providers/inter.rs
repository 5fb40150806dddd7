//! InterVPos (Denizbank)
//!
//! Requests are plain form posts; replies are `key=value` pairs separated by
//! `;;`. There is no history query.

use tracing::debug;

use crate::error::{GatewayError, GatewayResult};
use crate::payments::amount::{amount_plain, parse_amount};
use crate::payments::codec::{
    decode_delimited, encode_form, is_html, xml::decode_text, Decoded, Payload, Value,
};
use crate::payments::hash::HashParamKeys;
use crate::payments::providers::{BankTables, ISO_CURRENCIES};
use crate::payments::result::{
    md_status_authorized, transaction_security, PaymentResult, RedirectForm, StatusDetail,
};
use crate::payments::traits::{BankProvider, EncodedBody, RequestKind};
use crate::payments::types::{Account, Bank, Card, CardBrand, Order, SecurityModel, TransactionType};

static TABLES: BankTables = BankTables {
    bank: Bank::Inter,
    transaction_types: &[
        (TransactionType::Pay, "Auth"),
        (TransactionType::PreAuth, "PreAuth"),
        (TransactionType::PostAuth, "PostAuth"),
        (TransactionType::Cancel, "Void"),
        (TransactionType::Refund, "Refund"),
        (TransactionType::Status, "StatusHistory"),
    ],
    security_models: &[
        (SecurityModel::ThreeDSecure, "3DModel"),
        (SecurityModel::ThreeDPay, "3DPay"),
        (SecurityModel::ThreeDHost, "3DHost"),
        (SecurityModel::NonSecure, "NonSecure"),
    ],
    card_brands: &[
        (CardBrand::Visa, "0"),
        (CardBrand::Master, "1"),
        (CardBrand::Amex, "3"),
    ],
    currencies: ISO_CURRENCIES,
    frequency_units: &[],
    return_codes: &[
        ("00", StatusDetail::Approved),
        ("81", StatusDetail::BankCall),
        ("E31", StatusDetail::InvalidTransaction),
        ("E39", StatusDetail::InvalidTransaction),
    ],
    approved_code: "00",
    moto: "0",
};

const NON_SECURE: &str = "NonSecure";
const REPLY_ENCODING: &str = "ISO-8859-9";

pub fn tables() -> &'static BankTables {
    &TABLES
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InterProvider;

impl InterProvider {
    fn credentials(account: &Account) -> Payload {
        Payload::new()
            .with("UserCode", account.username.as_str())
            .with("UserPass", account.password.as_str())
            .with("ShopCode", account.client_id.as_str())
    }

    /// Follow-up on an existing order, which is referenced as `orgOrderId`.
    fn follow_up(account: &Account, order: &Order, tx: TransactionType) -> GatewayResult<Payload> {
        Ok(Self::credentials(account)
            .with("OrderId", Value::Null)
            .with("orgOrderId", order.id.as_str())
            .with("TxnType", TABLES.transaction_type(tx)?)
            .with("SecureType", NON_SECURE))
    }

    fn card_fields(payload: &mut Payload, card: &Card) -> GatewayResult<()> {
        payload.insert("CardType", TABLES.card_brand(card.brand())?);
        payload.insert("Pan", card.number());
        payload.insert("Expiry", card.expiry_month_year());
        payload.insert("Cvv2", card.cvv());
        Ok(())
    }

    /// 3D outcome plus whatever provisioning fields the callback carries.
    /// 3D Pay and 3D Host callbacks are both shaped like this.
    fn callback_result(&self, tx: TransactionType, callback: &Payload) -> PaymentResult {
        let three_d = self.map_three_d_callback(tx, callback);
        let payment = self.map_payment_response(tx, callback);
        PaymentResult::merge(three_d, payment)
    }
}

impl BankProvider for InterProvider {
    fn bank(&self) -> Bank {
        Bank::Inter
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
            .with("TxnType", TABLES.transaction_type(tx)?)
            .with("SecureType", NON_SECURE)
            .with("OrderId", order.id.as_str())
            .with("PurchAmount", amount_plain(order.amount))
            .with("Currency", TABLES.currency(order.currency())?)
            .with("InstallmentCount", TABLES.installment(order.installment()))
            .with("MOTO", TABLES.moto)
            .with("Lang", order.lang(account).to_string());
        Self::card_fields(&mut payload, card)?;
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
        Ok(Self::credentials(account)
            .with("TxnType", TABLES.transaction_type(tx)?)
            .with("SecureType", NON_SECURE)
            .with("OrderId", order.id.as_str())
            .with("PurchAmount", amount_plain(order.amount))
            .with("Currency", TABLES.currency(order.currency())?)
            .with("InstallmentCount", TABLES.installment(order.installment()))
            .with("MD", callback.string("MD"))
            .with("PayerTxnId", callback.string("PayerTxnId"))
            .with("Eci", callback.string("Eci"))
            .with("PayerAuthenticationCode", callback.string("PayerAuthenticationCode"))
            .with("MOTO", TABLES.moto)
            .with("Lang", order.lang(account).to_string()))
    }

    fn post_auth_request(
        &self,
        account: &Account,
        order: &Order,
        _test_mode: bool,
    ) -> GatewayResult<Payload> {
        Ok(Self::follow_up(account, order, TransactionType::PostAuth)?
            .with("PurchAmount", amount_plain(order.amount))
            .with("Currency", TABLES.currency(order.currency())?)
            .with("MOTO", TABLES.moto))
    }

    fn cancel_request(
        &self,
        account: &Account,
        order: &Order,
        _test_mode: bool,
    ) -> GatewayResult<Payload> {
        Ok(Self::follow_up(account, order, TransactionType::Cancel)?
            .with("Lang", order.lang(account).to_string()))
    }

    fn refund_request(
        &self,
        account: &Account,
        order: &Order,
        _test_mode: bool,
    ) -> GatewayResult<Payload> {
        Ok(Self::follow_up(account, order, TransactionType::Refund)?
            .with("PurchAmount", amount_plain(order.amount))
            .with("Lang", order.lang(account).to_string())
            .with("MOTO", TABLES.moto))
    }

    fn status_request(
        &self,
        account: &Account,
        order: &Order,
        _test_mode: bool,
    ) -> GatewayResult<Payload> {
        Ok(Self::follow_up(account, order, TransactionType::Status)?
            .with("Lang", order.lang(account).to_string()))
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
                account.client_id.as_str(),
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
            .with("ShopCode", account.client_id.as_str())
            .with("TxnType", tx_literal)
            .with("SecureType", TABLES.security_model(account.model)?)
            .with("Hash", hash)
            .with("PurchAmount", amount)
            .with("OrderId", order.id.as_str())
            .with("OkUrl", success_url)
            .with("FailUrl", fail_url)
            .with("Rnd", order.rand())
            .with("Lang", order.lang(account).to_string())
            .with("Currency", TABLES.currency(order.currency())?)
            .with("InstallmentCount", installment);
        if let Some(card) = card {
            Self::card_fields(&mut inputs, card)?;
        }

        debug!("Prepared Inter 3D form for order {}", order.id);
        Ok(RedirectForm {
            gateway: gateway_url.to_string(),
            inputs: inputs.to_flat(),
        })
    }

    fn verify_callback(&self, account: &Account, _order: &Order, callback: &Payload) -> bool {
        self.hash_engine()
            .verify_hash_params(callback, &HashParamKeys::UPPERCASE, &account.store_key)
            .is_valid()
    }

    fn callback_authorizes_payment(&self, callback: &Payload) -> bool {
        md_status_authorized(callback.text("mdStatus"))
    }

    fn encode(&self, _kind: RequestKind, payload: &Payload) -> GatewayResult<EncodedBody> {
        Ok(EncodedBody {
            body: encode_form(payload)?,
            content_type: "application/x-www-form-urlencoded",
        })
    }

    fn decode(&self, _kind: RequestKind, body: &[u8]) -> GatewayResult<Decoded> {
        let text = decode_text(body, REPLY_ENCODING);
        if is_html(&text) {
            return Err(GatewayError::unexpected_html(Bank::Inter, text));
        }
        decode_delimited(Bank::Inter, &text).map(Decoded::Structured)
    }

    fn map_payment_response(&self, tx: TransactionType, raw: &Payload) -> PaymentResult {
        let mut result = TABLES.result_for(tx, raw.text("ProcReturnCode"));
        result.order_id = raw.string("OrderId");
        result.trans_id = raw.string("TransId");
        result.auth_code = raw.string("AuthCode");
        result.host_ref_num = raw.string("HostRefNum");
        result.error_code = raw.string("ErrorCode");
        result.error_message = raw.string("ErrorMessage");
        result.all = raw.clone();
        result
    }

    fn map_three_d_callback(&self, tx: TransactionType, callback: &Payload) -> PaymentResult {
        let md_status = callback.text("mdStatus");
        let mut result = PaymentResult::new(tx);
        result.transaction = TABLES.transaction_type(tx).ok().map(str::to_string);
        result.order_id = callback.string("OrderId");
        result.xid = callback.string("OrderId");
        result.host_ref_num = callback.string("HostRefNum");
        result.transaction_security = Some(transaction_security(md_status).to_string());
        result.md_status = md_status.map(str::to_string);
        result.md_error_message = callback.string("ErrorMessage");
        result.hash = callback.string("HASH");
        result.masked_number = callback.string("Pan");
        result.amount = callback.text("PurchAmount").and_then(parse_amount);
        result.currency = callback
            .text("Currency")
            .and_then(|code| TABLES.currency_from(code));
        result.eci = callback.string("Eci");
        result.order_status = callback.string("TxnStat");
        result.error_code = callback.string("ErrorCode");
        result.error_message = callback.string("ErrorMessage");
        if !md_status_authorized(md_status) {
            result.status_detail = StatusDetail::AuthenticationFailed;
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

    fn map_refund_response(&self, raw: &Payload) -> PaymentResult {
        let mut result = self.map_payment_response(TransactionType::Refund, raw);
        result.auth_code = None;
        result
    }

    fn map_status_response(&self, raw: &Payload) -> PaymentResult {
        let mut result = self.map_payment_response(TransactionType::Status, raw);
        result.auth_code = None;
        result.host_ref_num = None;
        result.refund_amount = raw.text("RefundedAmount").and_then(parse_amount);
        result
    }
}

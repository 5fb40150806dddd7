//! Kuveyt Türk virtual POS
//!
//! Only the 3D Secure model is offered. The 3D initialisation call goes to
//! the bank, which answers with an auto-submitting HTML page; the callback
//! carries a URL-encoded XML document in `AuthenticationResponse`.

use tracing::{debug, warn};

use crate::error::{GatewayError, GatewayResult};
use crate::payments::amount::{amount_format, parse_minor_amount};
use crate::payments::codec::{
    decode_xml, encode_xml, extract_form, is_html, xml::decode_text, Decoded, Payload, XmlOptions,
};
use crate::payments::hash::constant_time_eq;
use crate::payments::providers::BankTables;
use crate::payments::result::{PaymentResult, PaymentStatus, RedirectForm, StatusDetail, ThreeDInit};
use crate::payments::traits::{BankProvider, EncodedBody, RequestKind};
use crate::payments::types::{
    Account, Bank, Card, CardBrand, Currency, Order, SecurityModel, TransactionType,
};

static TABLES: BankTables = BankTables {
    bank: Bank::Kuveyt,
    transaction_types: &[(TransactionType::Pay, "Sale")],
    security_models: &[(SecurityModel::ThreeDSecure, "3")],
    card_brands: &[
        (CardBrand::Visa, "Visa"),
        (CardBrand::Master, "MasterCard"),
        (CardBrand::Troy, "Troy"),
    ],
    currencies: &[
        (Currency::Try, "0949"),
        (Currency::Usd, "0840"),
        (Currency::Eur, "0978"),
        (Currency::Gbp, "0826"),
        (Currency::Jpy, "0392"),
        (Currency::Rub, "0643"),
    ],
    frequency_units: &[],
    return_codes: &[
        ("00", StatusDetail::Approved),
        ("ApiUserNotDefined", StatusDetail::InvalidTransaction),
        ("EmptyMDException", StatusDetail::InvalidTransaction),
        ("HashDataError", StatusDetail::InvalidTransaction),
    ],
    approved_code: "00",
    moto: "0",
};

const XML: XmlOptions = XmlOptions::new("KuveytTurkVPosMessage", "ISO-8859-1");
const API_VERSION: &str = "TDV2.0.0";

pub fn tables() -> &'static BankTables {
    &TABLES
}

/// Percent-decoding as done for form values, `+` included.
fn url_decode(raw: &str) -> GatewayResult<String> {
    let encoded = format!("v={}", raw.replace('&', "%26"));
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(&encoded)
        .map_err(|err| GatewayError::encoding(format!("Callback is not URL-encoded: {}", err)))?;
    Ok(pairs
        .into_iter()
        .next()
        .map(|(_, value)| value)
        .unwrap_or_default())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct KuveytProvider;

impl KuveytProvider {
    fn hashed_password(&self, account: &Account) -> String {
        self.hash_engine().digest(&account.password)
    }

    fn merchant_order_id(payload: &Payload) -> Option<String> {
        payload
            .path_string(&["VPosMessage", "MerchantOrderId"])
            .or_else(|| payload.string("MerchantOrderId"))
    }

    fn envelope(account: &Account, order: &Order, hash: String) -> GatewayResult<Payload> {
        Ok(Payload::new()
            .with("APIVersion", API_VERSION)
            .with("HashData", hash)
            .with("MerchantId", account.client_id.as_str())
            .with("CustomerId", account.terminal_id()?)
            .with("UserName", account.username.as_str())
            .with("TransactionType", TABLES.transaction_type(TransactionType::Pay)?)
            .with("InstallmentCount", TABLES.installment(order.installment()))
            .with("Amount", amount_format(order.amount)?)
            .with("MerchantOrderId", order.id.as_str())
            .with("TransactionSecurity", TABLES.security_model(SecurityModel::ThreeDSecure)?))
    }

    /// Outcome of the 3D step. Financial fields are only trusted when the
    /// authentication succeeded.
    fn authentication_result(&self, tx: TransactionType, callback: &Payload) -> PaymentResult {
        let code = callback.text("ResponseCode");
        let mut result = TABLES.result_for(tx, code);
        result.order_id = Self::merchant_order_id(callback);
        result.transaction_security = Some("MPI fallback".to_string());
        result.three_d_all = Some(callback.clone());

        if TABLES.is_approved(code) {
            result.response = Some("Approved".to_string());
            result.hash = callback
                .path_string(&["VPosMessage", "HashData"])
                .or_else(|| callback.string("HashData"));
            result.amount = callback
                .path(&["VPosMessage", "Amount"])
                .and_then(parse_minor_amount);
            result.currency = callback
                .path(&["VPosMessage", "CurrencyCode"])
                .and_then(|code| TABLES.currency_from(code));
            result.masked_number = callback.path_string(&["VPosMessage", "CardNumber"]);
        } else {
            result.response = Some("Declined".to_string());
            result.error_code = code.map(str::to_string);
            result.md_error_message = callback.string("ResponseMessage");
        }
        result
    }
}

impl BankProvider for KuveytProvider {
    fn bank(&self) -> Bank {
        Bank::Kuveyt
    }

    fn tables(&self) -> &'static BankTables {
        &TABLES
    }

    fn three_d_payment_request(
        &self,
        account: &Account,
        order: &Order,
        _card: Option<&Card>,
        _tx: TransactionType,
        callback: &Payload,
        _test_mode: bool,
    ) -> GatewayResult<Payload> {
        let amount = amount_format(order.amount)?.to_string();
        let hash = self.hash_engine().compute(
            &[
                account.client_id.as_str(),
                order.id.as_str(),
                amount.as_str(),
                account.username.as_str(),
            ],
            &self.hashed_password(account),
        );
        let md = callback
            .string("MD")
            .ok_or_else(|| GatewayError::missing_field("MD"))?;

        Ok(Self::envelope(account, order, hash)?.with(
            "KuveytTurkVPosAdditionalData",
            Payload::new().with(
                "AdditionalData",
                Payload::new().with("Key", "MD").with("Data", md),
            ),
        ))
    }

    fn three_d_init_request(
        &self,
        account: &Account,
        order: &Order,
        card: Option<&Card>,
        tx: TransactionType,
    ) -> GatewayResult<Option<Payload>> {
        TABLES.transaction_type(tx)?;
        let card = card.ok_or_else(|| GatewayError::missing_field("card"))?;
        let success_url = order.success_url()?;
        let fail_url = order.fail_url()?;
        let amount = amount_format(order.amount)?.to_string();

        let hash = self.hash_engine().compute(
            &[
                account.client_id.as_str(),
                order.id.as_str(),
                amount.as_str(),
                success_url,
                fail_url,
                account.username.as_str(),
            ],
            &self.hashed_password(account),
        );

        let payload = Self::envelope(account, order, hash)?
            .with("OkUrl", success_url)
            .with("FailUrl", fail_url)
            .with("DisplayAmount", amount)
            .with("CurrencyCode", TABLES.currency(order.currency())?)
            .with("CardNumber", card.number())
            .with("CardExpireDateYear", card.year_short())
            .with("CardExpireDateMonth", card.month())
            .with("CardCVV2", card.cvv())
            .with("CardHolderName", card.holder_name())
            .with("CardType", TABLES.card_brand(card.brand())?);
        Ok(Some(payload))
    }

    fn map_three_d_init(&self, decoded: Decoded) -> GatewayResult<ThreeDInit> {
        match decoded {
            Decoded::HtmlForm(form) => {
                debug!("Kuveyt 3D page posts to {}", form.target);
                Ok(ThreeDInit::Redirect(RedirectForm {
                    gateway: form.target,
                    inputs: form.fields,
                }))
            }
            Decoded::Structured(raw) => {
                warn!(
                    "Kuveyt refused 3D initialisation: {}",
                    raw.text("ResponseCode").unwrap_or("no code")
                );
                Ok(ThreeDInit::Rejected {
                    code: raw.string("ResponseCode"),
                    message: raw.string("ResponseMessage"),
                    raw,
                })
            }
        }
    }

    fn parse_callback(&self, fields: Payload) -> GatewayResult<Payload> {
        let raw = fields
            .text("AuthenticationResponse")
            .ok_or_else(|| GatewayError::missing_field("AuthenticationResponse"))?;
        let document = if raw.trim_start().starts_with('<') {
            raw.to_string()
        } else {
            url_decode(raw)?
        };
        Ok(decode_xml(Bank::Kuveyt, &document)?.normalized())
    }

    fn verify_callback(&self, account: &Account, order: &Order, callback: &Payload) -> bool {
        let Some(received) = callback.text("HashData") else {
            warn!("Kuveyt callback for order {} carries no HashData", order.id);
            return false;
        };
        let merchant_order_id = Self::merchant_order_id(callback).unwrap_or_default();
        if merchant_order_id != order.id {
            warn!("Kuveyt callback belongs to order {}, expected {}", merchant_order_id, order.id);
            return false;
        }

        let expected = self.hash_engine().compute(
            &[
                merchant_order_id.as_str(),
                callback.text("ResponseCode").unwrap_or_default(),
                callback.text("OrderId").unwrap_or_default(),
            ],
            &self.hashed_password(account),
        );
        constant_time_eq(&expected, &received.trim().to_ascii_uppercase())
    }

    fn callback_authorizes_payment(&self, callback: &Payload) -> bool {
        TABLES.is_approved(callback.text("ResponseCode"))
    }

    fn encode(&self, _kind: RequestKind, payload: &Payload) -> GatewayResult<EncodedBody> {
        Ok(EncodedBody {
            body: encode_xml(&XML, payload)?,
            content_type: "text/xml; charset=UTF-8",
        })
    }

    fn decode(&self, kind: RequestKind, body: &[u8]) -> GatewayResult<Decoded> {
        let text = decode_text(body, XML.encoding);
        if is_html(&text) {
            return match kind {
                RequestKind::ThreeDInit => extract_form(&text).map(Decoded::HtmlForm),
                RequestKind::Transaction => Err(GatewayError::unexpected_html(Bank::Kuveyt, text)),
            };
        }
        decode_xml(Bank::Kuveyt, &text).map(Decoded::Structured)
    }

    fn map_payment_response(&self, tx: TransactionType, raw: &Payload) -> PaymentResult {
        let code = raw.text("ResponseCode");
        let mut result = TABLES.result_for(tx, code);
        result.all = raw.clone();

        if !result.is_approved() {
            result.error_code = code.map(str::to_string);
            result.error_message = raw.string("ResponseMessage");
            result.response = Some("Declined".to_string());
            return result;
        }

        result.response = Some("Approved".to_string());
        result.auth_code = raw.string("ProvisionNumber");
        result.order_id = raw.string("MerchantOrderId");
        result.trans_id = raw.string("OrderId");
        result.host_ref_num = raw.string("RRN");
        result.amount = raw
            .path(&["VPosMessage", "Amount"])
            .and_then(parse_minor_amount);
        result.currency = raw
            .path(&["VPosMessage", "CurrencyCode"])
            .and_then(|code| TABLES.currency_from(code));
        result.masked_number = raw.path_string(&["VPosMessage", "CardNumber"]);
        result
    }

    fn map_three_d_callback(&self, tx: TransactionType, callback: &Payload) -> PaymentResult {
        let mut result = self.authentication_result(tx, callback);
        // The 3D step alone never completes a payment.
        result.status = PaymentStatus::Declined;
        if !self.callback_authorizes_payment(callback) {
            result.status_detail = StatusDetail::AuthenticationFailed;
        }
        result
    }
}

//! VakifBank VPOS 7/24 with the MPI enrollment check
//!
//! API calls are `VposRequest` XML documents without a prolog, posted as the
//! form field `prmstr`. Before a 3D redirect the card's enrollment is asked
//! from the MPI with a plain form post; the callback is bound to that
//! enrollment request rather than signed.

use tracing::{debug, warn};

use crate::error::{GatewayError, GatewayResult};
use crate::payments::amount::{amount_fixed, parse_amount};
use crate::payments::codec::{encode_form, encode_xml, Decoded, Payload, XmlOptions};
use crate::payments::providers::{decode_xml_reply, structured, BankTables, ISO_CURRENCIES};
use crate::payments::result::{PaymentResult, PaymentStatus, RedirectForm, StatusDetail, ThreeDInit};
use crate::payments::traits::{BankProvider, EncodedBody, RequestKind};
use crate::payments::types::{
    Account, Bank, Card, CardBrand, FrequencyUnit, Order, SecurityModel, TransactionType,
};

static TABLES: BankTables = BankTables {
    bank: Bank::VakifBank,
    transaction_types: &[
        (TransactionType::Pay, "Sale"),
        (TransactionType::PreAuth, "Auth"),
        (TransactionType::PostAuth, "Capture"),
        (TransactionType::Cancel, "Cancel"),
        (TransactionType::Refund, "Refund"),
    ],
    security_models: &[(SecurityModel::ThreeDSecure, "3d")],
    card_brands: &[
        (CardBrand::Visa, "100"),
        (CardBrand::Master, "200"),
        (CardBrand::Amex, "300"),
    ],
    currencies: ISO_CURRENCIES,
    frequency_units: &[
        (FrequencyUnit::Day, "Day"),
        (FrequencyUnit::Month, "Month"),
        (FrequencyUnit::Year, "Year"),
    ],
    return_codes: &[("0000", StatusDetail::Approved)],
    approved_code: "0000",
    moto: "0",
};

const XML: XmlOptions = XmlOptions::new("VposRequest", "UTF-8").without_prolog();
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

pub fn tables() -> &'static BankTables {
    &TABLES
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VakifBankProvider;

impl VakifBankProvider {
    fn credentials(account: &Account) -> GatewayResult<Payload> {
        Ok(Payload::new()
            .with("MerchantId", account.client_id.as_str())
            .with("Password", account.password.as_str())
            .with("TerminalNo", account.terminal_id()?))
    }

    fn installments(order: &Order, payload: &mut Payload) {
        if order.installment() > 1 {
            payload.insert("NumberOfInstallments", order.installment().to_string());
        }
    }

    fn sale(
        &self,
        account: &Account,
        order: &Order,
        card: &Card,
        tx: TransactionType,
    ) -> GatewayResult<Payload> {
        let mut payload = Self::credentials(account)?
            .with("TransactionType", TABLES.transaction_type(tx)?)
            .with("TransactionId", order.id.as_str())
            .with("CurrencyAmount", amount_fixed(order.amount))
            .with("CurrencyCode", TABLES.currency(order.currency())?)
            .with("OrderId", order.id.as_str())
            .with("ClientIp", order.ip.clone())
            .with("TransactionDeviceSource", TABLES.moto)
            .with("Pan", card.number())
            .with("Cvv", card.cvv())
            .with("Expiry", card.expiry_full_year_month());
        Self::installments(order, &mut payload);
        Ok(payload)
    }

    fn follow_up(
        account: &Account,
        order: &Order,
        tx: TransactionType,
    ) -> GatewayResult<Payload> {
        Ok(Self::credentials(account)?
            .with("TransactionType", TABLES.transaction_type(tx)?)
            .with("ReferenceTransactionId", order.id.as_str())
            .with("ClientIp", order.ip.clone()))
    }

    fn common_response(&self, tx: TransactionType, raw: &Payload) -> PaymentResult {
        let code = raw.text("ResultCode");
        let mut result = TABLES.result_for(tx, code);
        result.response = raw.string("ResultDetail");
        if !result.is_approved() {
            result.error_code = code.map(str::to_string);
            result.error_message = raw.string("ResultDetail");
        }
        result.all = raw.clone();
        result
    }

    /// Maps the MPI enrollment reply, found under `Message/VERes`.
    fn enrollment_outcome(raw: Payload) -> GatewayResult<ThreeDInit> {
        let Some(status) = raw.path_string(&["Message", "VERes", "Status"]) else {
            return Err(GatewayError::malformed(
                Bank::VakifBank,
                "enrollment reply without VERes status",
            ));
        };
        debug!("VakifBank enrollment status {}", status);

        match status.as_str() {
            "Y" => {
                let Some(acs_url) = raw.path_string(&["Message", "VERes", "ACSUrl"]) else {
                    return Err(GatewayError::malformed(Bank::VakifBank, "enrollment reply without ACSUrl"));
                };
                let mut form = RedirectForm {
                    gateway: acs_url,
                    inputs: Default::default(),
                };
                for key in ["PaReq", "TermUrl", "MD"] {
                    form.inputs.insert(
                        key.to_string(),
                        raw.path(&["Message", "VERes", key]).unwrap_or_default().to_string(),
                    );
                }
                Ok(ThreeDInit::Redirect(form))
            }
            "N" => Ok(ThreeDInit::NotEnrolled { raw }),
            "U" => Ok(ThreeDInit::CannotProcess { raw }),
            _ => {
                warn!("VakifBank enrollment failed with status {}", status);
                Ok(ThreeDInit::Rejected {
                    code: raw.string("MessageErrorCode"),
                    message: raw.string("ErrorMessage"),
                    raw,
                })
            }
        }
    }
}

impl BankProvider for VakifBankProvider {
    fn bank(&self) -> Bank {
        Bank::VakifBank
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
        self.sale(account, order, card, tx)
    }

    fn three_d_payment_request(
        &self,
        account: &Account,
        order: &Order,
        card: Option<&Card>,
        tx: TransactionType,
        callback: &Payload,
        _test_mode: bool,
    ) -> GatewayResult<Payload> {
        let card = card.ok_or_else(|| GatewayError::missing_field("card"))?;
        let mut payload = self.sale(account, order, card, tx)?;
        payload.insert("ECI", callback.string("Eci"));
        payload.insert("CAVV", callback.string("Cavv"));
        payload.insert("MpiTransactionId", callback.string("VerifyEnrollmentRequestId"));
        Ok(payload)
    }

    fn post_auth_request(
        &self,
        account: &Account,
        order: &Order,
        _test_mode: bool,
    ) -> GatewayResult<Payload> {
        Ok(Self::follow_up(account, order, TransactionType::PostAuth)?
            .with("CurrencyAmount", amount_fixed(order.amount))
            .with("CurrencyCode", TABLES.currency(order.currency())?))
    }

    fn cancel_request(
        &self,
        account: &Account,
        order: &Order,
        _test_mode: bool,
    ) -> GatewayResult<Payload> {
        Self::follow_up(account, order, TransactionType::Cancel)
    }

    fn refund_request(
        &self,
        account: &Account,
        order: &Order,
        _test_mode: bool,
    ) -> GatewayResult<Payload> {
        Ok(Self::follow_up(account, order, TransactionType::Refund)?
            .with("CurrencyAmount", amount_fixed(order.amount)))
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

        let mut payload = Payload::new()
            .with("MerchantId", account.client_id.as_str())
            .with("MerchantPassword", account.password.as_str())
            .with("MerchantType", "0")
            .with("PurchaseAmount", amount_fixed(order.amount))
            .with("VerifyEnrollmentRequestId", order.id.as_str())
            .with("Currency", TABLES.currency(order.currency())?)
            .with("SuccessUrl", order.success_url()?)
            .with("FailureUrl", order.fail_url()?)
            .with("Pan", card.number())
            .with("ExpiryDate", card.expiry_year_month())
            .with("BrandName", TABLES.card_brand(card.brand())?)
            .with("IsRecurring", if order.recurring.is_some() { "true" } else { "false" });

        if order.installment() > 1 {
            payload.insert("InstallmentCount", order.installment().to_string());
        }
        if let Some(recurring) = &order.recurring {
            payload.insert("RecurringFrequency", recurring.frequency_interval.to_string());
            payload.insert("RecurringFrequencyType", TABLES.frequency_unit(recurring.frequency_unit)?);
            payload.insert("RecurringInstallmentCount", recurring.installment_count.to_string());
        }
        Ok(Some(payload))
    }

    fn map_three_d_init(&self, decoded: Decoded) -> GatewayResult<ThreeDInit> {
        Self::enrollment_outcome(structured(Bank::VakifBank, decoded)?)
    }

    fn verify_callback(&self, account: &Account, order: &Order, callback: &Payload) -> bool {
        let request_id = callback.text("VerifyEnrollmentRequestId");
        let merchant_id = callback.text("MerchantId");
        let bound = request_id == Some(order.id.as_str())
            && merchant_id == Some(account.client_id.as_str());
        if !bound {
            warn!(
                "VakifBank callback does not belong to order {}: request id {:?}",
                order.id, request_id
            );
        }
        bound
    }

    fn callback_authorizes_payment(&self, callback: &Payload) -> bool {
        callback.text("Status") == Some("Y")
    }

    fn encode(&self, kind: RequestKind, payload: &Payload) -> GatewayResult<EncodedBody> {
        let body = match kind {
            RequestKind::ThreeDInit => encode_form(payload)?,
            RequestKind::Transaction => {
                let xml = encode_xml(&XML, payload)?;
                let xml = String::from_utf8(xml)
                    .map_err(|err| GatewayError::encoding(format!("Request is not UTF-8: {}", err)))?;
                encode_form(&Payload::new().with("prmstr", xml))?
            }
        };
        Ok(EncodedBody {
            body,
            content_type: FORM_CONTENT_TYPE,
        })
    }

    fn decode(&self, _kind: RequestKind, body: &[u8]) -> GatewayResult<Decoded> {
        decode_xml_reply(Bank::VakifBank, body, XML.encoding)
    }

    fn map_payment_response(&self, tx: TransactionType, raw: &Payload) -> PaymentResult {
        let mut result = self.common_response(tx, raw);
        if result.is_approved() {
            result.trans_id = raw.string("TransactionId");
            result.auth_code = raw.string("AuthCode");
            result.host_ref_num = raw.string("Rrn");
            result.order_id = raw.string("OrderId");
            result.eci = raw.string("ECI");
        }
        result
    }

    fn map_three_d_callback(&self, tx: TransactionType, callback: &Payload) -> PaymentResult {
        let status = callback.text("Status");
        let mut result = PaymentResult::new(tx);
        result.transaction = TABLES.transaction_type(tx).ok().map(str::to_string);
        result.order_id = callback.string("VerifyEnrollmentRequestId");
        result.md_status = status.map(str::to_string);
        result.transaction_security = Some(
            match status {
                Some("Y") => "Full 3D Secure",
                Some("A") => "Half 3D Secure",
                _ => "MPI fallback",
            }
            .to_string(),
        );
        result.eci = callback.string("Eci");
        result.cavv = callback.string("Cavv");
        result.xid = callback.string("Xid");
        result.amount = callback.text("PurchAmount").and_then(parse_amount);
        result.currency = callback
            .text("PurchCurrency")
            .and_then(|code| TABLES.currency_from(code));
        result.status = PaymentStatus::Declined;
        if !self.callback_authorizes_payment(callback) {
            result.status_detail = StatusDetail::AuthenticationFailed;
            result.error_code = callback.string("ErrorCode");
            result.error_message = callback.string("ErrorMessage");
        }
        result.three_d_all = Some(callback.clone());
        result
    }

    fn map_cancel_response(&self, raw: &Payload) -> PaymentResult {
        let mut result = self.common_response(TransactionType::Cancel, raw);
        result.order_id = raw.string("TransactionId");
        result.trans_id = raw.string("TransactionId");
        result.host_ref_num = raw.string("Rrn");
        if result.is_approved() {
            result.auth_code = raw.string("AuthCode");
        }
        result
    }

    fn map_refund_response(&self, raw: &Payload) -> PaymentResult {
        let mut result = self.map_cancel_response(raw);
        result.transaction_type = TransactionType::Refund;
        result.transaction = TABLES
            .transaction_type(TransactionType::Refund)
            .ok()
            .map(str::to_string);
        result
    }
}

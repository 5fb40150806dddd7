//! EST (Asseco) virtual POS
//!
//! Shared by Akbank, Isbank, Halkbank, Ziraat and the other banks running
//! the EST platform. API calls are `CC5Request` XML documents in
//! ISO-8859-9; 3D callbacks are signed with `HASHPARAMS`.

use tracing::debug;

use crate::error::GatewayResult;
use crate::payments::amount::{amount_plain, parse_amount, parse_minor_amount};
use crate::payments::codec::{encode_xml, Decoded, Payload, XmlOptions};
use crate::payments::hash::HashParamKeys;
use crate::payments::providers::{
    decode_xml_reply, BankTables, DEFAULT_FREQUENCY_UNITS, EST_RETURN_CODES, ISO_CURRENCIES,
};
use crate::payments::result::{
    md_status_authorized, transaction_security, PaymentResult, PaymentStatus, RedirectForm,
    StatusDetail,
};
use crate::payments::traits::{BankProvider, EncodedBody, RequestKind};
use crate::payments::types::{
    Account, Bank, Card, CardBrand, Order, SecurityModel, TransactionType,
};

static TABLES: BankTables = BankTables {
    bank: Bank::Est,
    transaction_types: &[
        (TransactionType::Pay, "Auth"),
        (TransactionType::PreAuth, "PreAuth"),
        (TransactionType::PostAuth, "PostAuth"),
        (TransactionType::Cancel, "Void"),
        (TransactionType::Refund, "Credit"),
        (TransactionType::Status, "ORDERSTATUS"),
        (TransactionType::History, "ORDERHISTORY"),
    ],
    security_models: &[
        (SecurityModel::NonSecure, "regular"),
        (SecurityModel::ThreeDSecure, "3d"),
        (SecurityModel::ThreeDPay, "3d_pay"),
        (SecurityModel::ThreeDHost, "3d_pay_hosting"),
    ],
    card_brands: &[(CardBrand::Visa, "1"), (CardBrand::Master, "2")],
    currencies: ISO_CURRENCIES,
    frequency_units: DEFAULT_FREQUENCY_UNITS,
    return_codes: EST_RETURN_CODES,
    approved_code: "00",
    moto: "",
};

const XML: XmlOptions = XmlOptions::new("CC5Request", "ISO-8859-9");

pub fn tables() -> &'static BankTables {
    &TABLES
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EstProvider;

impl EstProvider {
    fn credentials(account: &Account) -> Payload {
        Payload::new()
            .with("Name", account.username.as_str())
            .with("Password", account.password.as_str())
            .with("ClientId", account.client_id.as_str())
    }

    fn order_fields(&self, order: &Order, tx: TransactionType) -> GatewayResult<Payload> {
        Ok(Payload::new()
            .with("Type", TABLES.transaction_type(tx)?)
            .with("IPAddress", order.ip.clone())
            .with("Email", order.email.clone())
            .with("OrderId", order.id.as_str())
            .with("UserId", None::<String>)
            .with("Total", amount_plain(order.amount))
            .with("Currency", TABLES.currency(order.currency())?)
            .with("Taksit", TABLES.installment(order.installment())))
    }

    fn recurring(&self, order: &Order, payload: &mut Payload) -> GatewayResult<()> {
        if let Some(recurring) = &order.recurring {
            payload.insert(
                "PbOrder",
                Payload::new()
                    .with("OrderType", "0")
                    .with("TotalNumberPayments", recurring.installment_count.to_string())
                    .with("OrderFrequencyCycle", TABLES.frequency_unit(recurring.frequency_unit)?)
                    .with("OrderFrequencyInterval", recurring.frequency_interval.to_string())
                    .with(
                        "Desc",
                        recurring
                            .start_date
                            .map(|date| date.format("%Y%m%d").to_string()),
                    ),
            );
        }
        Ok(())
    }

    fn query(account: &Account, order: &Order, extra_key: &str) -> Payload {
        Self::credentials(account)
            .with("OrderId", order.id.as_str())
            .with("Extra", Payload::new().with(extra_key, "QUERY"))
    }

    fn common_response(&self, tx: TransactionType, raw: &Payload) -> PaymentResult {
        let mut result = TABLES.result_for(tx, raw.text("ProcReturnCode"));
        result.order_id = raw.string("OrderId");
        result.group_id = raw.string("GroupId");
        result.trans_id = raw.string("TransId");
        result.response = raw.string("Response");
        result.auth_code = raw.string("AuthCode");
        result.host_ref_num = raw.string("HostRefNum");
        result.error_code = raw.path_string(&["Extra", "ERRORCODE"]);
        result.error_message = raw.string("ErrMsg");
        result.all = raw.clone();
        result
    }

    fn callback_fields(&self, tx: TransactionType, callback: &Payload) -> PaymentResult {
        let md_status = callback.text("mdStatus");
        let mut result = PaymentResult::new(tx);
        result.transaction = TABLES.transaction_type(tx).ok().map(str::to_string);
        result.order_id = callback.string("oid");
        result.transaction_security = Some(transaction_security(md_status).to_string());
        result.md_status = md_status.map(str::to_string);
        result.hash = callback.string("HASH");
        result.masked_number = callback.string("maskedCreditCard");
        result.amount = callback.text("amount").and_then(parse_amount);
        result.currency = callback
            .text("currency")
            .and_then(|code| TABLES.currency_from(code));
        result.xid = callback.string("oid");
        result.three_d_all = Some(callback.clone());
        result
    }
}

impl BankProvider for EstProvider {
    fn bank(&self) -> Bank {
        Bank::Est
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
        let mut payload = Self::credentials(account);
        for (key, value) in &self.order_fields(order, tx)? {
            payload.insert(key.as_str(), value.clone());
        }
        payload.insert("Number", card.number());
        payload.insert("Expires", card.expiry_slashed());
        payload.insert("Cvv2Val", card.cvv());
        payload.insert("Mode", "P");
        payload.insert("BillTo", Payload::new().with("Name", order.name.clone()));
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
        _test_mode: bool,
    ) -> GatewayResult<Payload> {
        let mut payload = Self::credentials(account);
        for (key, value) in &self.order_fields(order, tx)? {
            payload.insert(key.as_str(), value.clone());
        }
        payload.insert("Number", callback.string("md"));
        payload.insert("PayerTxnId", callback.string("xid"));
        payload.insert("PayerSecurityLevel", callback.string("eci"));
        payload.insert("PayerAuthenticationCode", callback.string("cavv"));
        payload.insert("CardholderPresentCode", "13");
        payload.insert("Mode", "P");
        self.recurring(order, &mut payload)?;
        Ok(payload)
    }

    fn post_auth_request(
        &self,
        account: &Account,
        order: &Order,
        _test_mode: bool,
    ) -> GatewayResult<Payload> {
        Ok(Self::credentials(account)
            .with("Type", TABLES.transaction_type(TransactionType::PostAuth)?)
            .with("OrderId", order.id.as_str()))
    }

    fn cancel_request(
        &self,
        account: &Account,
        order: &Order,
        _test_mode: bool,
    ) -> GatewayResult<Payload> {
        Ok(Self::credentials(account)
            .with("OrderId", order.id.as_str())
            .with("Type", TABLES.transaction_type(TransactionType::Cancel)?))
    }

    fn refund_request(
        &self,
        account: &Account,
        order: &Order,
        _test_mode: bool,
    ) -> GatewayResult<Payload> {
        let mut payload = Self::credentials(account)
            .with("OrderId", order.id.as_str())
            .with("Currency", TABLES.currency(order.currency())?)
            .with("Type", TABLES.transaction_type(TransactionType::Refund)?);
        if !order.amount.is_zero() {
            payload.insert("Total", amount_plain(order.amount));
        }
        Ok(payload)
    }

    fn status_request(
        &self,
        account: &Account,
        order: &Order,
        _test_mode: bool,
    ) -> GatewayResult<Payload> {
        let key = TABLES.transaction_type(TransactionType::Status)?;
        Ok(Self::query(account, order, key))
    }

    fn history_request(
        &self,
        account: &Account,
        order: &Order,
        _test_mode: bool,
    ) -> GatewayResult<Payload> {
        let key = TABLES.transaction_type(TransactionType::History)?;
        Ok(Self::query(account, order, key))
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

        let mut form = RedirectForm {
            gateway: gateway_url.to_string(),
            inputs: Default::default(),
        };
        let inputs = &mut form.inputs;
        inputs.insert("clientid".into(), account.client_id.clone());
        inputs.insert("storetype".into(), TABLES.security_model(account.model)?.into());
        inputs.insert("hash".into(), hash);
        inputs.insert("firmaadi".into(), order.name.clone().unwrap_or_default());
        inputs.insert("Email".into(), order.email.clone().unwrap_or_default());
        inputs.insert("amount".into(), amount);
        inputs.insert("oid".into(), order.id.clone());
        inputs.insert("okUrl".into(), success_url.into());
        inputs.insert("failUrl".into(), fail_url.into());
        inputs.insert("rnd".into(), order.rand().into());
        inputs.insert("lang".into(), order.lang(account).to_string());
        inputs.insert("currency".into(), TABLES.currency(order.currency())?.into());
        inputs.insert("taksit".into(), installment);
        inputs.insert("islemtipi".into(), tx_literal.into());

        if let Some(card) = card {
            inputs.insert("cardType".into(), TABLES.card_brand(card.brand())?.into());
            inputs.insert("pan".into(), card.number().into());
            inputs.insert("Ecom_Payment_Card_ExpDate_Month".into(), card.month());
            inputs.insert("Ecom_Payment_Card_ExpDate_Year".into(), card.year_short());
            inputs.insert("cv2".into(), card.cvv().into());
        }

        debug!("Prepared EST 3D form for order {}", order.id);
        Ok(form)
    }

    fn verify_callback(&self, account: &Account, _order: &Order, callback: &Payload) -> bool {
        self.hash_engine()
            .verify_hash_params(callback, &HashParamKeys::UPPERCASE, &account.store_key)
            .is_valid()
    }

    fn callback_authorizes_payment(&self, callback: &Payload) -> bool {
        callback.text("mdStatus") == Some("1")
    }

    fn encode(&self, _kind: RequestKind, payload: &Payload) -> GatewayResult<EncodedBody> {
        Ok(EncodedBody {
            body: encode_xml(&XML, payload)?,
            content_type: "text/xml; charset=ISO-8859-9",
        })
    }

    fn decode(&self, _kind: RequestKind, body: &[u8]) -> GatewayResult<Decoded> {
        decode_xml_reply(Bank::Est, body, XML.encoding)
    }

    fn map_payment_response(&self, tx: TransactionType, raw: &Payload) -> PaymentResult {
        self.common_response(tx, raw)
    }

    fn map_three_d_callback(&self, tx: TransactionType, callback: &Payload) -> PaymentResult {
        let mut result = self.callback_fields(tx, callback);
        if self.callback_authorizes_payment(callback) {
            result.eci = callback.string("eci");
            result.cavv = callback.string("cavv");
        } else {
            result.status_detail = StatusDetail::AuthenticationFailed;
            result.md_error_message = callback.string("mdErrorMsg");
        }
        result
    }

    fn map_three_d_pay(
        &self,
        tx: TransactionType,
        callback: &Payload,
    ) -> GatewayResult<PaymentResult> {
        let md_status = callback.text("mdStatus");
        let code = callback.text("ProcReturnCode");
        let mut result = self.callback_fields(tx, callback);
        result.eci = callback.string("eci");
        result.cavv = callback.string("cavv");
        result.md_error_message = callback.string("mdErrorMsg");
        result.all = callback.clone();

        if md_status == Some("1") {
            result.auth_code = callback.string("AuthCode");
            result.trans_id = callback.string("TransId");
            result.host_ref_num = callback.string("HostRefNum");
            result.response = callback.string("Response");
            result.proc_return_code = code.map(str::to_string);
            result.status_detail = TABLES.status_detail(code);
            result.error_message = callback.string("ErrMsg");
            result.error_code = result.error_message.as_ref().and(code.map(str::to_string));
        }

        if TABLES.is_approved(code) && md_status_authorized(md_status) {
            result.approve();
        } else {
            result.status = PaymentStatus::Declined;
            if result.status_detail == StatusDetail::Approved
                || result.status_detail == StatusDetail::UnrecognizedCode
            {
                result.status_detail = StatusDetail::AuthenticationFailed;
            }
        }
        Ok(result)
    }

    fn map_three_d_host(
        &self,
        tx: TransactionType,
        callback: &Payload,
    ) -> GatewayResult<PaymentResult> {
        let mut result = self.callback_fields(tx, callback);
        result.eci = callback.string("eci");
        result.cavv = callback.string("cavv");
        result.all = callback.clone();

        if md_status_authorized(callback.text("mdStatus")) {
            result.approve();
        } else {
            result.status_detail = StatusDetail::AuthenticationFailed;
            result.md_error_message = callback.string("mdErrorMsg");
        }
        Ok(result)
    }

    fn map_status_response(&self, raw: &Payload) -> PaymentResult {
        let mut result = self.common_response(TransactionType::Status, raw);
        result.auth_code = None;
        result.host_ref_num = None;
        result.error_code = None;
        result.order_status = raw.path_string(&["Extra", "ORDERSTATUS"]);
        result.capture = Some(false);

        if result.is_approved() {
            result.auth_code = raw.path_string(&["Extra", "AUTH_CODE"]);
            result.host_ref_num = raw.path_string(&["Extra", "HOST_REF_NUM"]);
            result.masked_number = raw.path_string(&["Extra", "PAN"]);
            result.first_amount = raw
                .path(&["Extra", "ORIG_TRANS_AMT"])
                .and_then(parse_minor_amount);
            result.capture_amount = raw
                .path(&["Extra", "CAPTURE_AMT"])
                .and_then(parse_minor_amount);
            result.capture = Some(
                result.first_amount.is_some() && result.first_amount == result.capture_amount,
            );
        }
        result
    }

    fn map_history_response(&self, raw: &Payload) -> PaymentResult {
        let mut result = self.common_response(TransactionType::History, raw);
        result.trans_count = raw
            .path(&["Extra", "TRXCOUNT"])
            .and_then(|count| count.parse().ok());
        result
    }
}

//! Bank protocol variants
//!
//! Each variant pairs a static [`BankTables`] with the field layouts of its
//! wire protocol. Lookups in the tables are the only place a canonical value
//! becomes a bank literal.

pub mod est;
pub mod garanti;
pub mod inter;
pub mod kuveyt;
pub mod payfor;
pub mod vakifbank;

pub use est::EstProvider;
pub use garanti::GarantiProvider;
pub use inter::InterProvider;
pub use kuveyt::KuveytProvider;
pub use payfor::PayForProvider;
pub use vakifbank::VakifBankProvider;

use crate::error::{GatewayError, GatewayResult};
use crate::payments::amount::installment_literal;
use crate::payments::codec::Decoded;
use crate::payments::codec::{decode_xml, is_html, xml::decode_text, Payload};
use crate::payments::result::{PaymentResult, PaymentStatus, StatusDetail};
use crate::payments::traits::BankProvider;
use crate::payments::types::{
    Bank, CardBrand, Currency, FrequencyUnit, SecurityModel, TransactionType,
};

/// Literal tables of one bank
#[derive(Debug)]
pub struct BankTables {
    pub bank: Bank,
    pub transaction_types: &'static [(TransactionType, &'static str)],
    pub security_models: &'static [(SecurityModel, &'static str)],
    pub card_brands: &'static [(CardBrand, &'static str)],
    pub currencies: &'static [(Currency, &'static str)],
    pub frequency_units: &'static [(FrequencyUnit, &'static str)],
    /// Return code to category; codes missing here are unrecognized
    pub return_codes: &'static [(&'static str, StatusDetail)],
    pub approved_code: &'static str,
    /// Mail/telephone order indicator
    pub moto: &'static str,
}

/// ISO 4217 numeric codes, shared by most banks
pub const ISO_CURRENCIES: &[(Currency, &str)] = &[
    (Currency::Try, "949"),
    (Currency::Usd, "840"),
    (Currency::Eur, "978"),
    (Currency::Gbp, "826"),
    (Currency::Jpy, "392"),
    (Currency::Rub, "643"),
];

pub const DEFAULT_FREQUENCY_UNITS: &[(FrequencyUnit, &str)] = &[
    (FrequencyUnit::Day, "D"),
    (FrequencyUnit::Week, "W"),
    (FrequencyUnit::Month, "M"),
    (FrequencyUnit::Year, "Y"),
];

/// Return codes of the EST platform, reused by banks that copied its scheme
pub const EST_RETURN_CODES: &[(&str, StatusDetail)] = &[
    ("00", StatusDetail::Approved),
    ("01", StatusDetail::BankCall),
    ("02", StatusDetail::BankCall),
    ("05", StatusDetail::Reject),
    ("09", StatusDetail::TryAgain),
    ("12", StatusDetail::InvalidTransaction),
    ("28", StatusDetail::Reject),
    ("51", StatusDetail::InsufficientBalance),
    ("54", StatusDetail::ExpiredCard),
    ("57", StatusDetail::DoesNotAllowCardHolder),
    ("62", StatusDetail::RestrictedCard),
    ("77", StatusDetail::RequestRejected),
    ("99", StatusDetail::GeneralError),
];

fn lookup<K: PartialEq + Copy>(table: &'static [(K, &'static str)], key: K) -> Option<&'static str> {
    table
        .iter()
        .find(|(candidate, _)| *candidate == key)
        .map(|(_, literal)| *literal)
}

impl BankTables {
    pub fn transaction_type(&self, tx: TransactionType) -> GatewayResult<&'static str> {
        lookup(self.transaction_types, tx)
            .ok_or_else(|| GatewayError::unsupported(self.bank, tx.to_string()))
    }

    pub fn security_model(&self, model: SecurityModel) -> GatewayResult<&'static str> {
        lookup(self.security_models, model)
            .ok_or_else(|| GatewayError::unsupported(self.bank, format!("{} model", model)))
    }

    pub fn card_brand(&self, brand: Option<CardBrand>) -> GatewayResult<&'static str> {
        let brand = brand
            .ok_or_else(|| GatewayError::unsupported_card_brand(self.bank, "unknown"))?;
        lookup(self.card_brands, brand)
            .ok_or_else(|| GatewayError::unsupported_card_brand(self.bank, brand.to_string()))
    }

    pub fn currency(&self, currency: Currency) -> GatewayResult<&'static str> {
        lookup(self.currencies, currency).ok_or_else(|| {
            GatewayError::configuration(format!("{} does not accept {}", self.bank, currency))
        })
    }

    /// Reverse lookup of a currency code echoed back by the bank
    pub fn currency_from(&self, code: &str) -> Option<Currency> {
        self.currencies
            .iter()
            .find(|(_, literal)| *literal == code)
            .map(|(currency, _)| *currency)
    }

    pub fn frequency_unit(&self, unit: FrequencyUnit) -> GatewayResult<&'static str> {
        lookup(self.frequency_units, unit).ok_or_else(|| {
            GatewayError::unsupported(self.bank, format!("recurring every {}", unit))
        })
    }

    pub fn installment(&self, installment: u32) -> String {
        installment_literal(self.bank, installment)
    }

    pub fn is_approved(&self, code: Option<&str>) -> bool {
        code == Some(self.approved_code)
    }

    pub fn status_detail(&self, code: Option<&str>) -> StatusDetail {
        let Some(code) = code else {
            return StatusDetail::UnrecognizedCode;
        };
        if code == self.approved_code {
            return StatusDetail::Approved;
        }
        self.return_codes
            .iter()
            .find(|(candidate, _)| *candidate == code)
            .map(|(_, detail)| *detail)
            .unwrap_or(StatusDetail::UnrecognizedCode)
    }

    /// Result skeleton with status, category and return code filled from
    /// `code`.
    pub fn result_for(&self, tx: TransactionType, code: Option<&str>) -> PaymentResult {
        let mut result = PaymentResult::new(tx);
        result.transaction = lookup(self.transaction_types, tx).map(str::to_string);
        result.proc_return_code = code.map(str::to_string);
        result.status_detail = self.status_detail(code);
        result.status = if self.is_approved(code) {
            PaymentStatus::Approved
        } else {
            PaymentStatus::Declined
        };
        result
    }
}

/// Provider for `bank`
pub fn provider_for(bank: Bank) -> Box<dyn BankProvider> {
    match bank {
        Bank::Est => Box::new(EstProvider),
        Bank::Garanti => Box::new(GarantiProvider),
        Bank::Inter => Box::new(InterProvider),
        Bank::Kuveyt => Box::new(KuveytProvider),
        Bank::VakifBank => Box::new(VakifBankProvider),
        Bank::PayFor => Box::new(PayForProvider),
    }
}

/// Decode an XML reply for banks that never answer with a page.
pub(crate) fn decode_xml_reply(bank: Bank, body: &[u8], encoding: &str) -> GatewayResult<Decoded> {
    let text = decode_text(body, encoding);
    if is_html(&text) {
        return Err(GatewayError::unexpected_html(bank, text));
    }
    decode_xml(bank, &text).map(Decoded::Structured)
}

/// Structured payload out of a decoded reply, rejecting the page shape.
pub(crate) fn structured(bank: Bank, decoded: Decoded) -> GatewayResult<Payload> {
    match decoded {
        Decoded::Structured(payload) => Ok(payload),
        Decoded::HtmlForm(form) => Err(GatewayError::unexpected_html(bank, form.target)),
    }
}

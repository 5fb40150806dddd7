//! Canonical data model shared by every bank variant
//!
//! Accounts, cards and orders are supplied by the caller and read by the
//! request mappers. None of these types carry bank-specific literals; each
//! provider translates them through its own tables.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, EnumString};

use crate::error::{GatewayError, GatewayResult};

/// Bank protocol variant
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Bank {
    /// EST / Asseco platform (Akbank, Isbank, Halkbank, Ziraat, ...)
    Est,
    /// Garanti BBVA virtual POS (GVPS)
    Garanti,
    /// Denizbank InterVPos
    Inter,
    /// Kuveyt Turk virtual POS
    Kuveyt,
    /// VakifBank VPOS 7/24 with MPI enrollment
    #[serde(rename = "vakifbank")]
    #[strum(serialize = "vakifbank")]
    VakifBank,
    /// PayFor platform (Finansbank / QNB and its white labels)
    #[serde(rename = "payfor")]
    #[strum(serialize = "payfor")]
    PayFor,
}

/// Security model negotiated with the bank for this merchant account
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SecurityModel {
    NonSecure,
    #[serde(rename = "3d_secure")]
    #[strum(serialize = "3d_secure")]
    ThreeDSecure,
    #[serde(rename = "3d_pay")]
    #[strum(serialize = "3d_pay")]
    ThreeDPay,
    #[serde(rename = "3d_host")]
    #[strum(serialize = "3d_host")]
    ThreeDHost,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Lang {
    #[default]
    Tr,
    En,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransactionType {
    Pay,
    PreAuth,
    PostAuth,
    Cancel,
    Refund,
    Status,
    History,
}

impl TransactionType {
    /// Refund and cancel run under the refund credentials when the bank
    /// issues separate ones.
    pub fn uses_refund_credentials(&self) -> bool {
        matches!(self, TransactionType::Refund | TransactionType::Cancel)
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Try,
    Usd,
    Eur,
    Gbp,
    Jpy,
    Rub,
}

impl Currency {
    /// ISO 4217 numeric code
    pub fn iso_numeric(&self) -> &'static str {
        match self {
            Currency::Try => "949",
            Currency::Usd => "840",
            Currency::Eur => "978",
            Currency::Gbp => "826",
            Currency::Jpy => "392",
            Currency::Rub => "643",
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CardBrand {
    Visa,
    Master,
    Amex,
    Troy,
}

static BRAND_PATTERNS: Lazy<Vec<(CardBrand, Regex)>> = Lazy::new(|| {
    [
        (CardBrand::Visa, r"^4[0-9]{12}(?:[0-9]{3})?$"),
        (CardBrand::Master, r"^5[1-5][0-9]{14}$"),
        (CardBrand::Amex, r"^3[47][0-9]{13}$"),
        (CardBrand::Troy, r"^(?:9792|65\d{2}|36|2205)\d{12}$"),
    ]
    .into_iter()
    .filter_map(|(brand, pattern)| Regex::new(pattern).ok().map(|re| (brand, re)))
    .collect()
});

impl CardBrand {
    /// Detect the card brand from a PAN. Spaces are ignored.
    pub fn detect(number: &str) -> Option<CardBrand> {
        let number: String = number.chars().filter(|c| !c.is_whitespace()).collect();
        BRAND_PATTERNS
            .iter()
            .find(|(_, re)| re.is_match(&number))
            .map(|(brand, _)| *brand)
    }
}

/// Payment card. Lives only for the duration of a single request build.
#[derive(Clone)]
pub struct Card {
    number: String,
    expiry_month: u8,
    expiry_year: u16,
    cvv: String,
    holder_name: Option<String>,
}

impl Card {
    /// `expiry_year` accepts both two- and four-digit years.
    pub fn new(
        number: impl Into<String>,
        expiry_month: u8,
        expiry_year: u16,
        cvv: impl Into<String>,
    ) -> GatewayResult<Self> {
        let number: String = number
            .into()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
            return Err(GatewayError::invalid_order("card number must be numeric"));
        }
        if !(1..=12).contains(&expiry_month) {
            return Err(GatewayError::invalid_order(format!(
                "invalid expiry month: {}",
                expiry_month
            )));
        }
        let expiry_year = if expiry_year < 100 {
            2000 + expiry_year
        } else {
            expiry_year
        };

        Ok(Self {
            number,
            expiry_month,
            expiry_year,
            cvv: cvv.into(),
            holder_name: None,
        })
    }

    pub fn with_holder_name(mut self, name: impl Into<String>) -> Self {
        self.holder_name = Some(name.into());
        self
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn cvv(&self) -> &str {
        &self.cvv
    }

    pub fn holder_name(&self) -> Option<&str> {
        self.holder_name.as_deref()
    }

    pub fn brand(&self) -> Option<CardBrand> {
        CardBrand::detect(&self.number)
    }

    /// Two-digit month, e.g. `01`
    pub fn month(&self) -> String {
        format!("{:02}", self.expiry_month)
    }

    /// Two-digit year, e.g. `25`
    pub fn year_short(&self) -> String {
        format!("{:02}", self.expiry_year % 100)
    }

    /// Four-digit year, e.g. `2025`
    pub fn year_full(&self) -> String {
        format!("{:04}", self.expiry_year)
    }

    /// `MMYY`
    pub fn expiry_month_year(&self) -> String {
        format!("{}{}", self.month(), self.year_short())
    }

    /// `MM/YY`
    pub fn expiry_slashed(&self) -> String {
        format!("{}/{}", self.month(), self.year_short())
    }

    /// `YYMM`
    pub fn expiry_year_month(&self) -> String {
        format!("{}{}", self.year_short(), self.month())
    }

    /// `YYYYMM`
    pub fn expiry_full_year_month(&self) -> String {
        format!("{}{}", self.year_full(), self.month())
    }

    pub fn masked_number(&self) -> String {
        let len = self.number.len();
        if len <= 10 {
            return "*".repeat(len);
        }
        format!(
            "{}{}{}",
            &self.number[..6],
            "*".repeat(len - 10),
            &self.number[len - 4..]
        )
    }
}

impl fmt::Debug for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Card")
            .field("number", &self.masked_number())
            .field("expiry", &self.expiry_slashed())
            .field("cvv", &"***")
            .field("holder_name", &self.holder_name)
            .finish()
    }
}

/// Merchant credentials for one bank
#[derive(Clone, Serialize, Deserialize)]
pub struct Account {
    pub bank: Bank,
    /// Client id / merchant id
    pub client_id: String,
    /// Terminal id (Garanti, VakifBank) or customer id (Kuveyt)
    pub terminal_id: Option<String>,
    pub username: String,
    pub password: String,
    pub refund_username: Option<String>,
    pub refund_password: Option<String>,
    /// Shared secret keying the integrity hashes
    pub store_key: String,
    pub model: SecurityModel,
    #[serde(default)]
    pub lang: Lang,
}

impl Account {
    pub fn new(
        bank: Bank,
        client_id: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        store_key: impl Into<String>,
        model: SecurityModel,
    ) -> Self {
        Self {
            bank,
            client_id: client_id.into(),
            terminal_id: None,
            username: username.into(),
            password: password.into(),
            refund_username: None,
            refund_password: None,
            store_key: store_key.into(),
            model,
            lang: Lang::default(),
        }
    }

    pub fn with_terminal_id(mut self, terminal_id: impl Into<String>) -> Self {
        self.terminal_id = Some(terminal_id.into());
        self
    }

    pub fn with_refund_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.refund_username = Some(username.into());
        self.refund_password = Some(password.into());
        self
    }

    pub fn with_lang(mut self, lang: Lang) -> Self {
        self.lang = lang;
        self
    }

    pub fn terminal_id(&self) -> GatewayResult<&str> {
        self.terminal_id
            .as_deref()
            .ok_or_else(|| GatewayError::missing_field("terminal_id"))
    }

    /// Username for the given transaction, falling back to the payment
    /// username when no refund credentials were issued.
    pub fn username_for(&self, tx: TransactionType) -> &str {
        match (&self.refund_username, tx.uses_refund_credentials()) {
            (Some(username), true) => username,
            _ => &self.username,
        }
    }

    /// Password for the given transaction, see [`Account::username_for`].
    pub fn password_for(&self, tx: TransactionType) -> &str {
        match (&self.refund_password, tx.uses_refund_credentials()) {
            (Some(password), true) => password,
            _ => &self.password,
        }
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("bank", &self.bank)
            .field("client_id", &self.client_id)
            .field("terminal_id", &self.terminal_id)
            .field("username", &self.username)
            .field("model", &self.model)
            .field("lang", &self.lang)
            .finish_non_exhaustive()
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum FrequencyUnit {
    Day,
    Week,
    Month,
    Year,
}

/// Recurring payment schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurring {
    /// How many times the payment repeats
    pub installment_count: u32,
    pub frequency_unit: FrequencyUnit,
    pub frequency_interval: u32,
    pub start_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    /// Major currency units
    pub amount: Decimal,
    pub currency: Option<Currency>,
    pub installment: Option<u32>,
    pub ip: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub success_url: Option<String>,
    pub fail_url: Option<String>,
    /// Random nonce mixed into 3D form hashes
    pub rand: Option<String>,
    pub lang: Option<Lang>,
    pub recurring: Option<Recurring>,
    /// Bank reference of the original transaction for post operations
    pub ref_ret_num: Option<String>,
}

impl Order {
    pub fn new(id: impl Into<String>, amount: Decimal) -> GatewayResult<Self> {
        let order = Self {
            id: id.into(),
            amount,
            currency: None,
            installment: None,
            ip: None,
            email: None,
            name: None,
            success_url: None,
            fail_url: None,
            rand: None,
            lang: None,
            recurring: None,
            ref_ret_num: None,
        };
        order.validate()?;
        Ok(order)
    }

    /// Check the invariants a deserialized or hand-edited order may have
    /// lost: non-negative amount and a non-empty id.
    pub fn validate(&self) -> GatewayResult<()> {
        if self.amount.is_sign_negative() && !self.amount.is_zero() {
            return Err(GatewayError::invalid_order(format!(
                "amount must not be negative: {}",
                self.amount
            )));
        }
        if self.id.trim().is_empty() {
            return Err(GatewayError::invalid_order("order id cannot be empty"));
        }
        Ok(())
    }

    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = Some(currency);
        self
    }

    pub fn with_installment(mut self, installment: u32) -> Self {
        self.installment = Some(installment);
        self
    }

    pub fn with_customer(mut self, ip: impl Into<String>, email: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self.email = Some(email.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_redirect_urls(
        mut self,
        success_url: impl Into<String>,
        fail_url: impl Into<String>,
    ) -> Self {
        self.success_url = Some(success_url.into());
        self.fail_url = Some(fail_url.into());
        self
    }

    pub fn with_rand(mut self, rand: impl Into<String>) -> Self {
        self.rand = Some(rand.into());
        self
    }

    pub fn with_lang(mut self, lang: Lang) -> Self {
        self.lang = Some(lang);
        self
    }

    pub fn with_recurring(mut self, recurring: Recurring) -> Self {
        self.recurring = Some(recurring);
        self
    }

    pub fn with_ref_ret_num(mut self, ref_ret_num: impl Into<String>) -> Self {
        self.ref_ret_num = Some(ref_ret_num.into());
        self
    }

    /// Fill the implicit defaults: currency, installment and the 3D nonce.
    pub fn with_defaults(mut self) -> Self {
        self.currency.get_or_insert(Currency::Try);
        self.installment.get_or_insert(0);
        if self.rand.is_none() {
            self.rand = Some(uuid::Uuid::new_v4().simple().to_string());
        }
        self
    }

    pub fn currency(&self) -> Currency {
        self.currency.unwrap_or_default()
    }

    pub fn installment(&self) -> u32 {
        self.installment.unwrap_or(0)
    }

    pub fn lang(&self, account: &Account) -> Lang {
        self.lang.unwrap_or(account.lang)
    }

    pub fn rand(&self) -> &str {
        self.rand.as_deref().unwrap_or_default()
    }

    pub fn success_url(&self) -> GatewayResult<&str> {
        self.success_url
            .as_deref()
            .ok_or_else(|| GatewayError::missing_field("success_url"))
    }

    pub fn fail_url(&self) -> GatewayResult<&str> {
        self.fail_url
            .as_deref()
            .ok_or_else(|| GatewayError::missing_field("fail_url"))
    }

    pub fn ref_ret_num(&self) -> GatewayResult<&str> {
        self.ref_ret_num
            .as_deref()
            .ok_or_else(|| GatewayError::missing_field("ref_ret_num"))
    }
}

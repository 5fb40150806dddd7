//! Bank provider and transport seams
//!
//! Every bank variant implements [`BankProvider`]: it maps canonical values
//! to its payloads, picks its wire format and maps replies back. The HTTP
//! client sits behind [`HttpTransport`] so flows can run against a recording
//! double in tests.

use async_trait::async_trait;

use crate::error::{GatewayError, GatewayResult};
use crate::payments::codec::{Decoded, Payload};
use crate::payments::hash::HashEngine;
use crate::payments::providers::BankTables;
use crate::payments::result::{PaymentResult, RedirectForm, ThreeDInit};
use crate::payments::types::{Account, Bank, Card, Order, TransactionType};

/// A request ready for the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub url: String,
    pub body: Vec<u8>,
    pub headers: Vec<(String, String)>,
}

impl OutboundRequest {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Raw reply. The status code is only logged; outcome comes from the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Which endpoint a payload is headed for. Some banks encode the 3D
/// initialisation call differently from API transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Transaction,
    ThreeDInit,
}

/// Encoded body plus its content type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBody {
    pub body: Vec<u8>,
    pub content_type: &'static str,
}

/// Send one request, receive one reply. Exactly one attempt.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// POST an encoded request to the bank
    ///
    /// Non-2xx statuses are not errors here; banks put their verdict in the
    /// body.
    ///
    /// # Arguments
    /// * `request` - Target URL, encoded body and headers
    ///
    /// # Returns
    /// * `HttpResponse` - Status code and raw body bytes
    ///
    /// # Errors
    /// * `GatewayError::Transport` - Connection failure or timeout
    async fn post(&self, request: OutboundRequest) -> GatewayResult<HttpResponse>;
}

/// Everything bank-specific about one protocol variant
///
/// Operations a bank does not offer keep the default implementation, which
/// fails with [`GatewayError::UnsupportedOperation`] before any I/O.
pub trait BankProvider: Send + Sync {
    fn bank(&self) -> Bank;

    /// Literal tables used for every canonical-to-bank lookup
    fn tables(&self) -> &'static BankTables;

    fn hash_engine(&self) -> HashEngine {
        HashEngine::default()
    }

    fn unsupported(&self, operation: &str) -> GatewayError {
        GatewayError::unsupported(self.bank(), operation)
    }

    // Request mapping

    /// Build a non-secure `Pay` or `PreAuth` request
    ///
    /// # Arguments
    /// * `account` - Merchant credentials
    /// * `order` - Order with its defaults already filled in
    /// * `card` - Card charged directly, without 3D authentication
    /// * `tx` - `Pay` or `PreAuth`
    /// * `test_mode` - Whether the bank's test mode flag is sent
    ///
    /// # Returns
    /// * `Payload` - Request fields in the bank's order, ready for [`Self::encode`]
    fn payment_request(
        &self,
        _account: &Account,
        _order: &Order,
        _card: &Card,
        _tx: TransactionType,
        _test_mode: bool,
    ) -> GatewayResult<Payload> {
        Err(self.unsupported("non-secure payment"))
    }

    /// Build the provisioning call that follows a successful 3D authentication
    ///
    /// Only called once the callback passed [`Self::verify_callback`] and
    /// [`Self::callback_authorizes_payment`].
    ///
    /// # Arguments
    /// * `account` - Merchant credentials
    /// * `order` - The order the callback belongs to
    /// * `card` - Card, for banks that need it again at provisioning
    /// * `tx` - `Pay` or `PreAuth`
    /// * `callback` - Normalized fields the bank posted back
    /// * `test_mode` - Whether the bank's test mode flag is sent
    ///
    /// # Returns
    /// * `Payload` - Provisioning request fields
    fn three_d_payment_request(
        &self,
        account: &Account,
        order: &Order,
        card: Option<&Card>,
        tx: TransactionType,
        callback: &Payload,
        test_mode: bool,
    ) -> GatewayResult<Payload>;

    /// Build the capture of a pre-authorisation
    fn post_auth_request(
        &self,
        _account: &Account,
        _order: &Order,
        _test_mode: bool,
    ) -> GatewayResult<Payload> {
        Err(self.unsupported("post-auth"))
    }

    /// Build a same-day void of `order`
    fn cancel_request(
        &self,
        _account: &Account,
        _order: &Order,
        _test_mode: bool,
    ) -> GatewayResult<Payload> {
        Err(self.unsupported("cancel"))
    }

    /// Build a refund request
    ///
    /// # Arguments
    /// * `account` - Merchant credentials; some banks switch to refund credentials
    /// * `order` - Original order; its amount is the amount refunded
    /// * `test_mode` - Whether the bank's test mode flag is sent
    ///
    /// # Returns
    /// * `Payload` - Refund request fields
    fn refund_request(
        &self,
        _account: &Account,
        _order: &Order,
        _test_mode: bool,
    ) -> GatewayResult<Payload> {
        Err(self.unsupported("refund"))
    }

    /// Build an order status query
    fn status_request(
        &self,
        _account: &Account,
        _order: &Order,
        _test_mode: bool,
    ) -> GatewayResult<Payload> {
        Err(self.unsupported("status"))
    }

    /// Build a transaction history query for `order`
    fn history_request(
        &self,
        _account: &Account,
        _order: &Order,
        _test_mode: bool,
    ) -> GatewayResult<Payload> {
        Err(self.unsupported("history"))
    }

    /// Build the 3D redirect form locally, signed with the bank's 3D hash
    ///
    /// # Arguments
    /// * `account` - Merchant credentials; its model selects the form variant
    /// * `order` - Order with success and fail URLs and a nonce
    /// * `card` - Card fields to embed; `None` for the hosted page
    /// * `tx` - `Pay` or `PreAuth`
    /// * `gateway_url` - Where the browser posts the form
    /// * `test_mode` - Whether the bank's test mode flag is sent
    ///
    /// # Returns
    /// * `RedirectForm` - Target URL and ordered hidden inputs
    fn three_d_form(
        &self,
        _account: &Account,
        _order: &Order,
        _card: Option<&Card>,
        _tx: TransactionType,
        _gateway_url: &str,
        _test_mode: bool,
    ) -> GatewayResult<RedirectForm> {
        Err(self.unsupported("3D form"))
    }

    /// Payload of the call some banks need before the redirect, such as an
    /// enrollment check or a session initialisation
    ///
    /// # Returns
    /// * `Some(Payload)` - Request to send to the 3D endpoint
    /// * `None` - The form is built locally by [`Self::three_d_form`]
    fn three_d_init_request(
        &self,
        _account: &Account,
        _order: &Order,
        _card: Option<&Card>,
        _tx: TransactionType,
    ) -> GatewayResult<Option<Payload>> {
        Ok(None)
    }

    /// Map the reply to [`Self::three_d_init_request`] to a redirect or a
    /// terminal outcome
    fn map_three_d_init(&self, _decoded: Decoded) -> GatewayResult<ThreeDInit> {
        Err(self.unsupported("3D initialisation"))
    }

    // Callback handling

    /// Turn the fields posted back by the bank into a payload.
    fn parse_callback(&self, fields: Payload) -> GatewayResult<Payload> {
        Ok(fields)
    }

    /// Integrity check of the callback. Runs before any provisioning call.
    ///
    /// # Arguments
    /// * `account` - Holds the store key the bank signed with
    /// * `order` - Order the callback claims to belong to
    /// * `callback` - Fields as posted back, before normalization
    ///
    /// # Returns
    /// * `bool` - True when the signature matches, false otherwise
    fn verify_callback(&self, account: &Account, order: &Order, callback: &Payload) -> bool;

    /// Whether the 3D outcome allows the provisioning call
    fn callback_authorizes_payment(&self, callback: &Payload) -> bool;

    // Codec

    /// Serialize a request payload in the bank's wire format
    ///
    /// # Arguments
    /// * `kind` - API transaction or 3D initialisation call
    /// * `payload` - Mapped request fields
    ///
    /// # Returns
    /// * `EncodedBody` - Body bytes and the content type to send them with
    fn encode(&self, kind: RequestKind, payload: &Payload) -> GatewayResult<EncodedBody>;

    /// Parse a raw reply
    ///
    /// # Arguments
    /// * `kind` - The kind of request this replies to
    /// * `body` - Raw bytes in the bank's declared encoding
    ///
    /// # Returns
    /// * `Decoded` - Structured payload, or an auto-submitting HTML form
    ///   where the bank answers with a page
    fn decode(&self, kind: RequestKind, body: &[u8]) -> GatewayResult<Decoded>;

    // Response mapping

    /// Map the reply to a payment, pre-auth, post-auth or 3D provisioning call
    ///
    /// # Arguments
    /// * `tx` - Transaction the reply belongs to
    /// * `raw` - Normalized reply payload
    ///
    /// # Returns
    /// * `PaymentResult` - Approved only when the bank's approval code is present
    fn map_payment_response(&self, tx: TransactionType, raw: &Payload) -> PaymentResult;

    /// 3D authentication part of a callback, before any provisioning
    fn map_three_d_callback(&self, tx: TransactionType, callback: &Payload) -> PaymentResult;

    /// 3D Pay: the callback already carries the provisioning result
    fn map_three_d_pay(
        &self,
        _tx: TransactionType,
        _callback: &Payload,
    ) -> GatewayResult<PaymentResult> {
        Err(self.unsupported("3D pay"))
    }

    /// 3D Host: the bank's hosted page ran the whole payment
    fn map_three_d_host(
        &self,
        _tx: TransactionType,
        _callback: &Payload,
    ) -> GatewayResult<PaymentResult> {
        Err(self.unsupported("3D host"))
    }

    fn map_cancel_response(&self, raw: &Payload) -> PaymentResult {
        self.map_payment_response(TransactionType::Cancel, raw)
    }

    fn map_refund_response(&self, raw: &Payload) -> PaymentResult {
        self.map_payment_response(TransactionType::Refund, raw)
    }

    fn map_status_response(&self, raw: &Payload) -> PaymentResult {
        self.map_payment_response(TransactionType::Status, raw)
    }

    fn map_history_response(&self, raw: &Payload) -> PaymentResult {
        self.map_payment_response(TransactionType::History, raw)
    }
}

//! Virtual POS facade
//!
//! [`VirtualPos`] binds one merchant account to its bank provider and a
//! transport, and runs each operation as a short flow: map the request,
//! send it once, decode and normalize the reply, map it to a
//! [`PaymentResult`]. 3D Secure callbacks are integrity-checked before
//! anything is sent to the bank.

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::payments::codec::{Decoded, Payload};
use crate::payments::providers::{provider_for, structured};
use crate::payments::result::{PaymentResult, PaymentStatus, ThreeDInit};
use crate::payments::state::{Flow, FlowState};
use crate::payments::traits::{BankProvider, HttpTransport, OutboundRequest, RequestKind};
use crate::payments::transport::ReqwestTransport;
use crate::payments::types::{Account, Bank, Card, Order, SecurityModel, TransactionType};

pub struct VirtualPos {
    provider: Box<dyn BankProvider>,
    transport: Arc<dyn HttpTransport>,
    config: GatewayConfig,
    account: Account,
}

impl VirtualPos {
    pub fn new(account: Account, config: GatewayConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            provider: provider_for(account.bank),
            transport,
            config,
            account,
        }
    }

    /// Gateway talking to the bank over reqwest with the configured timeout.
    pub fn from_config(account: Account, config: GatewayConfig) -> GatewayResult<Self> {
        let transport = ReqwestTransport::new(&config.transport)?;
        Ok(Self::new(account, config, Arc::new(transport)))
    }

    pub fn bank(&self) -> Bank {
        self.provider.bank()
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Non-secure payment or pre-authorisation
    pub async fn pay(
        &self,
        order: &Order,
        card: &Card,
        tx: TransactionType,
    ) -> GatewayResult<PaymentResult> {
        ensure_payment_tx(tx)?;
        let order = prepared(order)?;
        let mut flow = Flow::start(self.bank(), &order.id)?;

        let payload = self.provider.payment_request(
            &self.account,
            &order,
            card,
            tx,
            self.config.test_mode,
        )?;
        flow.advance(FlowState::NonSecurePaymentInFlight)?;

        let raw = self.exchange(&payload).await?;
        let result = self.provider.map_payment_response(tx, &raw);
        self.finish(&mut flow, &order, tx, result)
    }

    /// Prepare the 3D Secure redirect.
    ///
    /// Banks that need an enrollment or initialisation call get it here; the
    /// outcome can be something other than a redirect. The card is needed by
    /// every model except 3D host.
    pub async fn three_d_form(
        &self,
        order: &Order,
        card: Option<&Card>,
        tx: TransactionType,
    ) -> GatewayResult<ThreeDInit> {
        ensure_payment_tx(tx)?;
        if self.account.model == SecurityModel::NonSecure {
            return Err(GatewayError::configuration(
                "account uses the non-secure model, there is no 3D form",
            ));
        }

        let order = prepared(order)?;
        let mut flow = Flow::start(self.bank(), &order.id)?;

        if let Some(payload) =
            self.provider
                .three_d_init_request(&self.account, &order, card, tx)?
        {
            let url = self.three_d_url()?;
            let decoded = self.send(RequestKind::ThreeDInit, url, &payload).await?;
            flow.advance(FlowState::EnrollmentChecked)?;

            let init = self.provider.map_three_d_init(decoded)?;
            match &init {
                ThreeDInit::Redirect(form) => {
                    info!(
                        "{} 3D form for order {} posts to {}",
                        self.bank(),
                        order.id,
                        form.gateway
                    );
                    flow.advance(FlowState::ThreeDSFormPrepared)?;
                }
                _ => {
                    warn!(
                        "{} 3D initialisation for order {} did not produce a redirect",
                        self.bank(),
                        order.id
                    );
                    flow.complete(PaymentStatus::Declined)?;
                }
            }
            return Ok(init);
        }

        let gateway_url = match self.account.model {
            SecurityModel::ThreeDHost => match self.config.endpoints.gateway_3d_host_url.as_deref() {
                Some(url) => url,
                None => self.three_d_url()?,
            },
            _ => self.three_d_url()?,
        };

        let form = self.provider.three_d_form(
            &self.account,
            &order,
            card,
            tx,
            gateway_url,
            self.config.test_mode,
        )?;
        flow.advance(FlowState::ThreeDSFormPrepared)?;
        info!("{} 3D form for order {} posts to {}", self.bank(), order.id, form.gateway);

        Ok(ThreeDInit::Redirect(form))
    }

    /// Finish a 3D Secure payment from the fields the bank posted back.
    ///
    /// A callback failing its hash check yields a declined result and nothing
    /// is sent. Otherwise the provisioning call follows when the 3D outcome
    /// allows it.
    pub async fn complete_three_d(
        &self,
        order: &Order,
        card: Option<&Card>,
        tx: TransactionType,
        fields: Payload,
    ) -> GatewayResult<PaymentResult> {
        ensure_payment_tx(tx)?;
        let order = prepared(order)?;
        let mut flow = Flow::start(self.bank(), &order.id)?;

        let callback = self.provider.parse_callback(fields)?;
        flow.advance(FlowState::ThreeDSCallbackReceived)?;

        if !self.provider.verify_callback(&self.account, &order, &callback) {
            return self.reject_callback(&mut flow, &order, tx, callback);
        }
        flow.advance(FlowState::HashVerified)?;

        let callback = callback.normalized();
        let three_d = self.provider.map_three_d_callback(tx, &callback);
        if !self.provider.callback_authorizes_payment(&callback) {
            info!(
                "{} 3D authentication for order {} does not allow provisioning",
                self.bank(),
                order.id
            );
            return self.finish(&mut flow, &order, tx, three_d);
        }

        let payload = self.provider.three_d_payment_request(
            &self.account,
            &order,
            card,
            tx,
            &callback,
            self.config.test_mode,
        )?;
        flow.advance(FlowState::PaymentDispatched)?;

        let raw = self.exchange(&payload).await?;
        let payment = self.provider.map_payment_response(tx, &raw);
        let result = PaymentResult::merge(three_d, payment);
        self.finish(&mut flow, &order, tx, result)
    }

    /// Read the result of a 3D pay callback. The bank already provisioned.
    pub async fn complete_three_d_pay(
        &self,
        order: &Order,
        tx: TransactionType,
        fields: Payload,
    ) -> GatewayResult<PaymentResult> {
        self.complete_hosted(order, tx, fields, |provider, tx, callback| {
            provider.map_three_d_pay(tx, callback)
        })
    }

    /// Read the result of a 3D host callback.
    pub async fn complete_three_d_host(
        &self,
        order: &Order,
        tx: TransactionType,
        fields: Payload,
    ) -> GatewayResult<PaymentResult> {
        self.complete_hosted(order, tx, fields, |provider, tx, callback| {
            provider.map_three_d_host(tx, callback)
        })
    }

    /// Capture a pre-authorisation
    pub async fn post_auth(&self, order: &Order) -> GatewayResult<PaymentResult> {
        order.validate()?;
        let payload = self.provider.post_auth_request(
            &self.account,
            order,
            self.config.test_mode,
        )?;
        self.single(order, TransactionType::PostAuth, payload, |provider, raw| {
            provider.map_payment_response(TransactionType::PostAuth, raw)
        })
        .await
    }

    pub async fn cancel(&self, order: &Order) -> GatewayResult<PaymentResult> {
        order.validate()?;
        let payload = self
            .provider
            .cancel_request(&self.account, order, self.config.test_mode)?;
        self.single(order, TransactionType::Cancel, payload, |provider, raw| {
            provider.map_cancel_response(raw)
        })
        .await
    }

    pub async fn refund(&self, order: &Order) -> GatewayResult<PaymentResult> {
        order.validate()?;
        let payload = self
            .provider
            .refund_request(&self.account, order, self.config.test_mode)?;
        self.single(order, TransactionType::Refund, payload, |provider, raw| {
            provider.map_refund_response(raw)
        })
        .await
    }

    pub async fn status(&self, order: &Order) -> GatewayResult<PaymentResult> {
        order.validate()?;
        let payload = self
            .provider
            .status_request(&self.account, order, self.config.test_mode)?;
        self.single(order, TransactionType::Status, payload, |provider, raw| {
            provider.map_status_response(raw)
        })
        .await
    }

    pub async fn history(&self, order: &Order) -> GatewayResult<PaymentResult> {
        order.validate()?;
        let payload = self
            .provider
            .history_request(&self.account, order, self.config.test_mode)?;
        self.single(order, TransactionType::History, payload, |provider, raw| {
            provider.map_history_response(raw)
        })
        .await
    }

    fn complete_hosted<F>(
        &self,
        order: &Order,
        tx: TransactionType,
        fields: Payload,
        map: F,
    ) -> GatewayResult<PaymentResult>
    where
        F: FnOnce(&dyn BankProvider, TransactionType, &Payload) -> GatewayResult<PaymentResult>,
    {
        ensure_payment_tx(tx)?;
        let order = prepared(order)?;
        let mut flow = Flow::start(self.bank(), &order.id)?;

        let callback = self.provider.parse_callback(fields)?;
        flow.advance(FlowState::ThreeDSCallbackReceived)?;

        let result = map(self.provider.as_ref(), tx, &callback.clone().normalized())?;

        if !self.provider.verify_callback(&self.account, &order, &callback) {
            return self.reject_callback(&mut flow, &order, tx, callback);
        }
        flow.advance(FlowState::HashVerified)?;

        self.finish(&mut flow, &order, tx, result)
    }

    async fn single<F>(
        &self,
        order: &Order,
        tx: TransactionType,
        payload: Payload,
        map: F,
    ) -> GatewayResult<PaymentResult>
    where
        F: FnOnce(&dyn BankProvider, &Payload) -> PaymentResult,
    {
        let mut flow = Flow::start(self.bank(), &order.id)?;
        flow.advance(FlowState::RequestInFlight)?;

        let raw = self.exchange(&payload).await?;
        let result = map(self.provider.as_ref(), &raw);
        self.finish(&mut flow, order, tx, result)
    }

    fn reject_callback(
        &self,
        flow: &mut Flow,
        order: &Order,
        tx: TransactionType,
        callback: Payload,
    ) -> GatewayResult<PaymentResult> {
        warn!("{} callback hash check failed for order {}", self.bank(), order.id);
        flow.advance(FlowState::HashRejected)?;
        flow.complete(PaymentStatus::Declined)?;
        Ok(PaymentResult::hash_rejected(tx, Some(order.id.clone()), callback))
    }

    fn finish(
        &self,
        flow: &mut Flow,
        order: &Order,
        tx: TransactionType,
        result: PaymentResult,
    ) -> GatewayResult<PaymentResult> {
        flow.complete(result.status)?;
        info!(
            "{} {} for order {}: {} ({})",
            self.bank(),
            tx,
            order.id,
            result.status,
            result.status_detail
        );
        Ok(result)
    }

    fn three_d_url(&self) -> GatewayResult<&str> {
        let url = self.config.endpoints.gateway_3d_url.as_str();
        if url.is_empty() {
            return Err(GatewayError::configuration(format!(
                "no 3D gateway URL configured for {}",
                self.bank()
            )));
        }
        Ok(url)
    }

    /// Send an API transaction and return its normalized payload.
    async fn exchange(&self, payload: &Payload) -> GatewayResult<Payload> {
        let url = self.config.endpoints.api_url.as_str();
        let decoded = self.send(RequestKind::Transaction, url, payload).await?;
        structured(self.bank(), decoded)
    }

    async fn send(&self, kind: RequestKind, url: &str, payload: &Payload) -> GatewayResult<Decoded> {
        let encoded = self.provider.encode(kind, payload)?;
        let request = OutboundRequest {
            url: url.to_string(),
            body: encoded.body,
            headers: vec![("Content-Type".to_string(), encoded.content_type.to_string())],
        };

        info!("Sending {} request to {}", self.bank(), url);
        let response = self.transport.post(request).await?;
        info!("{} answered with HTTP {}", self.bank(), response.status);

        Ok(match self.provider.decode(kind, &response.body)? {
            Decoded::Structured(raw) => Decoded::Structured(raw.normalized()),
            form => form,
        })
    }
}

/// Validated copy of `order` with its implicit defaults filled in
fn prepared(order: &Order) -> GatewayResult<Order> {
    order.validate()?;
    Ok(order.clone().with_defaults())
}

fn ensure_payment_tx(tx: TransactionType) -> GatewayResult<()> {
    match tx {
        TransactionType::Pay | TransactionType::PreAuth => Ok(()),
        other => Err(GatewayError::configuration(format!(
            "{} is not a payment transaction",
            other
        ))),
    }
}

//! Operation flow states
//!
//! Every `VirtualPos` operation walks a [`Flow`] from `Idle` to `Completed`.
//! The flow is scratch state owned by that one call; transitions that the
//! operation graph does not allow are rejected.

use strum::Display;
use tracing::debug;

use crate::error::{GatewayError, GatewayResult};
use crate::payments::result::PaymentStatus;
use crate::payments::types::Bank;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum FlowState {
    Idle,
    OrderSet,
    /// Non-secure payment or pre-auth sent
    NonSecurePaymentInFlight,
    /// Post-auth, cancel, refund, status or history sent
    RequestInFlight,
    /// Bank answered the enrollment or 3D initialisation call
    EnrollmentChecked,
    ThreeDSFormPrepared,
    ThreeDSCallbackReceived,
    HashVerified,
    HashRejected,
    PaymentDispatched,
    Completed(PaymentStatus),
}

impl FlowState {
    pub fn can_transition(&self, next: &FlowState) -> bool {
        use FlowState::*;

        matches!(
            (self, next),
            (Idle, OrderSet)
                | (OrderSet, NonSecurePaymentInFlight)
                | (OrderSet, RequestInFlight)
                | (OrderSet, EnrollmentChecked)
                | (OrderSet, ThreeDSFormPrepared)
                | (OrderSet, ThreeDSCallbackReceived)
                | (EnrollmentChecked, ThreeDSFormPrepared)
                | (EnrollmentChecked, Completed(_))
                | (ThreeDSFormPrepared, ThreeDSCallbackReceived)
                | (ThreeDSCallbackReceived, HashVerified)
                | (ThreeDSCallbackReceived, HashRejected)
                | (HashRejected, Completed(PaymentStatus::Declined))
                | (HashVerified, PaymentDispatched)
                | (HashVerified, Completed(_))
                | (NonSecurePaymentInFlight, Completed(_))
                | (RequestInFlight, Completed(_))
                | (PaymentDispatched, Completed(_))
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowState::Completed(_) | FlowState::ThreeDSFormPrepared)
    }
}

/// State of one operation
#[derive(Debug)]
pub struct Flow {
    bank: Bank,
    order_id: String,
    state: FlowState,
    history: Vec<FlowState>,
}

impl Flow {
    pub fn new(bank: Bank, order_id: impl Into<String>) -> Self {
        Self {
            bank,
            order_id: order_id.into(),
            state: FlowState::Idle,
            history: vec![FlowState::Idle],
        }
    }

    /// A flow that already has its order, which is where every operation
    /// starts.
    pub fn start(bank: Bank, order_id: impl Into<String>) -> GatewayResult<Self> {
        let mut flow = Self::new(bank, order_id);
        flow.advance(FlowState::OrderSet)?;
        Ok(flow)
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn history(&self) -> &[FlowState] {
        &self.history
    }

    pub fn advance(&mut self, next: FlowState) -> GatewayResult<()> {
        if !self.state.can_transition(&next) {
            return Err(GatewayError::configuration(format!(
                "{} flow for order {} cannot move from {} to {}",
                self.bank, self.order_id, self.state, next
            )));
        }
        debug!(
            "{} order {}: {} -> {}",
            self.bank, self.order_id, self.state, next
        );
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    /// Move to `Completed` with the result's status.
    pub fn complete(&mut self, status: PaymentStatus) -> GatewayResult<()> {
        self.advance(FlowState::Completed(status))
    }
}

//! Virtual POS integration
//!
//! Canonical orders, cards and accounts go in; bank-specific payloads go out
//! over [`traits::HttpTransport`]; replies come back as [`result::PaymentResult`].

pub mod amount;
pub mod codec;
pub mod gateway;
pub mod hash;
pub mod providers;
pub mod result;
pub mod state;
pub mod traits;
pub mod transport;
pub mod types;

pub use gateway::VirtualPos;
pub use result::{PaymentResult, PaymentStatus, RedirectForm, StatusDetail, ThreeDInit};
pub use traits::{BankProvider, HttpResponse, HttpTransport, OutboundRequest};
pub use transport::ReqwestTransport;
pub use types::{Account, Bank, Card, Currency, Lang, Order, SecurityModel, TransactionType};

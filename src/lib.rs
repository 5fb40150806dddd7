pub mod config;
pub mod error;
pub mod logging;
pub mod payments;

pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult};
pub use payments::VirtualPos;

use thiserror::Error;

use crate::payments::types::Bank;

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{operation} is not supported by {bank}")]
    UnsupportedOperation { bank: Bank, operation: String },

    #[error("Card brand is not supported by {bank}: {brand}")]
    UnsupportedCardBrand { bank: Bank, brand: String },

    #[error("Required field is missing: {field}")]
    MissingField { field: String },

    #[error("Invalid order: {message}")]
    InvalidOrder { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Malformed response from {bank}: {message}")]
    MalformedResponse { bank: Bank, message: String },

    #[error("Unexpected HTML response from {bank}")]
    UnexpectedHtml { bank: Bank, body: String },

    #[error("HTML response does not contain a usable form: {message}")]
    FormNotFound { message: String },

    #[error("Encoding error: {message}")]
    Encoding { message: String },
}

impl GatewayError {
    pub fn unsupported(bank: Bank, operation: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            bank,
            operation: operation.into(),
        }
    }

    pub fn unsupported_card_brand(bank: Bank, brand: impl Into<String>) -> Self {
        Self::UnsupportedCardBrand {
            bank,
            brand: brand.into(),
        }
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    pub fn invalid_order(message: impl Into<String>) -> Self {
        Self::InvalidOrder {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn malformed(bank: Bank, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            bank,
            message: message.into(),
        }
    }

    pub fn unexpected_html(bank: Bank, body: impl Into<String>) -> Self {
        Self::UnexpectedHtml {
            bank,
            body: body.into(),
        }
    }

    pub fn form_not_found(message: impl Into<String>) -> Self {
        Self::FormNotFound {
            message: message.into(),
        }
    }

    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    /// Errors raised before any I/O because the bank variant or the inputs
    /// cannot express the requested operation.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedOperation { .. }
                | Self::UnsupportedCardBrand { .. }
                | Self::MissingField { .. }
                | Self::InvalidOrder { .. }
                | Self::Configuration { .. }
        )
    }

    /// Errors caused by the wire: transport failures and undecodable replies.
    pub fn is_wire(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. }
                | Self::MalformedResponse { .. }
                | Self::UnexpectedHtml { .. }
                | Self::FormNotFound { .. }
                | Self::Encoding { .. }
        )
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::transport(format!("Request timed out: {}", err))
        } else {
            GatewayError::transport(format!("Request error: {}", err))
        }
    }
}

impl From<serde_urlencoded::ser::Error> for GatewayError {
    fn from(err: serde_urlencoded::ser::Error) -> Self {
        GatewayError::encoding(format!("Form encoding failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_operation_is_configuration_error() {
        let err = GatewayError::unsupported(Bank::Inter, "history");
        assert!(err.is_configuration());
        assert!(!err.is_wire());
        assert_eq!(err.to_string(), "history is not supported by inter");
    }

    #[test]
    fn test_malformed_response_is_wire_error() {
        let err = GatewayError::malformed(Bank::Est, "unexpected end of document");
        assert!(err.is_wire());
        assert!(!err.is_configuration());
    }
}

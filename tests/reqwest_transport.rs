//! reqwest transport against a local mock bank

use rust_decimal_macros::dec;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vpos_gateway::config::{GatewayConfig, TransportConfig};
use vpos_gateway::error::GatewayError;
use vpos_gateway::payments::{
    Account, Bank, Card, HttpTransport, Order, OutboundRequest, PaymentStatus, ReqwestTransport,
    SecurityModel, TransactionType, VirtualPos,
};

fn outbound(url: String) -> OutboundRequest {
    OutboundRequest {
        url,
        body: b"<CC5Request><Name>ISBANKAPI</Name></CC5Request>".to_vec(),
        headers: vec![("Content-Type".to_string(), "text/xml".to_string())],
    }
}

#[tokio::test]
async fn test_post_sends_body_and_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fim/api"))
        .and(header("Content-Type", "text/xml"))
        .and(body_string_contains("<Name>ISBANKAPI</Name>"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<CC5Response/>"))
        .expect(1)
        .mount(&server)
        .await;

    let transport = ReqwestTransport::new(&TransportConfig::default()).unwrap();
    let response = transport
        .post(outbound(format!("{}/fim/api", server.uri())))
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"<CC5Response/>".to_vec());
}

#[tokio::test]
async fn test_error_status_still_returns_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("<CC5Response><ProcReturnCode>99</ProcReturnCode></CC5Response>"))
        .mount(&server)
        .await;

    let transport = ReqwestTransport::new(&TransportConfig::default()).unwrap();
    let response = transport.post(outbound(server.uri())).await.unwrap();

    assert_eq!(response.status, 500);
    assert!(String::from_utf8_lossy(&response.body).contains("99"));
}

#[tokio::test]
async fn test_timeout_is_a_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let transport = ReqwestTransport::new(&TransportConfig { timeout_secs: 1 }).unwrap();
    let err = transport.post(outbound(server.uri())).await.unwrap_err();

    assert!(matches!(err, GatewayError::Transport { .. }));
}

#[tokio::test]
async fn test_virtual_pos_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fim/api"))
        .and(header("Content-Type", "text/xml; charset=ISO-8859-9"))
        .and(body_string_contains("<Type>Auth</Type>"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<CC5Response><OrderId>ORD-9</OrderId><Response>Approved</Response>\
             <AuthCode>P12345</AuthCode><HostRefNum>0308</HostRefNum>\
             <ProcReturnCode>00</ProcReturnCode><TransId>T1</TransId></CC5Response>",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let config = GatewayConfig::new(
        format!("{}/fim/api", server.uri()),
        format!("{}/fim/est3Dgate", server.uri()),
    );
    let account = Account::new(
        Bank::Est,
        "700655000200",
        "ISBANKAPI",
        "ISBANK07",
        "TRPS0200",
        SecurityModel::NonSecure,
    );
    let pos = VirtualPos::from_config(account, config).unwrap();
    let order = Order::new("ORD-9", dec!(25.5)).unwrap();
    let card = Card::new("5555444433332222", 12, 30, "122").unwrap();

    let result = pos.pay(&order, &card, TransactionType::Pay).await.unwrap();

    assert_eq!(result.status, PaymentStatus::Approved);
    assert_eq!(result.order_id.as_deref(), Some("ORD-9"));
    assert_eq!(result.auth_code.as_deref(), Some("P12345"));
}

//! End-to-end operation flows against a recording transport

mod common;

use rust_decimal_macros::dec;

use common::{gateway, RecordingTransport, API_URL, GATEWAY_3D_URL};
use vpos_gateway::error::GatewayError;
use vpos_gateway::payments::codec::Payload;
use vpos_gateway::payments::hash::HashEngine;
use vpos_gateway::payments::{
    Account, Bank, Card, Order, PaymentStatus, SecurityModel, StatusDetail, ThreeDInit,
    TransactionType,
};

const EST_APPROVED: &str = r#"<?xml version="1.0" encoding="ISO-8859-9"?>
<CC5Response>
  <OrderId>ORD-1</OrderId>
  <GroupId>ORD-1</GroupId>
  <Response>Approved</Response>
  <AuthCode>P48911</AuthCode>
  <HostRefNum>030814398512</HostRefNum>
  <ProcReturnCode>00</ProcReturnCode>
  <TransId>20226FJBG12345</TransId>
  <ErrMsg></ErrMsg>
  <Extra>
    <SETTLEID>2286</SETTLEID>
    <TRXDATE>20201230 11:10:26</TRXDATE>
    <ERRORCODE></ERRORCODE>
    <NUMCODE>00</NUMCODE>
  </Extra>
</CC5Response>"#;

const EST_INSUFFICIENT_BALANCE: &str = r#"<?xml version="1.0" encoding="ISO-8859-9"?>
<CC5Response>
  <OrderId>ORD-1</OrderId>
  <Response>Declined</Response>
  <AuthCode></AuthCode>
  <ProcReturnCode>51</ProcReturnCode>
  <ErrMsg>Yetersiz bakiye</ErrMsg>
  <Extra><ERRORCODE>CORE-2008</ERRORCODE></Extra>
</CC5Response>"#;

fn est_account() -> Account {
    Account::new(
        Bank::Est,
        "700655000200",
        "ISBANKAPI",
        "ISBANK07",
        "TRPS0200",
        SecurityModel::ThreeDSecure,
    )
}

fn est_order() -> Order {
    Order::new("ORD-1", dec!(10.01))
        .unwrap()
        .with_customer("127.0.0.1", "buyer@shop.test")
        .with_name("John Doe")
        .with_redirect_urls("https://shop.test/ok", "https://shop.test/fail")
        .with_installment(1)
}

fn master_card() -> Card {
    Card::new("5555444433332222", 12, 30, "122").unwrap()
}

fn visa_card() -> Card {
    Card::new("4543600299100712", 11, 30, "454").unwrap()
}

/// EST 3D callback signed the way the bank signs it
fn est_callback(md_status: &str, store_key: &str) -> Payload {
    let fields = [
        ("clientid", "700655000200"),
        ("oid", "ORD-1"),
        ("mdStatus", md_status),
        ("cavv", "AAABBBCCCDDD"),
        ("eci", "02"),
        ("md", "435508:86D9842A9C594E17B28A2B9037FEB140E8EA480AED5FE19B5CEA446960AA03AA:4122:##700655000200"),
        ("rnd", "Tr2zIKYRw1ktSYBc5rfs"),
    ];
    let values: Vec<&str> = fields.iter().map(|(_, value)| *value).collect();

    let mut callback = Payload::new();
    for (key, value) in fields {
        callback.insert(key, value);
    }
    callback.insert("HASHPARAMS", "clientid:oid:mdStatus:cavv:eci:md:rnd:");
    callback.insert("HASHPARAMSVAL", values.concat());
    callback.insert("HASH", HashEngine::default().compute(values.as_slice(), store_key));
    callback
}

#[tokio::test]
async fn test_non_secure_payment_approved() {
    let transport = RecordingTransport::replying(EST_APPROVED);
    let pos = gateway(est_account(), transport.clone());

    let result = pos
        .pay(&est_order(), &master_card(), TransactionType::Pay)
        .await
        .unwrap();

    assert_eq!(result.status, PaymentStatus::Approved);
    assert_eq!(result.status_detail, StatusDetail::Approved);
    assert_eq!(result.auth_code.as_deref(), Some("P48911"));
    assert_eq!(result.host_ref_num.as_deref(), Some("030814398512"));
    assert_eq!(result.error_code, None);

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, API_URL);
    assert_eq!(
        requests[0].headers,
        vec![(
            "Content-Type".to_string(),
            "text/xml; charset=ISO-8859-9".to_string()
        )]
    );
    let body = requests[0].body_text();
    assert!(body.contains("<Type>Auth</Type>"));
    assert!(body.contains("<Total>10.01</Total>"));
}

#[tokio::test]
async fn test_non_secure_payment_declined() {
    let transport = RecordingTransport::replying(EST_INSUFFICIENT_BALANCE);
    let pos = gateway(est_account(), transport.clone());

    let result = pos
        .pay(&est_order(), &master_card(), TransactionType::Pay)
        .await
        .unwrap();

    assert_eq!(result.status, PaymentStatus::Declined);
    assert_eq!(result.status_detail, StatusDetail::InsufficientBalance);
    assert_eq!(result.auth_code, None);
    assert_eq!(result.error_code.as_deref(), Some("CORE-2008"));
    assert_eq!(result.error_message.as_deref(), Some("Yetersiz bakiye"));
}

#[tokio::test]
async fn test_single_installment_is_never_sent_as_one() {
    let transport = RecordingTransport::replying(EST_APPROVED);
    let pos = gateway(est_account(), transport.clone());
    pos.pay(&est_order(), &master_card(), TransactionType::Pay)
        .await
        .unwrap();
    let body = transport.requests()[0].body_text();
    assert!(body.contains("<Taksit/>"));

    transport.push_reply(EST_APPROVED);
    pos.pay(
        &est_order().with_installment(3),
        &master_card(),
        TransactionType::Pay,
    )
    .await
    .unwrap();
    let body = transport.requests()[1].body_text();
    assert!(body.contains("<Taksit>3</Taksit>"));
}

#[tokio::test]
async fn test_payment_requires_payment_transaction_type() {
    let transport = RecordingTransport::new();
    let pos = gateway(est_account(), transport.clone());

    let err = pos
        .pay(&est_order(), &master_card(), TransactionType::Refund)
        .await
        .unwrap_err();

    assert!(err.is_configuration());
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_negative_deserialized_order_never_reaches_the_bank() {
    let transport = RecordingTransport::replying(EST_APPROVED);
    let pos = gateway(est_account(), transport.clone());
    let order: Order = serde_json::from_str(r#"{"id":"ORD-1","amount":"-5"}"#).unwrap();

    let err = pos
        .pay(&order, &master_card(), TransactionType::Pay)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::InvalidOrder { .. }));

    assert!(pos.refund(&order).await.is_err());
    assert!(pos.post_auth(&order).await.is_err());
    assert!(pos.cancel(&order).await.is_err());
    assert!(pos.status(&order).await.is_err());
    assert!(pos.history(&order).await.is_err());
    assert!(pos.three_d_form(&order, None, TransactionType::Pay).await.is_err());
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_malformed_reply_is_an_error() {
    let transport = RecordingTransport::replying("<CC5Response><OrderId>1</OrderId>");
    let pos = gateway(est_account(), transport.clone());

    let err = pos
        .pay(&est_order(), &master_card(), TransactionType::Pay)
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::MalformedResponse { bank: Bank::Est, .. }));
    assert!(err.is_wire());
}

#[tokio::test]
async fn test_three_d_form_is_built_locally() {
    let transport = RecordingTransport::new();
    let pos = gateway(est_account(), transport.clone());

    let init = pos
        .three_d_form(&est_order(), Some(&master_card()), TransactionType::Pay)
        .await
        .unwrap();

    let form = init.redirect_form().unwrap();
    assert_eq!(form.gateway, GATEWAY_3D_URL);
    assert_eq!(form.inputs["oid"], "ORD-1");
    assert_eq!(form.inputs["taksit"], "");
    assert!(!form.inputs["rnd"].is_empty());
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_three_d_callback_with_bad_hash_sends_nothing() {
    let transport = RecordingTransport::replying(EST_APPROVED);
    let pos = gateway(est_account(), transport.clone());
    let callback = est_callback("1", "WRONGKEY");

    let result = pos
        .complete_three_d(&est_order(), None, TransactionType::Pay, callback)
        .await
        .unwrap();

    assert_eq!(result.status, PaymentStatus::Declined);
    assert_eq!(result.status_detail, StatusDetail::AuthenticationFailed);
    assert_eq!(result.error_message.as_deref(), Some("hash check failed"));
    assert_eq!(result.order_id.as_deref(), Some("ORD-1"));
    assert!(result.three_d_all.is_some());
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_three_d_callback_approved_after_provisioning() {
    let transport = RecordingTransport::replying(EST_APPROVED);
    let pos = gateway(est_account(), transport.clone());
    let callback = est_callback("1", "TRPS0200");

    let result = pos
        .complete_three_d(&est_order(), None, TransactionType::Pay, callback)
        .await
        .unwrap();

    assert_eq!(result.status, PaymentStatus::Approved);
    assert_eq!(result.md_status.as_deref(), Some("1"));
    assert_eq!(result.transaction_security.as_deref(), Some("Full 3D Secure"));
    assert_eq!(result.eci.as_deref(), Some("02"));
    assert_eq!(result.auth_code.as_deref(), Some("P48911"));

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    let body = requests[0].body_text();
    assert!(body.contains("<PayerSecurityLevel>02</PayerSecurityLevel>"));
    assert!(body.contains("<CardholderPresentCode>13</CardholderPresentCode>"));
}

#[tokio::test]
async fn test_payfor_three_d_payment_finalized_by_request_guid() {
    let transport = RecordingTransport::replying(
        "<PayforResponse><OrderId>ORD-1</OrderId><AuthCode>S52001</AuthCode>\
         <ProcReturnCode>00</ProcReturnCode><TransId>T-77</TransId><ErrMsg/></PayforResponse>",
    );
    let account = Account::new(
        Bank::PayFor,
        "085300000009704",
        "QNB_API",
        "UcBN0",
        "12345678",
        SecurityModel::ThreeDSecure,
    );
    let pos = gateway(account, transport.clone());

    let init = pos
        .three_d_form(&est_order(), Some(&visa_card()), TransactionType::Pay)
        .await
        .unwrap();
    let form = init.redirect_form().unwrap();
    assert_eq!(form.gateway, GATEWAY_3D_URL);
    assert_eq!(form.inputs["MbrId"], "5");
    assert_eq!(form.inputs["InstallmentCount"], "0");

    let signed = HashEngine::default()
        .digest("08530000000970412345678ORD-1S52001001rnd-9QNB_API");
    let callback = Payload::new()
        .with("OrderId", "ORD-1")
        .with("AuthCode", "S52001")
        .with("ProcReturnCode", "00")
        .with("3DStatus", "1")
        .with("ResponseRnd", "rnd-9")
        .with("RequestGuid", "1000000057437884")
        .with("ResponseHash", signed);

    let result = pos
        .complete_three_d(&est_order(), None, TransactionType::Pay, callback)
        .await
        .unwrap();

    assert_eq!(result.status, PaymentStatus::Approved);
    assert_eq!(result.trans_id.as_deref(), Some("T-77"));

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    let body = requests[0].body_text();
    assert!(body.contains("<RequestGuid>1000000057437884</RequestGuid>"));
    assert!(body.contains("<SecureType>3DModelPayment</SecureType>"));
    assert!(!body.contains("<Pan>"));
}

#[tokio::test]
async fn test_failed_authentication_is_not_provisioned() {
    let transport = RecordingTransport::replying(EST_APPROVED);
    let pos = gateway(est_account(), transport.clone());
    let callback = est_callback("0", "TRPS0200");

    let result = pos
        .complete_three_d(&est_order(), None, TransactionType::Pay, callback)
        .await
        .unwrap();

    assert_eq!(result.status, PaymentStatus::Declined);
    assert_eq!(result.status_detail, StatusDetail::AuthenticationFailed);
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_three_d_pay_rejects_bad_hash() {
    let transport = RecordingTransport::new();
    let account = Account::new(
        Bank::Est,
        "700655000200",
        "ISBANKAPI",
        "ISBANK07",
        "TRPS0200",
        SecurityModel::ThreeDPay,
    );
    let pos = gateway(account, transport.clone());
    let mut callback = est_callback("1", "TRPS0200");
    callback.insert("ProcReturnCode", "00");
    callback.insert("HASH", "AAAA");

    let result = pos
        .complete_three_d_pay(&est_order(), TransactionType::Pay, callback)
        .await
        .unwrap();

    assert_eq!(result.status, PaymentStatus::Declined);
    assert_eq!(result.error_message.as_deref(), Some("hash check failed"));
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_vakifbank_card_not_enrolled() {
    let transport = RecordingTransport::replying(
        r#"<?xml version="1.0" encoding="utf-8"?>
<IPaySecure>
  <Message ID="ORD-1">
    <VERes>
      <Status>N</Status>
    </VERes>
  </Message>
  <VerifyEnrollmentRequestId>ORD-1</VerifyEnrollmentRequestId>
  <MessageErrorCode></MessageErrorCode>
  <ErrorMessage></ErrorMessage>
</IPaySecure>"#,
    );
    let account = Account::new(
        Bank::VakifBank,
        "000000000111111",
        "",
        "3XTgER89as",
        "",
        SecurityModel::ThreeDSecure,
    )
    .with_terminal_id("VP999999");
    let pos = gateway(account, transport.clone());

    let init = pos
        .three_d_form(&est_order(), Some(&visa_card()), TransactionType::Pay)
        .await
        .unwrap();

    assert!(matches!(init, ThreeDInit::NotEnrolled { .. }));
    assert!(init.redirect_form().is_none());

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, GATEWAY_3D_URL);
    let body = requests[0].body_text();
    assert!(body.contains("PurchaseAmount=10.01"));
    assert!(body.contains("BrandName=100"));
    assert!(!body.contains("InstallmentCount"));
}

#[tokio::test]
async fn test_kuveyt_html_reply_becomes_redirect() {
    let transport = RecordingTransport::replying(
        r#"<!DOCTYPE html>
<html>
<body onload="OnLoadEvent();">
<form name="downloadForm" action="https://acs.bank.test/mdpaympi/MerchantServer" method="POST">
<input type="hidden" name="PaReq" value="eJxdUk1v2zAM" />
<input type="hidden" name="TermUrl" value="https://boa.kuveytturk.com.tr/sanalposservice/Home/ThreeDModelResult" />
<input type="hidden" name="MD" value="s2FR1nTq+kWcx6Jg" />
<input type="submit" name="submit" value="Submit" />
</form>
</body>
</html>"#,
    );
    let account = Account::new(Bank::Kuveyt, "80", "apiuser", "Api123", "", SecurityModel::ThreeDSecure)
        .with_terminal_id("400235");
    let pos = gateway(account, transport.clone());
    let card = Card::new("4155650100416111", 1, 30, "123")
        .unwrap()
        .with_holder_name("John Doe");

    let init = pos
        .three_d_form(&est_order(), Some(&card), TransactionType::Pay)
        .await
        .unwrap();

    let form = init.redirect_form().unwrap();
    assert_eq!(form.gateway, "https://acs.bank.test/mdpaympi/MerchantServer");
    assert_eq!(form.inputs["PaReq"], "eJxdUk1v2zAM");
    assert_eq!(form.inputs["MD"], "s2FR1nTq+kWcx6Jg");
    assert!(!form.inputs.contains_key("submit"));

    let requests = transport.requests();
    assert_eq!(requests[0].url, GATEWAY_3D_URL);
    assert!(requests[0].body_text().contains("<InstallmentCount>0</InstallmentCount>"));
}

#[tokio::test]
async fn test_garanti_refund_uses_refund_credentials() {
    let transport = RecordingTransport::replying(
        r#"<GVPSResponse>
  <Mode></Mode>
  <Order><OrderID>ORD-1</OrderID><GroupID></GroupID></Order>
  <Transaction>
    <Response>
      <Source>HOST</Source>
      <Code>00</Code>
      <ReasonCode>00</ReasonCode>
      <Message>Approved</Message>
      <ErrorMsg></ErrorMsg>
    </Response>
    <RetrefNum>035208609374</RetrefNum>
    <AuthCode>304919</AuthCode>
  </Transaction>
</GVPSResponse>"#,
    );
    let account = Account::new(
        Bank::Garanti,
        "7000679",
        "PROVAUT",
        "123qweASD/",
        "12345678",
        SecurityModel::ThreeDSecure,
    )
    .with_terminal_id("30691298")
    .with_refund_credentials("PROVRFN", "123qweASD/refund");
    let pos = gateway(account, transport.clone());
    let order = Order::new("ORD-1", dec!(1.00))
        .unwrap()
        .with_ref_ret_num("035208609374");

    let result = pos.refund(&order).await.unwrap();

    assert_eq!(result.status, PaymentStatus::Approved);
    assert_eq!(result.transaction_type, TransactionType::Refund);
    let body = transport.requests()[0].body_text();
    assert!(body.contains("<ProvUserID>PROVRFN</ProvUserID>"));
    assert!(body.contains("<Mode>TEST</Mode>"));
    assert!(body.contains("<OriginalRetrefNum>035208609374</OriginalRetrefNum>"));
}

#[tokio::test]
async fn test_unsupported_operations_fail_before_io() {
    let transport = RecordingTransport::new();
    let order = est_order();

    let kuveyt = gateway(
        Account::new(Bank::Kuveyt, "80", "apiuser", "Api123", "", SecurityModel::ThreeDSecure)
            .with_terminal_id("400235"),
        transport.clone(),
    );
    for err in [
        kuveyt.status(&order).await.unwrap_err(),
        kuveyt.history(&order).await.unwrap_err(),
        kuveyt.refund(&order).await.unwrap_err(),
        kuveyt.pay(&order, &visa_card(), TransactionType::Pay).await.unwrap_err(),
    ] {
        assert!(matches!(err, GatewayError::UnsupportedOperation { bank: Bank::Kuveyt, .. }));
    }

    let inter = gateway(
        Account::new(Bank::Inter, "3123", "InterTestApi", "3", "gDg1N", SecurityModel::ThreeDSecure),
        transport.clone(),
    );
    let err = inter.history(&order).await.unwrap_err();
    assert!(matches!(err, GatewayError::UnsupportedOperation { bank: Bank::Inter, .. }));

    let vakif = gateway(
        Account::new(Bank::VakifBank, "000000000111111", "", "3XTgER89as", "", SecurityModel::ThreeDSecure)
            .with_terminal_id("VP999999"),
        transport.clone(),
    );
    assert!(vakif.status(&order).await.unwrap_err().is_configuration());
    let err = vakif
        .complete_three_d_pay(&order, TransactionType::Pay, Payload::new())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::UnsupportedOperation { bank: Bank::VakifBank, .. }));

    let garanti = gateway(
        Account::new(Bank::Garanti, "7000679", "PROVAUT", "123qweASD/", "12345678", SecurityModel::ThreeDSecure)
            .with_terminal_id("30691298"),
        transport.clone(),
    );
    let err = garanti
        .complete_three_d_host(&order, TransactionType::Pay, Payload::new())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::UnsupportedOperation { bank: Bank::Garanti, .. }));

    assert_eq!(transport.calls(), 0);
}

//! Shared fixtures for gateway integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use vpos_gateway::config::GatewayConfig;
use vpos_gateway::error::{GatewayError, GatewayResult};
use vpos_gateway::payments::{Account, HttpResponse, HttpTransport, OutboundRequest, VirtualPos};

pub const API_URL: &str = "https://bank.test/api";
pub const GATEWAY_3D_URL: &str = "https://bank.test/3d";

/// Replays canned replies in order and records every request it was given
#[derive(Default)]
pub struct RecordingTransport {
    replies: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<OutboundRequest>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn replying(body: &str) -> Arc<Self> {
        let transport = Self::default();
        transport.push_reply(body);
        Arc::new(transport)
    }

    pub fn push_reply(&self, body: &str) {
        self.replies.lock().unwrap().push_back(HttpResponse {
            status: 200,
            body: body.as_bytes().to_vec(),
        });
    }

    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpTransport for RecordingTransport {
    async fn post(&self, request: OutboundRequest) -> GatewayResult<HttpResponse> {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| GatewayError::transport("no canned reply left"))
    }
}

pub fn gateway(account: Account, transport: Arc<RecordingTransport>) -> VirtualPos {
    let config = GatewayConfig::new(API_URL, GATEWAY_3D_URL).with_test_mode(true);
    VirtualPos::new(account, config, transport)
}

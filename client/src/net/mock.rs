//! Scripted transports for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::{mpsc, oneshot};

use super::transport::{ApiRequest, ApiResponse, Transport};
use crate::error::NetworkError;

pub(crate) fn ok_json(value: serde_json::Value) -> ApiResponse {
    ApiResponse { status: 200, body: value.to_string() }
}

pub(crate) fn status(status: u16, error: &str) -> ApiResponse {
    ApiResponse { status, body: serde_json::json!({ "error": error }).to_string() }
}

/// Replies with canned responses in order and records every request it sees.
#[derive(Default)]
pub(crate) struct RecordingTransport {
    replies: Mutex<VecDeque<Result<ApiResponse, NetworkError>>>,
    seen: Mutex<Vec<ApiRequest>>,
}

impl RecordingTransport {
    pub(crate) fn with_replies(replies: Vec<Result<ApiResponse, NetworkError>>) -> Self {
        Self { replies: Mutex::new(replies.into()), seen: Mutex::new(Vec::new()) }
    }

    pub(crate) fn seen(&self) -> Vec<ApiRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, NetworkError> {
        self.seen.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(NetworkError::Request("no scripted reply".to_owned())))
    }
}

/// Hands each request to the test, which decides when (and with what) it completes.
pub(crate) struct GatedTransport {
    tx: mpsc::UnboundedSender<(ApiRequest, oneshot::Sender<Result<ApiResponse, NetworkError>>)>,
}

pub(crate) type Pending = (ApiRequest, oneshot::Sender<Result<ApiResponse, NetworkError>>);

impl GatedTransport {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<Pending>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait::async_trait]
impl Transport for GatedTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, NetworkError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send((request, reply_tx))
            .map_err(|_| NetworkError::Request("test dropped the gate".to_owned()))?;
        reply_rx
            .await
            .map_err(|_| NetworkError::Request("test dropped the reply".to_owned()))?
    }
}

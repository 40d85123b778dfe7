//! Scripted transport for engine tests

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use super::protocol::{SyncRequest, SyncResponse};
use super::transport::{SyncTransport, TransportError};

/// Replays queued responses and records every request it receives.
///
/// Once the script runs out it accepts everything with an increasing watermark.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<SyncResponse, TransportError>>>,
    requests: Mutex<Vec<SyncRequest>>,
    delay: Option<Duration>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every exchange for `delay` before answering
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn push(&self, response: SyncResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    pub fn push_error(&self, error: TransportError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<SyncRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl SyncTransport for ScriptedTransport {
    async fn exchange(&self, request: &SyncRequest) -> Result<SyncResponse, TransportError> {
        let count = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len()
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.responses.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            let watermark = i64::try_from(count).unwrap_or(i64::MAX) * 1_000;
            Ok(SyncResponse::accepted(watermark))
        })
    }
}

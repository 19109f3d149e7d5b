use crate::engine::plugin::{FrameStatus, Plugin, RawRequest, ResultCode};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::cmp::Ordering;

/// Sends a random alphanumeric string and expects it back verbatim.
#[derive(Debug, Clone)]
pub struct EchoPlugin {
    payload_len: usize,
}

impl EchoPlugin {
    pub fn new(payload_len: usize) -> Self {
        Self {
            payload_len: payload_len.max(1),
        }
    }
}

impl Plugin for EchoPlugin {
    fn gen_request(&mut self, id: i64) -> RawRequest {
        let payload: Vec<u8> = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(self.payload_len)
            .collect();
        RawRequest::new(id, payload)
    }

    fn check_full(&self, request: &RawRequest, response: &[u8]) -> FrameStatus {
        match response.len().cmp(&request.payload.len()) {
            Ordering::Equal => FrameStatus::Complete,
            Ordering::Less => FrameStatus::NeedMore,
            Ordering::Greater => FrameStatus::Malformed,
        }
    }

    fn check_response(&mut self, request: &RawRequest, response: &[u8]) -> (ResultCode, String) {
        if request.payload == response {
            (
                ResultCode::Success,
                format!("Success.({})", String::from_utf8_lossy(response)),
            )
        } else {
            (
                ResultCode::ResponseError,
                format!(
                    "Incorrectly formatted Resp: {}",
                    String::from_utf8_lossy(response)
                ),
            )
        }
    }
}

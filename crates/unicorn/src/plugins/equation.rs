//! Newline-delimited JSON arithmetic protocol.
//!
//! ```text
//! -> {"id":7,"operands":[12,30],"operator":"+"}\n
//! <- {"id":7,"formula":"12 + 30 = 42","result":42,"err":null}\n
//! ```

use crate::engine::plugin::{FrameStatus, Plugin, RawRequest, ResultCode};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DELIM: u8 = b'\n';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = "*")]
    Mul,
    #[serde(rename = "/")]
    Div,
}

impl Operator {
    const ALL: [Operator; 4] = [Operator::Add, Operator::Sub, Operator::Mul, Operator::Div];

    fn apply(self, lhs: i64, rhs: i64) -> Option<i64> {
        match self {
            Operator::Add => lhs.checked_add(rhs),
            Operator::Sub => lhs.checked_sub(rhs),
            Operator::Mul => lhs.checked_mul(rhs),
            Operator::Div => lhs.checked_div(rhs),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquationRequest {
    pub id: i64,
    pub operands: Vec<i64>,
    pub operator: Operator,
}

impl EquationRequest {
    /// Two operands in `1..=1000` and a random operator.
    pub fn random(id: i64) -> Self {
        let mut rng = rand::thread_rng();
        Self {
            id,
            operands: vec![rng.gen_range(1..=1000), rng.gen_range(1..=1000)],
            operator: Operator::ALL[rng.gen_range(0..Operator::ALL.len())],
        }
    }

    /// Fold the operands left to right.
    pub fn evaluate(&self) -> Result<i64, String> {
        let (first, rest) = self
            .operands
            .split_first()
            .ok_or_else(|| "no operands".to_string())?;
        rest.iter().try_fold(*first, |acc, &v| {
            self.operator
                .apply(acc, v)
                .ok_or_else(|| format!("cannot evaluate {} {} {}", acc, self.operator, v))
        })
    }

    /// `a op b = r` when `equal`, `a op b != r` otherwise.
    pub fn formula(&self, result: i64, equal: bool) -> String {
        let sep = format!(" {} ", self.operator);
        let lhs = self
            .operands
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(sep.as_str());
        let rel = if equal { "=" } else { "!=" };
        format!("{} {} {}", lhs, rel, result)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquationResponse {
    pub id: i64,
    #[serde(default)]
    pub formula: String,
    #[serde(default)]
    pub result: i64,
    #[serde(default)]
    pub err: Option<String>,
}

impl EquationResponse {
    pub fn answer(request: &EquationRequest) -> Self {
        match request.evaluate() {
            Ok(result) => Self {
                id: request.id,
                formula: request.formula(result, true),
                result,
                err: None,
            },
            Err(e) => Self {
                id: request.id,
                formula: String::new(),
                result: 0,
                err: Some(e),
            },
        }
    }
}

/// Serialize a message and terminate it with [`DELIM`].
pub fn encode<T: Serialize>(message: &T) -> serde_json::Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec(message)?;
    bytes.push(DELIM);
    Ok(bytes)
}

/// Server side of the protocol: answer one request line.
pub fn answer_line(line: &[u8]) -> serde_json::Result<Vec<u8>> {
    let response = match serde_json::from_slice::<EquationRequest>(line) {
        Ok(request) => EquationResponse::answer(&request),
        Err(e) => EquationResponse {
            id: 0,
            formula: String::new(),
            result: 0,
            err: Some(format!("Server: Req Unmarshal Error: {}", e)),
        },
    };
    encode(&response)
}

fn strip_delim(frame: &[u8]) -> &[u8] {
    frame.strip_suffix(&[DELIM]).unwrap_or(frame)
}

/// Client for the equation server.
#[derive(Debug, Clone, Default)]
pub struct EquationPlugin;

impl EquationPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl Plugin for EquationPlugin {
    fn gen_request(&mut self, id: i64) -> RawRequest {
        // Integers and a unit enum always serialize.
        let payload = encode(&EquationRequest::random(id)).expect("equation request encodes");
        RawRequest::new(id, payload)
    }

    fn check_full(&self, request: &RawRequest, response: &[u8]) -> FrameStatus {
        if response.last() != Some(&DELIM) {
            return FrameStatus::NeedMore;
        }
        match serde_json::from_slice::<EquationResponse>(strip_delim(response)) {
            Ok(resp) if resp.id != request.id => FrameStatus::Malformed,
            Ok(_) => FrameStatus::Complete,
            Err(_) => FrameStatus::NeedMore,
        }
    }

    fn check_response(&mut self, request: &RawRequest, response: &[u8]) -> (ResultCode, String) {
        let sreq: EquationRequest = match serde_json::from_slice(strip_delim(&request.payload)) {
            Ok(r) => r,
            Err(_) => {
                return (
                    ResultCode::FatalCall,
                    format!(
                        "Incorrectly formatted Req: {}",
                        String::from_utf8_lossy(&request.payload)
                    ),
                )
            }
        };
        let sresp: EquationResponse = match serde_json::from_slice(strip_delim(response)) {
            Ok(r) => r,
            Err(_) => {
                return (
                    ResultCode::ResponseError,
                    format!(
                        "Incorrectly formatted Resp: {}",
                        String::from_utf8_lossy(response)
                    ),
                )
            }
        };

        if sresp.id != sreq.id {
            return (
                ResultCode::ResponseError,
                format!("Inconsistent raw id! ({} != {})", sresp.id, sreq.id),
            );
        }
        if let Some(err) = sresp.err {
            return (ResultCode::CalleeError, format!("Abnormal server: {}", err));
        }
        match sreq.evaluate() {
            Ok(expected) if expected == sresp.result => (
                ResultCode::Success,
                format!("Success.({})", sresp.formula),
            ),
            _ => (
                ResultCode::ResponseError,
                format!("Incorrect result: {}", sreq.formula(sresp.result, false)),
            ),
        }
    }
}

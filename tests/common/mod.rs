//! Shared fixtures: an in-process accrual service mock and Luhn helpers.

#![allow(dead_code)]

use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

/// Scripted reply for one order number
#[derive(Debug, Clone)]
pub enum MockReply {
    /// 200 with the given JSON body
    Json(String),
    /// 204
    NoContent,
    /// 429, optionally with a `Retry-After` value
    TooMany(Option<&'static str>),
    /// Any other status with an empty body
    Status(u16),
    /// Wait, then answer
    Delayed(Duration, Box<MockReply>),
}

impl MockReply {
    pub fn processed(number: &str, accrual: &str) -> Self {
        MockReply::Json(format!(
            r#"{{"order":"{}","status":"PROCESSED","accrual":{}}}"#,
            number, accrual
        ))
    }

    pub fn status(number: &str, status: &str) -> Self {
        MockReply::Json(format!(r#"{{"order":"{}","status":"{}"}}"#, number, status))
    }
}

#[derive(Default)]
struct MockState {
    replies: Mutex<HashMap<String, MockReply>>,
    /// (order number, Content-Type) per request, in arrival order
    requests: Mutex<Vec<(String, Option<String>)>>,
}

/// Accrual service stand-in listening on an ephemeral port
pub struct MockAccrual {
    addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockAccrual {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        let app = Router::new()
            .route("/api/orders/{number}", get(reply))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn script(&self, number: &str, reply: MockReply) {
        self.state
            .replies
            .lock()
            .unwrap()
            .insert(number.to_string(), reply);
    }

    pub fn requests(&self) -> Vec<(String, Option<String>)> {
        self.state.requests.lock().unwrap().clone()
    }
}

async fn reply(
    State(state): State<Arc<MockState>>,
    Path(number): Path<String>,
    headers: HeaderMap,
) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state
        .requests
        .lock()
        .unwrap()
        .push((number.clone(), content_type));

    let scripted = state.replies.lock().unwrap().get(&number).cloned();
    render(scripted.unwrap_or(MockReply::NoContent)).await
}

async fn render(mut reply: MockReply) -> Response {
    let reply = loop {
        match reply {
            MockReply::Delayed(delay, inner) => {
                tokio::time::sleep(delay).await;
                reply = *inner;
            }
            other => break other,
        }
    };

    match reply {
        MockReply::Json(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        MockReply::NoContent => StatusCode::NO_CONTENT.into_response(),
        MockReply::TooMany(Some(after)) => (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, after)],
            "No more than N requests per minute allowed",
        )
            .into_response(),
        MockReply::TooMany(None) => StatusCode::TOO_MANY_REQUESTS.into_response(),
        MockReply::Status(code) => StatusCode::from_u16(code).unwrap().into_response(),
        MockReply::Delayed(..) => unreachable!(),
    }
}

/// Append the Luhn check digit to `payload`.
pub fn with_check_digit(payload: u64) -> String {
    let digits = payload.to_string();
    let sum: u32 = digits
        .bytes()
        .rev()
        .enumerate()
        .map(|(i, b)| {
            let d = u32::from(b - b'0');
            // Positions that get doubled once the check digit is appended
            if i % 2 == 0 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();
    let check = (10 - sum % 10) % 10;
    format!("{}{}", digits, check)
}

#[test]
fn test_with_check_digit_matches_known_numbers() {
    assert_eq!(with_check_digit(7992739871), "79927398713");
    assert_eq!(with_check_digit(456126121234546), "4561261212345467");
}

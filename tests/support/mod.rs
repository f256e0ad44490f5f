#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use authflow::{Executor, Request, Response, SendKind, SendPayload, TransportError};
use http::{HeaderName, HeaderValue, StatusCode};

/// Executor answering from a script of canned responses, recording every request it is sent.
///
/// Once the script is exhausted every request gets a `200 OK`.
#[derive(Default)]
pub struct ScriptedExecutor {
    script: Mutex<VecDeque<Result<Response, String>>>,
    sent: Mutex<Vec<(SendKind, Request)>>,
}

impl ScriptedExecutor {
    pub fn new(responses: impl IntoIterator<Item = Response>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().map(Ok).collect()),
            sent: Mutex::default(),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::from([Err(message.to_owned())])),
            sent: Mutex::default(),
        }
    }

    pub fn sent(&self) -> Vec<(SendKind, Request)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<SendKind> {
        self.sent().into_iter().map(|(kind, _)| kind).collect()
    }
}

#[async_trait::async_trait]
impl Executor for ScriptedExecutor {
    async fn send(&self, payload: SendPayload) -> Result<Response, TransportError> {
        self.sent
            .lock()
            .unwrap()
            .push((payload.kind, payload.request));
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(TransportError::new(message)),
            None => Ok(Response::new(StatusCode::OK)),
        }
    }
}

pub fn challenge(name: HeaderName, value: &str) -> Response {
    let mut response = Response::new(StatusCode::UNAUTHORIZED);
    response
        .headers
        .append(name, HeaderValue::from_str(value).unwrap());
    response
}

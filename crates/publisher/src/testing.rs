//! Canned transport for exercising the pipeline without the network.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{AutoPostError, Result};
use crate::http::{HttpRequest, HttpResponse, HttpTransport, Method};

enum Canned {
    Respond(HttpResponse),
    Fail(String),
}

/// Answers requests from responses registered per method+URL.
///
/// When several responses are registered for one route they are served in
/// order and the last one repeats. Unregistered routes fail like an
/// unreachable host.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<(Method, String), VecDeque<Canned>>>,
    requests: Mutex<Vec<HttpRequest>>,
    latency: Option<Duration>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every answer, so concurrent callers overlap.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn push(self, method: Method, url: &str, canned: Canned) -> Self {
        self.routes
            .lock()
            .unwrap()
            .entry((method, url.to_string()))
            .or_default()
            .push_back(canned);
        self
    }

    pub fn respond(
        self,
        method: Method,
        url: &str,
        status: u16,
        content_type: Option<&str>,
        body: impl Into<Bytes>,
    ) -> Self {
        let response = HttpResponse {
            status,
            content_type: content_type.map(str::to_string),
            body: body.into(),
        };
        self.push(method, url, Canned::Respond(response))
    }

    pub fn json(self, method: Method, url: &str, status: u16, body: serde_json::Value) -> Self {
        self.respond(
            method,
            url,
            status,
            Some("application/json"),
            body.to_string(),
        )
    }

    pub fn html(self, url: &str, body: &str) -> Self {
        self.respond(Method::Get, url, 200, Some("text/html; charset=utf-8"), body.to_string())
    }

    pub fn fail(self, method: Method, url: &str, message: &str) -> Self {
        self.push(method, url, Canned::Fail(message.to_string()))
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, method: Method, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.url == url)
            .count()
    }
}

impl MockTransport {
    fn answer(&self, key: &(Method, String)) -> Result<HttpResponse> {
        let mut routes = self.routes.lock().unwrap();
        let queue = routes
            .get_mut(key)
            .ok_or_else(|| AutoPostError::Network(format!("connection refused: {}", key.1)))?;

        let canned = if queue.len() > 1 {
            queue.pop_front()
        } else {
            None
        };
        match canned.as_ref().or_else(|| queue.front()) {
            Some(Canned::Respond(response)) => Ok(response.clone()),
            Some(Canned::Fail(message)) => Err(AutoPostError::Network(message.clone())),
            None => Err(AutoPostError::Network(format!("connection refused: {}", key.1))),
        }
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let key = (request.method, request.url.clone());
        self.requests.lock().unwrap().push(request);

        let answer = self.answer(&key);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        answer
    }
}

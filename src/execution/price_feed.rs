use crate::error::StreamError;
use crate::models::{StreamMessage, Tick};
use crate::settings::StreamSettings;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response};
use serde::Deserialize;

/// Source of pricing messages for a single instrument
#[async_trait]
pub trait TickStream: Send {
    /// Open the session. Failures here are protocol errors.
    async fn connect(&mut self) -> Result<(), StreamError>;

    /// Next message in arrival order, or `None` once the peer closed the stream
    async fn next_message(&mut self) -> Result<Option<StreamMessage>, StreamError>;
}

#[async_trait]
impl<S: TickStream + ?Sized> TickStream for Box<S> {
    async fn connect(&mut self) -> Result<(), StreamError> {
        (**self).connect().await
    }

    async fn next_message(&mut self) -> Result<Option<StreamMessage>, StreamError> {
        (**self).next_message().await
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum WireMessage {
    Price {
        instrument: String,
        time: DateTime<Utc>,
        #[serde(rename = "closeoutBid")]
        closeout_bid: WireNumber,
        #[serde(rename = "closeoutAsk")]
        closeout_ask: WireNumber,
    },
    Heartbeat {
        time: DateTime<Utc>,
    },
}

/// Prices arrive as decimal strings; accept bare numbers too
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireNumber {
    Text(String),
    Number(f64),
}

impl WireNumber {
    fn value(&self) -> Result<f64, StreamError> {
        let value = match self {
            WireNumber::Number(v) => *v,
            WireNumber::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|e| StreamError::Transient(format!("bad price {:?}: {}", s, e)))?,
        };
        if !value.is_finite() || value <= 0.0 {
            return Err(StreamError::Transient(format!("non-positive price {}", value)));
        }
        Ok(value)
    }
}

/// Parse one line of the newline-delimited pricing stream
pub fn parse_line(line: &str) -> Result<StreamMessage, StreamError> {
    let message: WireMessage = serde_json::from_str(line)
        .map_err(|e| StreamError::Transient(format!("unparseable stream line: {}", e)))?;

    match message {
        WireMessage::Price {
            instrument,
            time,
            closeout_bid,
            closeout_ask,
        } => Ok(StreamMessage::Tick(Tick {
            instrument,
            timestamp: time,
            closeout_bid: closeout_bid.value()?,
            closeout_ask: closeout_ask.value()?,
        })),
        WireMessage::Heartbeat { time } => Ok(StreamMessage::Heartbeat { timestamp: time }),
    }
}

/// Streaming pricing endpoint read line by line over a long-lived HTTP response
pub struct HttpPricingStream {
    client: Client,
    base_url: String,
    account_id: String,
    access_token: Option<String>,
    instrument: String,
    response: Option<Response>,
    pending: Vec<u8>,
    finished: bool,
}

impl HttpPricingStream {
    pub fn new(settings: &StreamSettings, instrument: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: settings.url.trim_end_matches('/').to_string(),
            account_id: settings.account_id.clone(),
            access_token: settings.access_token.clone(),
            instrument: instrument.to_string(),
            response: None,
            pending: Vec::new(),
            finished: false,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v3/accounts/{}/pricing/stream",
            self.base_url, self.account_id
        )
    }

    /// Pop the next complete line from the buffer
    fn take_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.pending.drain(..=end).collect();
        Some(String::from_utf8_lossy(&line).trim().to_string())
    }
}

#[async_trait]
impl TickStream for HttpPricingStream {
    async fn connect(&mut self) -> Result<(), StreamError> {
        let mut request = self
            .client
            .get(self.endpoint())
            .query(&[("instruments", self.instrument.as_str())]);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StreamError::Protocol(format!("connect failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StreamError::Protocol(format!(
                "pricing stream returned {}: {}",
                status, body
            )));
        }

        tracing::info!(instrument = %self.instrument, "Pricing stream connected");
        self.response = Some(response);
        self.pending.clear();
        self.finished = false;
        Ok(())
    }

    async fn next_message(&mut self) -> Result<Option<StreamMessage>, StreamError> {
        loop {
            while let Some(line) = self.take_line() {
                if !line.is_empty() {
                    return parse_line(&line).map(Some);
                }
            }

            if self.finished {
                // trailing line without a newline
                if self.pending.is_empty() {
                    return Ok(None);
                }
                let rest = std::mem::take(&mut self.pending);
                let line = String::from_utf8_lossy(&rest).trim().to_string();
                if line.is_empty() {
                    return Ok(None);
                }
                return parse_line(&line).map(Some);
            }

            let response = self
                .response
                .as_mut()
                .ok_or_else(|| StreamError::Protocol("stream is not connected".to_string()))?;

            match response.chunk().await {
                Ok(Some(bytes)) => self.pending.extend_from_slice(&bytes),
                Ok(None) => self.finished = true,
                Err(e) => {
                    return Err(StreamError::Protocol(format!("stream read failed: {}", e)));
                }
            }
        }
    }
}

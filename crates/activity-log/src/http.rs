use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::Serialize;

use crate::sink::{Ack, Sink, SinkKind, Submission, WriteError};

/// Path of the location-event collection on the logging server.
pub const LOCATION_EVENT_PATH: &str = "/log/api/location_event/";

/// Request body expected by the logging server.
#[derive(Debug, Serialize)]
struct LocationEvent<'a> {
    visit_date: String,
    tab_index: u32,
    title: &'a str,
    url: &'a str,
    event_type: &'a str,
}

/// Sink that POSTs each record to a remote logging endpoint.
///
/// Only `201 Created` counts as an acknowledgement. Because the request is
/// authenticated, a successful write also proves the credential is valid.
pub struct HttpSink {
    client: reqwest::Client,
    url: String,
}

impl HttpSink {
    /// Build a sink for the server rooted at `endpoint`, e.g.
    /// `https://logs.example.org`.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, WriteError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WriteError::Client(e.to_string()))?;

        Ok(Self {
            client,
            url: format!("{}{}", endpoint.trim_end_matches('/'), LOCATION_EVENT_PATH),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Sink for HttpSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Http
    }

    async fn write(&mut self, submission: &Submission) -> Result<Ack, WriteError> {
        let record = &submission.record;
        let body = LocationEvent {
            visit_date: record.timestamp_iso(),
            tab_index: record.tab_index(),
            title: record.tab_title(),
            url: record.tab_url(),
            event_type: record.event_type(),
        };

        let response = self
            .client
            .post(&self.url)
            .header(AUTHORIZATION, submission.credential.authorization())
            .json(&body)
            .send()
            .await
            .map_err(|e| WriteError::Unreachable(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::CREATED {
            return Err(WriteError::Rejected {
                status: status.as_u16(),
            });
        }

        Ok(Ack {
            sink: SinkKind::Http,
            status: Some(status.as_u16()),
        })
    }
}

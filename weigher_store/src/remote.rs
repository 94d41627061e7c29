//! HTTP sink: forwards accepted readings to a central weighbridge API.
//!
//! Wire format is fixed by the receiving server:
//! `POST {url}` with `{"poids", "company", "desktop"}`, success iff 200;
//! `GET {url}?desktop=..&company=..` answers the newest row
//! `{"id", "valeur", "desktop", "company", "date"}` or 404.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::Serialize;
use serde_json::Value;
use weigher_traits::{BoxError, LatestRecord, WeightSink};

use crate::error::{Result, StoreError};

#[derive(Serialize)]
struct PostBody<'a> {
    poids: i32,
    company: &'a str,
    desktop: &'a str,
}

/// Longest response body echoed into an error.
const BODY_EXCERPT: usize = 200;

pub struct RemoteApiSink {
    client: Client,
    url: String,
}

impl RemoteApiSink {
    /// Build a blocking client with `timeout` applied to every request.
    ///
    /// Must not be called from inside an async runtime.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn post(&self, weight: i32, source_id: &str, group_id: &str) -> Result<()> {
        let resp = self
            .client
            .post(&self.url)
            .json(&PostBody {
                poids: weight,
                company: group_id,
                desktop: source_id,
            })
            .send()?;
        let status = resp.status();
        if status != StatusCode::OK {
            return Err(status_error(status, resp));
        }
        tracing::debug!(weight, url = %self.url, "remote api accepted reading");
        Ok(())
    }

    /// Newest row for the station, as the server reports it.
    pub fn fetch_row(&self, source_id: &str, group_id: &str) -> Result<Option<Value>> {
        let resp = self
            .client
            .get(&self.url)
            .query(&[("desktop", source_id), ("company", group_id)])
            .send()?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status != StatusCode::OK {
            return Err(status_error(status, resp));
        }
        Ok(Some(resp.json()?))
    }

    pub fn fetch_latest(&self, source_id: &str, group_id: &str) -> Result<Option<f64>> {
        self.fetch_row(source_id, group_id)?
            .map(|row| valeur(&row))
            .transpose()
    }

    pub fn fetch_latest_record(
        &self,
        source_id: &str,
        group_id: &str,
    ) -> Result<Option<LatestRecord>> {
        let Some(row) = self.fetch_row(source_id, group_id)? else {
            return Ok(None);
        };
        let text = |key: &str, fallback: &str| {
            row.get(key)
                .and_then(Value::as_str)
                .unwrap_or(fallback)
                .to_owned()
        };
        Ok(Some(LatestRecord {
            id: row.get("id").and_then(Value::as_u64),
            weight: valeur(&row)?,
            source_id: text("desktop", source_id),
            group_id: text("company", group_id),
            recorded_at: row.get("date").and_then(Value::as_str).map(str::to_owned),
        }))
    }
}

// numbers may arrive as strings
fn valeur(row: &Value) -> Result<f64> {
    match row.get("valeur") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or(StoreError::MissingField("valeur"))
}

fn status_error(status: StatusCode, resp: reqwest::blocking::Response) -> StoreError {
    let mut body = resp.text().unwrap_or_default();
    if body.len() > BODY_EXCERPT {
        let mut cut = BODY_EXCERPT;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    StoreError::Status {
        status: status.as_u16(),
        body,
    }
}

impl WeightSink for RemoteApiSink {
    fn record(&self, weight: i32, source_id: &str, group_id: &str) -> std::result::Result<(), BoxError> {
        self.post(weight, source_id, group_id)?;
        Ok(())
    }

    fn latest(&self, source_id: &str, group_id: &str) -> std::result::Result<Option<f64>, BoxError> {
        Ok(self.fetch_latest(source_id, group_id)?)
    }

    fn latest_record(
        &self,
        source_id: &str,
        group_id: &str,
    ) -> std::result::Result<Option<LatestRecord>, BoxError> {
        Ok(self.fetch_latest_record(source_id, group_id)?)
    }
}

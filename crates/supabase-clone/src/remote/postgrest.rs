//! PostgREST (Supabase REST) store over HTTP.

use super::{value_literal, Predicate, RemoteStore, Row};
use crate::config::StoreConfig;
use crate::error::{CloneError, RemoteError, Result};
use crate::schema::CatalogColumn;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_RANGE};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

/// Catalog function queried for column metadata.
const CATALOG_FUNCTION: &str = "get_table_definition";

/// Profile serving the `columns` catalog view.
const INFORMATION_SCHEMA: &str = "information_schema";

/// Fields read from `information_schema.columns`.
const COLUMN_FIELDS: &str = "column_name,data_type,udt_name,numeric_precision,numeric_scale";

/// Error body returned by PostgREST.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
    details: Option<Value>,
    hint: Option<Value>,
}

/// PostgREST store implementation.
pub struct PostgrestStore {
    name: String,
    base_url: Url,
    schema: String,
    client: Client,
}

impl PostgrestStore {
    /// Create a store for the endpoint in `config`.
    ///
    /// No request is made; connectivity problems surface on first use.
    pub fn new(name: impl Into<String>, config: &StoreConfig) -> Result<Self> {
        let base_url = Url::parse(config.url.trim_end_matches('/'))
            .map_err(|e| CloneError::Config(format!("invalid url '{}': {}", config.url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(CloneError::Config(format!(
                "url '{}' cannot be used as a base url",
                config.url
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert("apikey", header_value(&config.key)?);
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", config.key))?);
        headers.insert("accept-profile", header_value(&config.schema)?);
        headers.insert("content-profile", header_value(&config.schema)?);

        let client = Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()?;

        Ok(Self {
            name: name.into(),
            base_url,
            schema: config.schema.clone(),
            client,
        })
    }

    /// URL for `/rest/v1/<segments...>` with each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CloneError::Config(format!("bad base url {}", self.base_url)))?
            .pop_if_empty()
            .extend(["rest", "v1"])
            .extend(segments);
        Ok(url)
    }

    /// Send a request, turning transport failures and non-2xx responses into
    /// classified remote errors.
    async fn send(&self, entity: &str, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.map_err(|e| {
            CloneError::from(RemoteError::transient(format!(
                "{} request for {} failed: {}",
                self.name, entity, e
            )))
        })?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_from_response(response).await.into())
        }
    }
}

#[async_trait]
impl RemoteStore for PostgrestStore {
    async fn count(&self, entity: &str, filter: Option<&Predicate>) -> Result<Option<u64>> {
        let mut request = self
            .client
            .head(self.endpoint(&[entity])?)
            .query(&[("select", "*")])
            .header("Prefer", "count=exact");
        if let Some(predicate) = filter {
            request = request.query(&[filter_param(predicate)]);
        }

        let response = self.send(entity, request).await?;
        let total = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total);
        debug!("{}: count for {} = {:?}", self.name, entity, total);
        Ok(total)
    }

    async fn select_page(&self, entity: &str, offset: u64, limit: u64) -> Result<Vec<Row>> {
        let request = self.client.get(self.endpoint(&[entity])?).query(&[
            ("select", "*".to_string()),
            ("offset", offset.to_string()),
            ("limit", limit.to_string()),
        ]);
        let response = self.send(entity, request).await?;
        let rows = response.json::<Vec<Row>>().await.map_err(|e| {
            CloneError::from(RemoteError::transient(format!(
                "{}: malformed page from {}: {}",
                self.name, entity, e
            )))
        })?;
        Ok(rows)
    }

    async fn insert(&self, entity: &str, rows: &[Row]) -> Result<()> {
        let request = self
            .client
            .post(self.endpoint(&[entity])?)
            .header("Prefer", "return=minimal")
            .json(rows);
        self.send(entity, request).await?;
        Ok(())
    }

    async fn upsert(&self, entity: &str, rows: &[Row], conflict_column: &str) -> Result<()> {
        let request = self
            .client
            .post(self.endpoint(&[entity])?)
            .query(&[("on_conflict", conflict_column)])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(rows);
        self.send(entity, request).await?;
        Ok(())
    }

    async fn delete(&self, entity: &str, predicate: &Predicate) -> Result<()> {
        let request = self
            .client
            .delete(self.endpoint(&[entity])?)
            .query(&[filter_param(predicate)])
            .header("Prefer", "return=minimal");
        self.send(entity, request).await?;
        Ok(())
    }

    async fn exists(&self, entity: &str) -> Result<bool> {
        let request = self
            .client
            .get(self.endpoint(&[entity])?)
            .query(&[("select", "*"), ("limit", "1")]);
        match self.send(entity, request).await {
            Ok(_) => Ok(true),
            Err(e) if e.remote().is_some_and(RemoteError::is_not_found) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn catalog_columns(&self, entity: &str) -> Result<Vec<CatalogColumn>> {
        let request = self
            .client
            .post(self.endpoint(&["rpc", CATALOG_FUNCTION])?)
            .json(&json!({ "table_name": entity }));
        let response = self.send(entity, request).await?;
        Ok(response.json::<Vec<CatalogColumn>>().await?)
    }

    async fn information_schema_columns(&self, entity: &str) -> Result<Vec<CatalogColumn>> {
        let request = self
            .client
            .get(self.endpoint(&["columns"])?)
            .header("accept-profile", INFORMATION_SCHEMA)
            .query(&[
                ("select", COLUMN_FIELDS.to_string()),
                ("table_schema", format!("eq.{}", self.schema)),
                ("table_name", format!("eq.{}", entity)),
                ("order", "ordinal_position".to_string()),
            ]);
        let response = self.send(entity, request).await?;
        Ok(response.json::<Vec<CatalogColumn>>().await?)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| CloneError::Config(format!("invalid header value: {}", e)))
}

/// `column=op.value` query pair for a predicate.
fn filter_param(predicate: &Predicate) -> (String, String) {
    (
        predicate.column().to_string(),
        format!("{}.{}", predicate.operator(), value_literal(predicate.value())),
    )
}

/// Total from a `Content-Range` header such as `0-49/1234` or `*/0`.
///
/// Returns `None` when the total is unknown (`0-49/*`).
fn parse_content_range_total(header: &str) -> Option<u64> {
    let (_, total) = header.rsplit_once('/')?;
    total.trim().parse().ok()
}

async fn error_from_response(response: Response) -> RemoteError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(parsed) => {
            let message = parsed
                .message
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            let mut err = RemoteError::new(message)
                .with_status(status.as_u16())
                .with_details(
                    parsed.details.as_ref().and_then(text_field),
                    parsed.hint.as_ref().and_then(text_field),
                );
            if let Some(code) = parsed.code {
                err = err.with_code(code);
            }
            err
        }
        Err(_) => {
            let message = if body.trim().is_empty() {
                format!("HTTP {}", status)
            } else {
                format!("HTTP {}: {}", status, body.trim())
            };
            RemoteError::new(message).with_status(status.as_u16())
        }
    }
}

fn text_field(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

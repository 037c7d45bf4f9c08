//! HTTP client for the hosted backend: relational table endpoints, remote
//! procedure calls, and the auth endpoints (see `auth`).
//!
//! The backend speaks a PostgREST-style dialect: filters in the query string
//! (`estado=eq.Pendiente`), embedded relations in `select`, and
//! `Prefer: return=representation` to get inserted rows back.

pub mod auth;

use std::sync::RwLock;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::errors::ServiceError;

/// Postgres unique-constraint violation, surfaced by the backend when a
/// duplicate external reference is inserted.
const UNIQUE_VIOLATION: &str = "23505";

/// Error payload shape returned by the table/RPC endpoints.
#[derive(Debug, Deserialize)]
struct BackendErrorBody {
    code: Option<String>,
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

pub struct BackendClient {
    http: reqwest::Client,
    base_url: Url,
    anon_key: String,
    admin_key: Option<String>,
    bearer: RwLock<Option<String>>,
}

impl BackendClient {
    /// Builds a client for the backend at `base_url`. The administrative key
    /// is only needed for user provisioning and password resets.
    pub fn new(
        base_url: &str,
        anon_key: impl Into<String>,
        admin_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let mut base = Url::parse(base_url)
            .map_err(|e| ServiceError::Config(format!("invalid backend URL: {}", e)))?;
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ServiceError::Network)?;

        Ok(Self {
            http,
            base_url: base,
            anon_key: anon_key.into(),
            admin_key,
            bearer: RwLock::new(None),
        })
    }

    /// Replaces the session access token sent as the bearer credential.
    pub fn set_bearer(&self, token: Option<String>) {
        let mut guard = self
            .bearer
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = token;
    }

    pub fn bearer_token(&self) -> Option<String> {
        self.bearer
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn has_admin_key(&self) -> bool {
        self.admin_key.is_some()
    }

    pub(crate) fn admin_key(&self) -> Result<&str, ServiceError> {
        self.admin_key.as_deref().ok_or_else(|| {
            ServiceError::Config("administrative key is not configured".to_string())
        })
    }

    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, ServiceError> {
        self.base_url
            .join(path)
            .map_err(|e| ServiceError::Config(format!("invalid endpoint path {}: {}", path, e)))
    }

    /// Standard headers for table/RPC calls: the public key plus the session
    /// bearer when one is set (the anonymous key otherwise).
    pub(crate) fn rest_headers(&self) -> Result<HeaderMap, ServiceError> {
        let mut headers = HeaderMap::new();
        headers.insert("apikey", header_value(&self.anon_key)?);
        let bearer = self.bearer_token().unwrap_or_else(|| self.anon_key.clone());
        headers.insert(
            reqwest::header::AUTHORIZATION,
            header_value(&format!("Bearer {}", bearer))?,
        );
        Ok(headers)
    }

    pub(crate) fn request(
        &self,
        method: Method,
        path: &str,
    ) -> Result<RequestBuilder, ServiceError> {
        let url = self.endpoint(path)?;
        Ok(self.http.request(method, url).headers(self.rest_headers()?))
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn anon_key(&self) -> &str {
        &self.anon_key
    }

    /// Starts a query against a table endpoint.
    pub fn table(&self, name: &str) -> TableQuery<'_> {
        TableQuery {
            client: self,
            table: name.to_string(),
            params: Vec::new(),
        }
    }

    /// Invokes a remote procedure and deserializes its JSON result.
    pub async fn rpc<A, R>(&self, function: &str, args: &A) -> Result<R, ServiceError>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        debug!(function, "invoking remote procedure");
        let response = self
            .request(Method::POST, &format!("rest/v1/rpc/{}", function))?
            .json(args)
            .send()
            .await?;
        let response = check(response).await?;
        // Void procedures answer with an empty body.
        let text = response.text().await?;
        let payload = if text.is_empty() { "null" } else { &text };
        Ok(serde_json::from_str::<R>(payload)?)
    }
}

fn header_value(value: &str) -> Result<HeaderValue, ServiceError> {
    HeaderValue::from_str(value)
        .map_err(|e| ServiceError::Config(format!("invalid header value: {}", e)))
}

/// Converts a non-success response into the matching `ServiceError`,
/// pattern-matching unique violations out of the generic backend error.
pub(crate) async fn check(response: Response) -> Result<Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let body: Option<BackendErrorBody> = serde_json::from_str(&text).ok();
    let (code, message) = match body {
        Some(body) => {
            let mut message = body.message.unwrap_or_else(|| text.clone());
            if let Some(details) = body.details {
                message = format!("{} ({})", message, details);
            }
            (body.code, message)
        }
        None => (None, text),
    };

    if code.as_deref() == Some(UNIQUE_VIOLATION) {
        return Err(ServiceError::DuplicateReference(message));
    }

    Err(match status {
        StatusCode::UNAUTHORIZED => ServiceError::Unauthorized(message),
        StatusCode::FORBIDDEN => ServiceError::Forbidden(message),
        StatusCode::NOT_FOUND => ServiceError::NotFound(message),
        _ => ServiceError::backend(status.as_u16(), message),
    })
}

/// Builder for a single table request. Filters accumulate in the query
/// string; the terminal method picks the HTTP verb.
pub struct TableQuery<'a> {
    client: &'a BackendClient,
    table: String,
    params: Vec<(String, String)>,
}

impl<'a> TableQuery<'a> {
    pub fn select(mut self, columns: &str) -> Self {
        self.params.push(("select".into(), columns.into()));
        self
    }

    fn filter(mut self, column: &str, op: &str, value: impl ToString) -> Self {
        self.params
            .push((column.into(), format!("{}.{}", op, value.to_string())));
        self
    }

    pub fn eq(self, column: &str, value: impl ToString) -> Self {
        self.filter(column, "eq", value)
    }

    pub fn gt(self, column: &str, value: impl ToString) -> Self {
        self.filter(column, "gt", value)
    }

    pub fn gte(self, column: &str, value: impl ToString) -> Self {
        self.filter(column, "gte", value)
    }

    pub fn lte(self, column: &str, value: impl ToString) -> Self {
        self.filter(column, "lte", value)
    }

    pub fn is_in<T: ToString>(mut self, column: &str, values: &[T]) -> Self {
        let list = values
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        self.params.push((column.into(), format!("in.({})", list)));
        self
    }

    pub fn not_null(mut self, column: &str) -> Self {
        self.params.push((column.into(), "not.is.null".into()));
        self
    }

    /// Ordering in PostgREST syntax, e.g. `"fecha.desc,created_at.desc"`.
    pub fn order(mut self, spec: &str) -> Self {
        self.params.push(("order".into(), spec.into()));
        self
    }

    pub fn limit(mut self, count: u32) -> Self {
        self.params.push(("limit".into(), count.to_string()));
        self
    }

    fn builder(&self, method: Method) -> Result<RequestBuilder, ServiceError> {
        let path = format!("rest/v1/{}", self.table);
        Ok(self.client.request(method, &path)?.query(&self.params))
    }

    pub async fn fetch<T: DeserializeOwned>(self) -> Result<Vec<T>, ServiceError> {
        debug!(table = %self.table, "fetching rows");
        let response = self.builder(Method::GET)?.send().await?;
        let response = check(response).await?;
        Ok(response.json::<Vec<T>>().await?)
    }

    pub async fn fetch_optional<T: DeserializeOwned>(self) -> Result<Option<T>, ServiceError> {
        let table = self.table.clone();
        let mut rows = self.limit(1).fetch::<T>().await?;
        debug!(table = %table, found = !rows.is_empty(), "fetched optional row");
        Ok(rows.pop())
    }

    pub async fn fetch_one<T: DeserializeOwned>(self) -> Result<T, ServiceError> {
        let table = self.table.clone();
        self.fetch_optional::<T>()
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("no matching row in {}", table)))
    }

    /// Inserts one or more rows and returns the stored representation.
    pub async fn insert<B, R>(self, rows: &B) -> Result<Vec<R>, ServiceError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        debug!(table = %self.table, "inserting rows");
        let response = self
            .builder(Method::POST)?
            .header("Prefer", "return=representation")
            .json(rows)
            .send()
            .await?;
        let response = check(response).await?;
        Ok(response.json::<Vec<R>>().await?)
    }

    pub async fn insert_one<B, R>(self, row: &B) -> Result<R, ServiceError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let table = self.table.clone();
        let mut rows = self.insert::<B, R>(row).await?;
        rows.pop().ok_or_else(|| {
            ServiceError::backend(500, format!("insert into {} returned no row", table))
        })
    }

    /// Applies a partial update to every row matching the filters.
    pub async fn update<B>(self, patch: &B) -> Result<(), ServiceError>
    where
        B: Serialize + ?Sized,
    {
        debug!(table = %self.table, "updating rows");
        let response = self
            .builder(Method::PATCH)?
            .header("Prefer", "return=minimal")
            .json(patch)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    pub async fn delete(self) -> Result<(), ServiceError> {
        debug!(table = %self.table, "deleting rows");
        let response = self.builder(Method::DELETE)?.send().await?;
        check(response).await?;
        Ok(())
    }
}

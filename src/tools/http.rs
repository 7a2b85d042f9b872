// SPDX-License-Identifier: MIT

//! Generic HTTP action (`http.request`)

use crate::integration::error::CallFailure;
use crate::tools::Tool;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::{Client, Method};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::error::Error;
use url::Url;

static HTTP_REQUEST_SCHEMA: Lazy<Value> =
    Lazy::new(|| serde_json::to_value(schemars::schema_for!(HttpRequestArgs)).unwrap_or_default());

/// Input of `http.request`
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct HttpRequestArgs {
    /// Absolute http(s) URL
    pub url: String,
    /// HTTP method, GET when omitted
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub query: Option<HashMap<String, String>>,
    /// JSON request body
    #[serde(default)]
    pub body: Option<Value>,
}

pub struct HttpRequestTool {
    client: Client,
}

impl HttpRequestTool {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn prepare(args: &HttpRequestArgs) -> Result<(Method, Url), Box<dyn Error + Send + Sync>> {
        let url = Url::parse(&args.url).map_err(|e| format!("Invalid url '{}': {}", args.url, e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!("Unsupported url scheme '{}'", url.scheme()).into());
        }
        let method = args.method.as_deref().unwrap_or("GET").to_uppercase();
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|_| format!("Invalid HTTP method '{}'", method))?;
        Ok((method, url))
    }
}

impl Default for HttpRequestTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for HttpRequestTool {
    fn name(&self) -> &str {
        "http.request"
    }

    fn description(&self) -> &str {
        "Sends an HTTP request and returns the status, headers and body (parsed as JSON when possible)."
    }

    fn schema(&self) -> &Value {
        &HTTP_REQUEST_SCHEMA
    }

    async fn execute(&self, input: Value) -> Result<Value, Box<dyn Error + Send + Sync>> {
        let args: HttpRequestArgs = serde_json::from_value(input)?;
        let (method, url) = Self::prepare(&args)?;

        log::debug!("http.request {} {}", method, url);

        let mut req = self
            .client
            .request(method, url)
            .header("Accept", "application/json");

        if let Some(headers) = &args.headers {
            for (name, value) in headers {
                req = req.header(name.as_str(), value.as_str());
            }
        }
        if let Some(query) = &args.query {
            req = req.query(query);
        }
        if let Some(body) = &args.body {
            req = req.json(body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let headers: HashMap<String, String> = resp
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_lowercase(), v.to_string()))
            })
            .collect();
        let text = resp.text().await?;

        if !status.is_success() {
            let mut failure = CallFailure::new(format!("HTTP request failed: {}", text))
                .with_status(status.as_u16());
            failure.headers = headers;
            return Err(Box::new(failure));
        }

        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
        Ok(json!({
            "status": status.as_u16(),
            "headers": headers,
            "body": body,
        }))
    }
}

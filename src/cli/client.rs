use anyhow::{anyhow, Context};
use reqwest::{Client, Method, Response};
use serde_json::Value;
use url::Url;

/// Thin HTTP client for the jobs API. Unwraps the `{"success": true, "data": ...}`
/// envelope and turns error bodies into `anyhow` errors carrying the server message.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base: Url,
}

impl ApiClient {
    pub fn new(server: &str) -> anyhow::Result<Self> {
        let mut base = Url::parse(server).with_context(|| format!("invalid server URL '{}'", server))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http = Client::builder()
            .user_agent(concat!("kyb-cli/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self { http, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn url(&self, path: &str) -> anyhow::Result<Url> {
        self.base
            .join(path.trim_start_matches('/'))
            .with_context(|| format!("invalid request path '{}'", path))
    }

    pub async fn get(&self, path: &str, query: &[(&str, String)]) -> anyhow::Result<Value> {
        self.send(Method::GET, path, query, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> anyhow::Result<Value> {
        self.send(Method::POST, path, &[], Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> anyhow::Result<Value> {
        self.send(Method::DELETE, path, &[], None).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> anyhow::Result<Value> {
        let url = self.url(path)?;
        tracing::debug!(%method, %url, "sending request");

        let mut request = self.http.request(method, url.clone());
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?;

        unwrap_envelope(response).await
    }
}

async fn unwrap_envelope(response: Response) -> anyhow::Result<Value> {
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .with_context(|| format!("server returned a non-JSON body ({})", status))?;

    if status.is_success() && body.get("success").and_then(Value::as_bool) == Some(true) {
        return Ok(body.get("data").cloned().unwrap_or(Value::Null));
    }

    Err(anyhow!(error_message(status.as_u16(), &body)))
}

fn error_message(status: u16, body: &Value) -> String {
    let message = body
        .get("message")
        .or_else(|| body.get("error").filter(|e| e.is_string()))
        .and_then(Value::as_str)
        .unwrap_or("request failed");

    let mut text = format!("{} ({})", message, status);
    if let Some(fields) = body.get("field_errors").and_then(Value::as_object) {
        let mut names: Vec<&String> = fields.keys().collect();
        names.sort();
        for name in names {
            if let Some(problem) = fields[name].as_str() {
                text.push_str(&format!("\n  {}: {}", name, problem));
            }
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn base_url_keeps_path_prefix() {
        let client = ApiClient::new("http://localhost:3000/kyb").unwrap();
        assert_eq!(client.url("/api/jobs").unwrap().as_str(), "http://localhost:3000/kyb/api/jobs");

        let client = ApiClient::new("http://localhost:3000").unwrap();
        assert_eq!(client.url("api/jobs/abc").unwrap().as_str(), "http://localhost:3000/api/jobs/abc");
    }

    #[test]
    fn rejects_invalid_server_url() {
        assert!(ApiClient::new("not a url").is_err());
    }

    #[test]
    fn error_message_lists_field_errors() {
        let body = json!({
            "error": true,
            "message": "Missing required fields",
            "code": "VALIDATION_ERROR",
            "field_errors": { "report_type": "This field is required" }
        });
        let text = error_message(400, &body);
        assert!(text.starts_with("Missing required fields (400)"));
        assert!(text.contains("report_type: This field is required"));
    }
}

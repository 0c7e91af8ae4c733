use reqwest::{Method, RequestBuilder, Response, header};
use serde::{Serialize, de::DeserializeOwned};

use crate::PlatformError;

#[derive(Clone)]
pub(crate) enum Auth {
    /// `Authorization: token <t>`
    Token(String),
    /// `Authorization: Bearer <t>`
    Bearer(String),
    /// `PRIVATE-TOKEN: <t>`
    PrivateToken(String),
}

/// Thin JSON REST client shared by the platform drivers.
#[derive(Clone)]
pub(crate) struct ApiClient {
    http: reqwest::Client,
    base: String,
    auth: Auth,
}

impl ApiClient {
    pub fn new(base: impl Into<String>, auth: Auth) -> Result<Self, PlatformError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("cirun/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base: base.into().trim_end_matches('/').to_string(),
            auth,
        })
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, PlatformError> {
        let resp = self.send(Method::GET, self.request(Method::GET, path)).await?;
        Ok(resp.json().await?)
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, PlatformError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let resp = self.send(Method::POST, self.request(Method::POST, path).json(body)).await?;
        Ok(resp.json().await?)
    }

    /// POST without body, discarding the response.
    pub async fn post(&self, path: &str) -> Result<(), PlatformError> {
        self.send(Method::POST, self.request(Method::POST, path)).await?;
        Ok(())
    }

    pub async fn delete(&self, path: &str) -> Result<(), PlatformError> {
        self.send(Method::DELETE, self.request(Method::DELETE, path)).await?;
        Ok(())
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base, path)
        };
        let rb = self.http.request(method, url);
        match &self.auth {
            Auth::Token(t) => rb
                .header(header::AUTHORIZATION, format!("token {t}"))
                .header(header::ACCEPT, "application/vnd.github+json"),
            Auth::Bearer(t) => rb.bearer_auth(t),
            Auth::PrivateToken(t) => rb.header("PRIVATE-TOKEN", t),
        }
    }

    async fn send(&self, method: Method, rb: RequestBuilder) -> Result<Response, PlatformError> {
        let resp = rb.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let url = resp.url().to_string();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(PlatformError::Unauthorized(url));
        }
        let body = resp.text().await.unwrap_or_default();
        Err(PlatformError::Status {
            method: method.to_string(),
            url,
            status: status.as_u16(),
            body,
        })
    }
}

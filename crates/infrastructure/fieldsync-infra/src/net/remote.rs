use reqwest::{Client, StatusCode, Url};
use serde_json::Value;

/// Failure talking to the remote document store.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("remote request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("remote rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("invalid remote url: {0}")]
    InvalidUrl(String),
}

impl RemoteError {
    /// Whether the same request may succeed later.
    ///
    /// Transport failures, timeouts, throttling and server errors are retryable.
    /// Permission and validation rejections are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Timeout | RemoteError::Network(_) => true,
            RemoteError::Rejected { status, .. } => {
                *status == StatusCode::REQUEST_TIMEOUT.as_u16()
                    || *status == StatusCode::TOO_MANY_REQUESTS.as_u16()
                    || *status >= 500
            }
            RemoteError::Decode(_) | RemoteError::InvalidUrl(_) => false,
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RemoteError::Timeout
        } else if e.is_decode() {
            RemoteError::Decode(e.to_string())
        } else {
            RemoteError::Network(e.to_string())
        }
    }
}

/// Appends one document to a named collection.
#[async_trait::async_trait]
pub trait RemoteWriter: Send + Sync {
    async fn write(&self, collection: &str, document: &Value) -> Result<(), RemoteError>;
}

#[async_trait::async_trait]
pub trait RemoteReader: Send + Sync {
    async fn list_all(&self, collection: &str) -> Result<Vec<Value>, RemoteError>;
}

/// REST document store: `POST {base}/{collection}` appends, `GET {base}/{collection}` lists.
pub struct HttpDocumentStore {
    client: Client,
    base: Url,
    token: Option<String>,
}

/// Treat the base as a directory so joins append instead of replacing the last segment.
pub(crate) fn normalize_base(base_url: &str) -> Result<Url, RemoteError> {
    let mut url = Url::parse(base_url)
        .map_err(|e| RemoteError::InvalidUrl(format!("{base_url}: {e}")))?;
    if url.cannot_be_a_base() {
        return Err(RemoteError::InvalidUrl(base_url.to_string()));
    }
    if !url.path().ends_with('/') {
        url.set_path(&format!("{}/", url.path()));
    }
    Ok(url)
}

const MAX_ERROR_BODY: usize = 512;

impl HttpDocumentStore {
    pub fn new(client: Client, base_url: &str) -> Result<Self, RemoteError> {
        Ok(Self {
            client,
            base: normalize_base(base_url)?,
            token: None,
        })
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn collection_url(&self, collection: &str) -> Result<Url, RemoteError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .push(collection);
        Ok(url)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let mut message = resp.text().await.unwrap_or_default();
        if message.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !message.is_char_boundary(cut) {
                cut -= 1;
            }
            message.truncate(cut);
        }
        Err(RemoteError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait::async_trait]
impl RemoteWriter for HttpDocumentStore {
    async fn write(&self, collection: &str, document: &Value) -> Result<(), RemoteError> {
        let url = self.collection_url(collection)?;
        let resp = self
            .authorize(self.client.post(url))
            .json(document)
            .send()
            .await?;
        Self::check_status(resp).await?;
        tracing::debug!("wrote document to {collection}");
        Ok(())
    }
}

#[async_trait::async_trait]
impl RemoteReader for HttpDocumentStore {
    async fn list_all(&self, collection: &str) -> Result<Vec<Value>, RemoteError> {
        let url = self.collection_url(collection)?;
        let resp = self.authorize(self.client.get(url)).send().await?;
        let bytes = Self::check_status(resp).await?.bytes().await?;
        let body: Value = serde_json::from_slice(&bytes)
            .map_err(|e| RemoteError::Decode(format!("{collection} listing: {e}")))?;

        match body {
            Value::Array(docs) => Ok(docs),
            Value::Object(mut map) => match map.remove("documents") {
                Some(Value::Array(docs)) => Ok(docs),
                _ => Err(RemoteError::Decode(format!(
                    "{collection} listing has no documents array"
                ))),
            },
            _ => Err(RemoteError::Decode(format!(
                "{collection} listing is not an array"
            ))),
        }
    }
}

//! HTTP transport used by the gateway.

use std::future::Future;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, header};
use serde::de::DeserializeOwned;
use url::Url;

/// HTTP method of a backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
}

impl Method {
    /// Method name as sent on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// One field of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultipartField {
    /// Plain text field.
    Text {
        /// Field name.
        name: String,
        /// Field value.
        value: String,
    },
    /// File upload.
    File {
        /// Field name.
        name: String,
        /// File name reported to the server.
        filename: String,
        /// MIME type.
        content_type: String,
        /// File contents.
        data: Vec<u8>,
    },
}

/// Body of a backend call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RequestBody {
    /// No body.
    #[default]
    Empty,
    /// `application/x-www-form-urlencoded` fields.
    Form(Vec<(String, String)>),
    /// `multipart/form-data` fields.
    Multipart(Vec<MultipartField>),
}

/// A backend call before it reaches the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Path relative to the API base URL, without a leading slash.
    pub path: String,
    /// Request body.
    pub body: RequestBody,
    /// Whether the session credential should be attached.
    pub authorize: bool,
    /// Bearer token, filled in by the gateway.
    pub bearer: Option<String>,
}

impl ApiRequest {
    /// Creates a `GET` request that carries the session credential.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    /// Creates a `POST` request that carries the session credential.
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: RequestBody::Empty,
            authorize: true,
            bearer: None,
        }
    }

    /// Marks the request as not needing a session credential.
    #[must_use]
    pub const fn public(mut self) -> Self {
        self.authorize = false;
        self
    }

    /// Sets a form-encoded body.
    #[must_use]
    pub fn with_form(mut self, fields: Vec<(String, String)>) -> Self {
        self.body = RequestBody::Form(fields);
        self
    }

    /// Sets a multipart body.
    #[must_use]
    pub fn with_multipart(mut self, fields: Vec<MultipartField>) -> Self {
        self.body = RequestBody::Multipart(fields);
        self
    }

    /// Form or text-multipart value of `name`, if set.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        match &self.body {
            RequestBody::Empty => None,
            RequestBody::Form(fields) => fields
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str()),
            RequestBody::Multipart(fields) => fields.iter().find_map(|field| match field {
                MultipartField::Text { name: key, value } if key == name => Some(value.as_str()),
                _ => None,
            }),
        }
    }
}

/// Raw backend response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// Creates a response from a status and body.
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Creates a response with a JSON body.
    #[must_use]
    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self::new(status, value.to_string())
    }

    /// Returns true for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Returns true if the backend rejected the credential.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Decodes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not valid JSON for `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}

/// Errors raised before a response is received.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Request URL could not be built.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Connection-level failure reported by a non-HTTP transport.
    #[error("Connection failed: {0}")]
    Connection(String),
}

/// Sends requests to the backend.
pub trait Transport: Send + Sync {
    /// Executes one request and returns the raw response.
    ///
    /// Non-2xx statuses are responses, not errors.
    fn execute(
        &self,
        request: ApiRequest,
    ) -> impl Future<Output = Result<ApiResponse, TransportError>> + Send;
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
}

impl HttpTransport {
    /// Creates a transport for the given API base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: Url, timeout: Option<Duration>) -> Result<Self, TransportError> {
        let mut builder = Client::builder().user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            base_url,
        })
    }

    /// API base URL.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn multipart(fields: Vec<MultipartField>) -> Result<Form, TransportError> {
        let mut form = Form::new();
        for field in fields {
            form = match field {
                MultipartField::Text { name, value } => form.text(name, value),
                MultipartField::File {
                    name,
                    filename,
                    content_type,
                    data,
                } => form.part(
                    name,
                    Part::bytes(data)
                        .file_name(filename)
                        .mime_str(&content_type)?,
                ),
            };
        }
        Ok(form)
    }
}

impl Transport for HttpTransport {
    fn execute(
        &self,
        request: ApiRequest,
    ) -> impl Future<Output = Result<ApiResponse, TransportError>> + Send {
        async move {
            let url = self.base_url.join(&request.path)?;
            let mut builder = match request.method {
                Method::Get => self.client.get(url),
                Method::Post => self.client.post(url),
            };
            if let Some(bearer) = &request.bearer {
                builder = builder.bearer_auth(bearer);
            }
            builder = match request.body {
                RequestBody::Empty => builder,
                RequestBody::Form(fields) => builder.form(&fields),
                RequestBody::Multipart(fields) => builder.multipart(Self::multipart(fields)?),
            };

            let response = builder.header(header::ACCEPT, "application/json").send().await?;
            let status = response.status().as_u16();
            let body = response.bytes().await?.to_vec();
            Ok(ApiResponse { status, body })
        }
    }
}

//! Request gateway.
//!
//! Every backend call goes through [`Gateway::send`], which attaches the
//! session credential before the request leaves and inspects the response
//! before the caller sees it. An unauthorized response to an authenticated
//! request tears the session down (credential cleared, session moved to
//! `Unauthenticated`, [`SessionEvent::Invalidated`] published) and reaches the
//! caller as [`Error::SessionInvalidated`]. Every other failure is passed
//! through as [`Error::RequestFailed`]; the gateway never retries.
//!
//! [`SessionEvent::Invalidated`]: crate::session::SessionEvent::Invalidated

mod transport;

pub use transport::{
    ApiRequest, ApiResponse, HttpTransport, Method, MultipartField, RequestBody, Transport,
    TransportError,
};

use std::sync::Arc;

use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{Error, Result};
use crate::session::SessionState;

/// Structured error body returned by the backend.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
}

/// Message the backend attached to a failed response: `detail` first, then
/// `message`. Non-string details (validation error lists) are skipped.
#[must_use]
pub fn backend_message(response: &ApiResponse) -> Option<String> {
    let body: ErrorBody = response.decode().unwrap_or_default();
    let detail = match body.detail {
        Some(serde_json::Value::String(detail)) => Some(detail),
        _ => None,
    };
    detail
        .into_iter()
        .chain(body.message)
        .find(|m| !m.trim().is_empty())
}

/// Transport-level description of an HTTP status.
#[must_use]
pub fn status_message(status: u16) -> String {
    let reason = StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason());
    match reason {
        Some(reason) => format!("Request failed with status code {status} ({reason})"),
        None => format!("Request failed with status code {status}"),
    }
}

/// Wraps a [`Transport`] with credential attachment and unauthorized handling.
#[derive(Debug)]
pub struct Gateway<T> {
    transport: T,
    session: Arc<SessionState>,
}

impl<T: Transport> Gateway<T> {
    /// Creates a gateway over `transport` reading credentials from `session`.
    #[must_use]
    pub const fn new(transport: T, session: Arc<SessionState>) -> Self {
        Self { transport, session }
    }

    /// Session state this gateway reads from.
    #[must_use]
    pub const fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    /// Underlying transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Sends a request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionInvalidated`] if the backend rejected the
    /// attached credential, and [`Error::RequestFailed`] for network failures
    /// and non-2xx responses.
    pub async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse> {
        let token = if request.authorize {
            self.session.credential()
        } else {
            None
        };
        request.bearer = token.as_ref().map(|t| t.secret().to_owned());

        let method = request.method.as_str();
        let path = request.path.clone();
        debug!(method, %path, authenticated = token.is_some(), "Sending request");

        let response = match self.transport.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                debug!(method, %path, "Transport failure: {e}");
                return Err(Error::request_failed(None, e.to_string()));
            }
        };

        if response.is_success() {
            debug!(method, %path, status = response.status, "Request succeeded");
            return Ok(response);
        }

        let message = backend_message(&response).unwrap_or_else(|| status_message(response.status));
        if response.is_unauthorized() {
            if let Some(token) = token {
                if self.session.invalidate(&token) {
                    return Err(Error::SessionInvalidated { message });
                }
            }
        }

        debug!(method, %path, status = response.status, %message, "Request failed");
        Err(Error::request_failed(Some(response.status), message))
    }

    /// Sends a request and decodes a JSON response body.
    ///
    /// # Errors
    ///
    /// As [`Gateway::send`], plus [`Error::RequestFailed`] if the body does
    /// not decode.
    pub async fn send_json<R: DeserializeOwned>(&self, request: ApiRequest) -> Result<R> {
        let response = self.send(request).await?;
        response.decode().map_err(|e| {
            Error::request_failed(Some(response.status), format!("Malformed response: {e}"))
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;
    use std::future::Future;
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::credential::{CredentialStore, SessionToken};
    use crate::session::{Identity, SessionEvent, SessionPhase};

    #[derive(Default)]
    struct Scripted {
        responses: Mutex<VecDeque<std::result::Result<ApiResponse, String>>>,
        requests: Mutex<Vec<ApiRequest>>,
    }

    impl Scripted {
        fn with(responses: Vec<std::result::Result<ApiResponse, String>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::default(),
            }
        }
    }

    impl Transport for Scripted {
        fn execute(
            &self,
            request: ApiRequest,
        ) -> impl Future<Output = std::result::Result<ApiResponse, TransportError>> + Send {
            self.requests.lock().unwrap().push(request);
            let next = self.responses.lock().unwrap().pop_front();
            async move {
                match next {
                    Some(Ok(response)) => Ok(response),
                    Some(Err(message)) => Err(TransportError::Connection(message)),
                    None => Err(TransportError::Connection("no scripted response".into())),
                }
            }
        }
    }

    fn signed_in(token: &str) -> Arc<SessionState> {
        let state = Arc::new(SessionState::new(CredentialStore::in_memory()));
        state.transition(SessionPhase::Loading).unwrap();
        state.transition(SessionPhase::Unauthenticated).unwrap();
        state
            .authenticate(
                SessionToken::new(token),
                Identity {
                    email: "alice@example.com".into(),
                    km_session_id: None,
                },
            )
            .unwrap();
        state
    }

    #[tokio::test]
    async fn test_attaches_bearer_when_signed_in() {
        let gateway = Gateway::new(
            Scripted::with(vec![Ok(ApiResponse::json(200, &json!({"emails": []})))]),
            signed_in("tok"),
        );
        gateway.send(ApiRequest::get("emails/inbox")).await.unwrap();

        let requests = gateway.transport().requests.lock().unwrap();
        assert_eq!(requests[0].bearer.as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn test_public_request_is_sent_without_bearer() {
        let gateway = Gateway::new(
            Scripted::with(vec![Ok(ApiResponse::json(200, &json!({})))]),
            signed_in("tok"),
        );
        gateway.send(ApiRequest::get("health").public()).await.unwrap();

        let requests = gateway.transport().requests.lock().unwrap();
        assert!(requests[0].bearer.is_none());
    }

    #[tokio::test]
    async fn test_unauthorized_invalidates_session() {
        let session = signed_in("tok");
        let mut events = session.events();
        let gateway = Gateway::new(
            Scripted::with(vec![Ok(ApiResponse::json(
                401,
                &json!({"detail": "Invalid token"}),
            ))]),
            Arc::clone(&session),
        );

        let err = gateway.send(ApiRequest::get("auth/me")).await.unwrap_err();
        assert!(matches!(err, Error::SessionInvalidated { ref message } if message == "Invalid token"));
        assert!(!session.has_credential());
        assert_eq!(session.phase(), SessionPhase::Unauthenticated);
        assert_eq!(events.try_recv().unwrap(), SessionEvent::Invalidated);
    }

    #[tokio::test]
    async fn test_unauthenticated_401_has_no_session_effect() {
        let session = Arc::new(SessionState::new(CredentialStore::in_memory()));
        let mut events = session.events();
        let gateway = Gateway::new(
            Scripted::with(vec![Ok(ApiResponse::json(
                401,
                &json!({"detail": "Authentication failed"}),
            ))]),
            Arc::clone(&session),
        );

        let err = gateway
            .send(ApiRequest::post("auth/login").public())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert!(matches!(err, Error::RequestFailed { .. }));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_other_errors_pass_through() {
        let session = signed_in("tok");
        let gateway = Gateway::new(
            Scripted::with(vec![Ok(ApiResponse::json(
                500,
                &json!({"detail": "Failed to fetch inbox"}),
            ))]),
            Arc::clone(&session),
        );

        let err = gateway.send(ApiRequest::get("emails/inbox")).await.unwrap_err();
        assert!(matches!(
            err,
            Error::RequestFailed { status: Some(500), ref message } if message == "Failed to fetch inbox"
        ));
        assert!(session.has_credential());
        assert_eq!(gateway.transport().requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_network_failure_has_no_status() {
        let gateway = Gateway::new(
            Scripted::with(vec![Err("connection refused".into())]),
            signed_in("tok"),
        );
        let err = gateway.send(ApiRequest::get("emails/sent")).await.unwrap_err();
        assert!(matches!(err, Error::RequestFailed { status: None, .. }));
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_malformed_body_is_request_failure() {
        let gateway = Gateway::new(
            Scripted::with(vec![Ok(ApiResponse::new(200, "<html>"))]),
            signed_in("tok"),
        );
        let err = gateway
            .send_json::<serde_json::Value>(ApiRequest::get("emails/inbox"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RequestFailed { status: Some(200), .. }));
    }

    #[test]
    fn test_backend_message_priority() {
        let both = ApiResponse::json(400, &json!({"detail": "d", "message": "m"}));
        assert_eq!(backend_message(&both).as_deref(), Some("d"));

        let message_only = ApiResponse::json(400, &json!({"message": "m"}));
        assert_eq!(backend_message(&message_only).as_deref(), Some("m"));

        let list_detail = ApiResponse::json(422, &json!({"detail": [{"loc": ["body"]}], "message": "m"}));
        assert_eq!(backend_message(&list_detail).as_deref(), Some("m"));

        let none = ApiResponse::new(502, "Bad Gateway");
        assert_eq!(backend_message(&none), None);
        assert_eq!(
            status_message(502),
            "Request failed with status code 502 (Bad Gateway)"
        );
    }
}

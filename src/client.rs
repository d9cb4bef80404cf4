use crate::error::TransportError;
use crate::protocol::StreamParams;
use crate::sse::SseDecoder;
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use reqwest::header::ACCEPT;
use reqwest::{Client as HttpClient, Url};

pub const DEFAULT_STREAM_PATH: &str = "/api/query/stream";

/// Decoded SSE `data` payloads, in arrival order. Dropping it closes the
/// connection.
pub type EventStream = BoxStream<'static, Result<String, TransportError>>;

/// Opens one server-push connection per call.
#[async_trait]
pub trait EventTransport: Send + Sync {
    async fn open(&self, params: &StreamParams) -> Result<EventStream, TransportError>;
}

/// Where the bearer token travels on the stream request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialPlacement {
    /// `?token=...`, for servers that follow the browser EventSource
    /// convention of no custom headers.
    #[default]
    QueryParam,
    /// `Authorization: Bearer ...`
    BearerHeader,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub stream_path: String,
    pub credential_placement: CredentialPlacement,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            stream_path: DEFAULT_STREAM_PATH.to_string(),
            credential_placement: CredentialPlacement::default(),
        }
    }
}

pub struct HttpTransport {
    base_url: String,
    stream_path: String,
    placement: CredentialPlacement,
    http: HttpClient,
}

impl HttpTransport {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_client(config, HttpClient::new())
    }

    pub fn with_client(config: ClientConfig, http: HttpClient) -> Self {
        Self {
            base_url: normalize_base_url(&config.base_url),
            stream_path: normalize_path(&config.stream_path),
            placement: config.credential_placement,
            http,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn stream_url(&self, params: &StreamParams) -> Result<Url, TransportError> {
        let include_token = self.placement == CredentialPlacement::QueryParam;
        Url::parse_with_params(
            &format!("{}{}", self.base_url, self.stream_path),
            params.query_pairs(include_token),
        )
        .map_err(|err| TransportError::Url(err.to_string()))
    }
}

#[async_trait]
impl EventTransport for HttpTransport {
    async fn open(&self, params: &StreamParams) -> Result<EventStream, TransportError> {
        let url = self.stream_url(params)?;
        tracing::debug!(path = %url.path(), "opening query stream");

        let mut request = self.http.get(url).header(ACCEPT, "text/event-stream");
        if self.placement == CredentialPlacement::BearerHeader {
            request = request.bearer_auth(&params.token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let mut decoder = SseDecoder::new();
        let events = response
            .bytes_stream()
            .map(move |chunk| match chunk {
                Ok(bytes) => decoder.push(&bytes).into_iter().map(Ok).collect::<Vec<_>>(),
                Err(err) => vec![Err(TransportError::from(err))],
            })
            .flat_map(stream::iter);

        Ok(events.boxed())
    }
}

fn normalize_base_url(value: &str) -> String {
    value.trim_end_matches('/').to_string()
}

fn normalize_path(value: &str) -> String {
    if value.starts_with('/') {
        value.to_string()
    } else {
        format!("/{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::QueryRequest;

    fn params() -> StreamParams {
        let request = QueryRequest::new("what is 42?").in_space("s1");
        StreamParams::new(&request, "tok en".to_string(), None)
    }

    #[test]
    fn stream_url_carries_token_by_default() {
        let transport = HttpTransport::new(ClientConfig::new("http://localhost:8000/"));
        assert_eq!(transport.base_url(), "http://localhost:8000");

        let url = transport.stream_url(&params()).unwrap();
        assert_eq!(url.path(), "/api/query/stream");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("query".to_string(), "what is 42?".to_string()),
                ("space_id".to_string(), "s1".to_string()),
                ("token".to_string(), "tok en".to_string()),
            ]
        );
    }

    #[test]
    fn header_placement_keeps_token_out_of_url() {
        let mut config = ClientConfig::new("http://localhost:8000");
        config.stream_path = "v2/stream".to_string();
        config.credential_placement = CredentialPlacement::BearerHeader;
        let transport = HttpTransport::new(config);

        let url = transport.stream_url(&params()).unwrap();
        assert_eq!(url.path(), "/v2/stream");
        assert!(url.query_pairs().all(|(k, _)| k != "token"));
    }

    #[test]
    fn bad_base_url_is_a_url_error() {
        let transport = HttpTransport::new(ClientConfig::new("not a url"));
        assert!(matches!(
            transport.stream_url(&params()),
            Err(TransportError::Url(_))
        ));
    }
}

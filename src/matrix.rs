//! Delivery of rendered messages to a Matrix room.
//!
//! Each call issues exactly one `PUT` to the client-server API with a fresh
//! transaction id in the path. The homeserver deduplicates on that id, so no
//! separate idempotency header is sent and nothing is retried here.

use crate::config::HttpTransport;
use crate::error::DeliveryError;
use crate::internal_metrics;
use axum::body::Bytes;
use rand::distr::Alphanumeric;
use rand::Rng;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, instrument};
use url::Url;

const TXN_ID_LEN: usize = 32;

/// The `m.room.message` event content.
#[derive(Debug, Serialize)]
struct TextMessage<'a> {
    body: &'a str,
    msgtype: &'static str,
}

/// What the homeserver answered, relayed as-is to the webhook caller.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// Generates a random transaction id.
pub fn new_transaction_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TXN_ID_LEN)
        .map(char::from)
        .collect()
}

/// Builds `{endpoint}/_matrix/client/r0/rooms/{room_id}/send/m.room.message/{txn_id}`.
///
/// Path segments are percent-encoded, so room ids like `!abc:example.com`
/// survive intact.
pub fn message_url(endpoint: &Url, room_id: &str, txn_id: &str) -> Result<Url, DeliveryError> {
    let mut url = endpoint.clone();
    url.path_segments_mut()
        .map_err(|()| DeliveryError::Url(format!("{endpoint} cannot be a base URL")))?
        .pop_if_empty()
        .extend([
            "_matrix",
            "client",
            "r0",
            "rooms",
            room_id,
            "send",
            "m.room.message",
            txn_id,
        ]);
    Ok(url)
}

/// Sends `text` to `room_id` and returns the homeserver's response.
///
/// Any response the homeserver gives back, whatever its status, is a
/// [`Delivery`]. Only transport failures are errors.
#[instrument(skip(transport, endpoint, text), fields(txn_id = tracing::field::Empty))]
pub async fn deliver(
    transport: &HttpTransport,
    endpoint: &Url,
    room_id: &str,
    text: &str,
) -> Result<Delivery, DeliveryError> {
    let txn_id = new_transaction_id();
    tracing::Span::current().record("txn_id", txn_id.as_str());
    let url = message_url(endpoint, room_id, &txn_id)?;

    let started = Instant::now();
    let response = transport
        .request(Method::PUT, url)
        .json(&TextMessage {
            body: text,
            msgtype: "m.text",
        })
        .send()
        .await
        .map_err(DeliveryError::Send)?;

    let status = response.status();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let body = response.bytes().await.map_err(DeliveryError::ReadBody)?;
    internal_metrics::record_delivery_duration(started.elapsed());

    debug!(%status, bytes = body.len(), "Homeserver responded");
    Ok(Delivery {
        status,
        content_type,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpClientConfig;
    use serde_json::json;
    use std::collections::HashSet;
    use wiremock::matchers::{body_json, header, method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport() -> HttpTransport {
        HttpClientConfig::default().build().unwrap()
    }

    #[test]
    fn transaction_ids_are_unique_and_url_safe() {
        let ids: HashSet<String> = (0..1_000).map(|_| new_transaction_id()).collect();
        assert_eq!(ids.len(), 1_000);
        assert!(ids
            .iter()
            .all(|id| id.len() == TXN_ID_LEN && id.chars().all(|c| c.is_ascii_alphanumeric())));
    }

    #[test]
    fn message_url_encodes_the_room_id() {
        let endpoint = Url::parse("https://matrix.example.com").unwrap();
        let url = message_url(&endpoint, "!abc:example.com", "txn1").unwrap();
        assert_eq!(
            url.as_str(),
            "https://matrix.example.com/_matrix/client/r0/rooms/!abc:example.com/send/m.room.message/txn1"
        );

        let url = message_url(&endpoint, "a/b c", "txn1").unwrap();
        assert!(url.path().contains("/rooms/a%2Fb%20c/send/"), "{url}");
    }

    #[test]
    fn message_url_keeps_an_endpoint_prefix() {
        let endpoint = Url::parse("https://example.com/matrix/").unwrap();
        let url = message_url(&endpoint, "!r:x", "t").unwrap();
        assert_eq!(
            url.path(),
            "/matrix/_matrix/client/r0/rooms/!r:x/send/m.room.message/t"
        );
    }

    #[tokio::test]
    async fn deliver_puts_a_text_message_and_relays_the_response() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path_regex(
                r"^/_matrix/client/r0/rooms/!abc:example\.com/send/m\.room\.message/[A-Za-z0-9]+$",
            ))
            .and(body_json(json!({"body": "firing: Disk", "msgtype": "m.text"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(r#"{"event_id":"$ev1"}"#, "application/json"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let endpoint = Url::parse(&server.uri()).unwrap();
        let delivery = deliver(&transport(), &endpoint, "!abc:example.com", "firing: Disk")
            .await
            .unwrap();

        assert_eq!(delivery.status, StatusCode::OK);
        assert_eq!(delivery.body.as_ref(), br#"{"event_id":"$ev1"}"#);
        assert_eq!(delivery.content_type.as_deref(), Some("application/json"));
    }

    #[tokio::test]
    async fn remote_errors_are_relayed_not_raised() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403).set_body_string("M_FORBIDDEN"))
            .mount(&server)
            .await;

        let endpoint = Url::parse(&server.uri()).unwrap();
        let delivery = deliver(&transport(), &endpoint, "!abc:example.com", "hi")
            .await
            .unwrap();

        assert_eq!(delivery.status, StatusCode::FORBIDDEN);
        assert_eq!(delivery.body.as_ref(), b"M_FORBIDDEN");
    }

    #[tokio::test]
    async fn sequential_deliveries_use_distinct_transaction_ids() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;

        let endpoint = Url::parse(&server.uri()).unwrap();
        for _ in 0..2 {
            deliver(&transport(), &endpoint, "!abc:example.com", "hi")
                .await
                .unwrap();
        }

        let requests = server.received_requests().await.unwrap();
        let txn_ids: HashSet<_> = requests
            .iter()
            .map(|r| r.url.path_segments().unwrap().last().unwrap().to_string())
            .collect();
        assert_eq!(txn_ids.len(), 2);
    }

    #[tokio::test]
    async fn credentials_are_sent_and_no_idempotency_header() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(header("authorization", "Bearer syt_token"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let transport: HttpClientConfig =
            serde_yml::from_str("bearer_token: syt_token\n").unwrap();
        let endpoint = Url::parse(&server.uri()).unwrap();
        deliver(&transport.build().unwrap(), &endpoint, "!r:x", "hi")
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert!(requests[0].headers.get("idempotency-key").is_none());
    }

    #[tokio::test]
    async fn unreachable_homeserver_is_a_delivery_error() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let endpoint = Url::parse(&format!("http://127.0.0.1:{port}")).unwrap();

        let err = deliver(&transport(), &endpoint, "!abc:example.com", "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Send(_)));
        assert!(err.to_string().starts_with("Request to matrix: "));
    }

    #[tokio::test]
    async fn room_path_is_exact() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/_matrix/client/r0/rooms/!abc:example.com/send/m.room.message/fixed"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let endpoint = Url::parse(&server.uri()).unwrap();
        let url = message_url(&endpoint, "!abc:example.com", "fixed").unwrap();
        transport()
            .request(Method::PUT, url)
            .send()
            .await
            .unwrap();
    }
}

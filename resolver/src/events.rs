use crate::config::EventSink as EventSinkConfig;
use crate::metrics_defs::EVENT_DELIVERY_FAILED;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use shared::counter;
use url::Url;

/// Emitted after every lookup, successful or not.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LookupEvent {
    pub client_id: Option<String>,
    pub postcode: Option<String>,
    pub outcome: &'static str,
    pub status: u16,
    pub name: Option<String>,
    pub constituency: Option<String>,
}

/// Emitted when a caller follows a tracked `mailto:` link.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TrackEvent {
    pub client_id: String,
    pub email: String,
    pub subject: String,
    pub body_length: usize,
    pub mp: String,
    pub constituency: String,
    pub postcode: String,
    pub page: String,
    pub user_agent: String,
    pub ip: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    MpLookup(LookupEvent),
    Track(TrackEvent),
}

#[derive(Serialize)]
struct Envelope<'a> {
    ts: String,
    #[serde(flatten)]
    event: &'a Event,
}

/// Posts events to an optional webhook.
///
/// Delivery happens on a spawned task. The request path never waits for it
/// and never sees its errors.
#[derive(Clone)]
pub struct EventSink {
    client: reqwest::Client,
    webhook_url: Option<Url>,
}

impl EventSink {
    pub fn new(config: &EventSinkConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(EventSink {
            client,
            webhook_url: config.webhook_url.clone(),
        })
    }

    /// A sink that drops every event.
    pub fn disabled() -> Self {
        EventSink {
            client: reqwest::Client::new(),
            webhook_url: None,
        }
    }

    pub fn emit(&self, event: Event) {
        let Some(url) = self.webhook_url.clone() else {
            return;
        };
        let client = self.client.clone();

        tokio::spawn(async move {
            let envelope = Envelope {
                ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                event: &event,
            };

            let result = client.post(url).json(&envelope).send().await;
            match result {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => {
                    counter!(EVENT_DELIVERY_FAILED).increment(1);
                    tracing::warn!(status = %response.status(), "webhook rejected event");
                }
                Err(e) => {
                    counter!(EVENT_DELIVERY_FAILED).increment(1);
                    tracing::warn!(error = %e, "webhook delivery failed");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn wait_for_requests(server: &MockServer, count: usize) -> Vec<wiremock::Request> {
        for _ in 0..50 {
            let received = server.received_requests().await.unwrap_or_default();
            if received.len() >= count {
                return received;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("webhook did not receive {count} request(s)");
    }

    #[tokio::test]
    async fn test_emit_posts_event() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let sink = EventSink::new(&EventSinkConfig {
            webhook_url: Some(Url::parse(&format!("{}/hook", server.uri())).unwrap()),
            timeout_ms: 1000,
        })
        .unwrap();

        sink.emit(Event::MpLookup(LookupEvent {
            client_id: Some("client1".into()),
            postcode: Some("SW1A 1AA".into()),
            outcome: "ok",
            status: 200,
            name: Some("Jane Doe".into()),
            constituency: None,
        }));

        let received = wait_for_requests(&server, 1).await;
        let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();

        assert_eq!(body["type"], "mp_lookup");
        assert_eq!(body["client_id"], "client1");
        assert_eq!(body["postcode"], "SW1A 1AA");
        assert_eq!(body["status"], 200);
        assert_eq!(body["constituency"], serde_json::Value::Null);
        assert!(body["ts"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn test_failed_delivery_is_swallowed() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let sink = EventSink::new(&EventSinkConfig {
            webhook_url: Some(Url::parse(&server.uri()).unwrap()),
            timeout_ms: 1000,
        })
        .unwrap();

        sink.emit(Event::Track(TrackEvent {
            client_id: "client1".into(),
            email: "jane@example.org".into(),
            ..Default::default()
        }));

        let received = wait_for_requests(&server, 1).await;
        let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(body["type"], "track");
        assert_eq!(body["email"], "jane@example.org");
    }

    #[tokio::test]
    async fn test_disabled_sink_sends_nothing() {
        // Must not panic or spawn work that touches the network
        EventSink::disabled().emit(Event::MpLookup(LookupEvent::default()));
    }
}

//! Outbound HTTP forwarding of enriched notification envelopes to arbitrary
//! URLs (§4.6). HTTPS-only, with loop prevention against the process's own
//! ingress callback host.

pub mod envelope;

mod client;
mod error;

pub use client::Forwarder;
pub use envelope::{Changes, ChangesSummary, Envelope};
pub use error::ForwarderError;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use flowbridge_client_state::ForwardMode;
    use flowbridge_common::{ChangeType, Notification};
    use flowbridge_retry::RetryPolicy;
    use httpmock::prelude::*;

    use super::*;

    fn notification() -> Notification {
        Notification {
            subscription_id: "sub-1".to_string(),
            resource: "lists/docs".into(),
            change_type: ChangeType::Updated,
            resource_data: None,
            client_state: None,
            change_timestamp: None,
        }
    }

    fn forwarder_for(server: &MockServer) -> Forwarder {
        Forwarder::new(
            reqwest::Client::new(),
            RetryPolicy::new(3, Duration::from_millis(1)),
            &server.url(""),
        )
    }

    #[tokio::test]
    async fn simple_mode_posts_envelope_successfully() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/sink");
            then.status(200);
        });
        let forwarder = forwarder_for(&server);
        let envelope = Envelope::build(
            ForwardMode::Simple,
            "flowbridge".to_string(),
            notification(),
            None,
            None,
            None,
        );
        forwarder
            .forward(&server.url("/sink"), &envelope)
            .await
            .unwrap();
        mock.assert_hits(1);
    }

    #[tokio::test]
    async fn http_scheme_is_rejected_without_any_request() {
        let server = MockServer::start();
        let forwarder = forwarder_for(&server);
        let envelope = Envelope::build(
            ForwardMode::Simple,
            "flowbridge".to_string(),
            notification(),
            None,
            None,
            None,
        );
        let result = forwarder.forward("http://example.com/sink", &envelope).await;
        assert!(matches!(result, Err(ForwarderError::InsecureUrl(_))));
    }

    #[tokio::test]
    async fn loop_to_own_callback_host_is_refused() {
        let server = MockServer::start();
        let forwarder = forwarder_for(&server);
        let envelope = Envelope::build(
            ForwardMode::Simple,
            "flowbridge".to_string(),
            notification(),
            None,
            None,
            None,
        );
        let looped_url = server.url("/ingress");
        let result = forwarder.forward(&looped_url, &envelope).await;
        assert!(matches!(result, Err(ForwarderError::LoopDetected(_))));
    }

    #[tokio::test]
    async fn client_error_is_not_retried() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/sink");
            then.status(422);
        });
        let forwarder = forwarder_for(&server);
        let envelope = Envelope::build(
            ForwardMode::Simple,
            "flowbridge".to_string(),
            notification(),
            None,
            None,
            None,
        );
        let result = forwarder.forward(&server.url("/sink"), &envelope).await;
        assert!(matches!(result, Err(ForwarderError::Rejected { status: 422, .. })));
        mock.assert_hits(1);
    }

    #[tokio::test]
    async fn server_error_is_retried_until_exhausted() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/sink");
            then.status(500);
        });
        let forwarder = forwarder_for(&server);
        let envelope = Envelope::build(
            ForwardMode::Simple,
            "flowbridge".to_string(),
            notification(),
            None,
            None,
            None,
        );
        let result = forwarder.forward(&server.url("/sink"), &envelope).await;
        assert!(matches!(result, Err(ForwarderError::Exhausted { attempts: 3 })));
        mock.assert_hits(3);
    }
}

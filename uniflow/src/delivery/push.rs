//! Push relay delivery surface.
//!
//! Posts reminders to an ntfy-compatible HTTP endpoint so that they reach the
//! user's phone or desktop even when no UniFlow terminal is in view. The
//! relay is the preferred channel whenever `UNIFLOW_PUSH_URL` is configured.
//!
//! Each reminder is a single `POST` whose body is the reminder text. The
//! title and presentation hints travel as headers:
//!
//! | Header | Value |
//! |--------|-------|
//! | `Title` | reminder title |
//! | `Priority` | `high` when the reminder should stay until dismissed |
//! | `Tags` | `bell` |
//! | `X-Uniflow-Tag` | dedup key, lets the receiver collapse repeats |
//! | `X-Uniflow-Vibrate` | comma-separated vibration pattern |
//!
//! There is no retry: a failed post falls through to the next channel.

use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use tracing::debug;

use super::capability::{NotificationOptions, NotifyError, WorkerSurface};

/// HTTP request timeout.
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Delivery surface that forwards reminders to a push relay.
#[derive(Debug, Clone)]
pub struct PushRelay {
    client: Client,
    url: Option<String>,
}

impl PushRelay {
    /// Creates a relay client. With `url` set to `None` the relay reports
    /// itself as not ready and is skipped by the router.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::Http` if the HTTP client cannot be built.
    pub fn new(url: Option<String>) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self { client, url })
    }

    /// The configured endpoint, if any.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    fn headers(title: &str, options: &NotificationOptions) -> Result<HeaderMap, NotifyError> {
        let invalid = |e: reqwest::header::InvalidHeaderValue| {
            NotifyError::Display(format!("invalid header value: {e}"))
        };

        let priority = if options.require_interaction {
            "high"
        } else {
            "default"
        };
        let vibrate = options
            .vibrate
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        headers.insert("Title", HeaderValue::from_str(title).map_err(invalid)?);
        headers.insert("Priority", HeaderValue::from_static(priority));
        headers.insert("Tags", HeaderValue::from_static("bell"));
        headers.insert(
            "X-Uniflow-Tag",
            HeaderValue::from_str(&options.tag).map_err(invalid)?,
        );
        headers.insert(
            "X-Uniflow-Vibrate",
            HeaderValue::from_str(&vibrate).map_err(invalid)?,
        );
        Ok(headers)
    }
}

impl WorkerSurface for PushRelay {
    fn is_ready(&self) -> bool {
        self.url.as_deref().is_some_and(|url| !url.trim().is_empty())
    }

    fn show_notification<'a>(
        &'a self,
        title: &'a str,
        body: &'a str,
        options: &'a NotificationOptions,
    ) -> BoxFuture<'a, Result<(), NotifyError>> {
        Box::pin(async move {
            let Some(url) = self.url.as_deref().filter(|url| !url.trim().is_empty()) else {
                return Err(NotifyError::Unsupported("push relay URL not configured".to_string()));
            };

            debug!(url = %url, tag = %options.tag, "Posting reminder to push relay");

            let response = self
                .client
                .post(url)
                .headers(Self::headers(title, options)?)
                .body(body.to_string())
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                return Ok(());
            }

            let message = response.text().await.unwrap_or_default();
            Err(NotifyError::Relay {
                status: status.as_u16(),
                message,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_relay_is_not_ready() {
        assert!(!PushRelay::new(None).unwrap().is_ready());
        assert!(!PushRelay::new(Some("  ".to_string())).unwrap().is_ready());
        assert!(PushRelay::new(Some("https://ntfy.sh/uniflow".to_string()))
            .unwrap()
            .is_ready());
    }

    #[test]
    fn headers_carry_presentation_hints() {
        let headers =
            PushRelay::headers("Task due in 1 hour", &NotificationOptions::reminder("task-t1-1h"))
                .unwrap();

        assert_eq!(headers["Title"], "Task due in 1 hour");
        assert_eq!(headers["Priority"], "high");
        assert_eq!(headers["X-Uniflow-Tag"], "task-t1-1h");
        assert_eq!(headers["X-Uniflow-Vibrate"], "200,100,200");
    }

    #[test]
    fn control_characters_in_title_are_display_errors() {
        let result = PushRelay::headers("Class\nstarts", &NotificationOptions::reminder("t"));
        assert!(matches!(result, Err(NotifyError::Display(_))));
    }

    #[tokio::test]
    async fn unconfigured_relay_refuses_to_send() {
        let relay = PushRelay::new(None).unwrap();
        let result = relay
            .show_notification("t", "b", &NotificationOptions::reminder("k"))
            .await;
        assert!(matches!(result, Err(NotifyError::Unsupported(_))));
    }
}

//! Webhook announcer. Posts Discord-style embeds for proposals and results.

use crate::domain::{DomainError, Motion, MotionStatus, Tally};
use crate::ports::AnnouncerPort;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;

const COLOUR_PROPOSED: u32 = 0x3498db;
const COLOUR_PASSED: u32 = 0x2ecc71;
const COLOUR_CLOSED: u32 = 0xe74c3c;

/// Posts to a single webhook URL (e.g. a Discord channel webhook).
pub struct WebhookAnnouncer {
    client: Client,
    url: String,
}

impl WebhookAnnouncer {
    /// `timeout` bounds each whole request, so a stalled endpoint cannot hold
    /// up the caller past it.
    pub fn new(url: String, timeout: Duration) -> Result<Self, DomainError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DomainError::Announce(format!("HTTP client: {}", e)))?;
        Ok(Self { client, url })
    }

    fn proposal_payload(motion: &Motion) -> Value {
        let mut fields = vec![
            json!({ "name": "Proposer", "value": format!("<@{}>", motion.author_id), "inline": false }),
            json!({ "name": "Majority", "value": motion.requirement(), "inline": false }),
        ];
        if let Some(expires_at) = motion.expires_at {
            fields.push(json!({ "name": "Expires", "value": expires_at.to_rfc3339(), "inline": false }));
        }
        json!({
            "embeds": [{
                "title": format!("New Motion #{}", motion.id),
                "description": motion.text,
                "color": COLOUR_PROPOSED,
                "fields": fields,
            }]
        })
    }

    fn result_payload(motion: &Motion, tally: &Tally) -> Value {
        let (title, colour) = match motion.status {
            MotionStatus::Passed => ("Motion Passed", COLOUR_PASSED),
            MotionStatus::Failed => ("Motion Failed", COLOUR_CLOSED),
            MotionStatus::Killed => ("Motion Killed", COLOUR_CLOSED),
            MotionStatus::Expired => ("Motion Expired", COLOUR_CLOSED),
            MotionStatus::Active => ("Motion Update", COLOUR_PROPOSED),
        };
        json!({
            "embeds": [{
                "title": title,
                "description": motion.text,
                "color": colour,
                "fields": [
                    { "name": "Outcome", "value": motion.status.as_str(), "inline": false },
                    { "name": "Yes", "value": tally.yes.to_string(), "inline": true },
                    { "name": "No", "value": tally.no.to_string(), "inline": true },
                    { "name": "Abstain", "value": tally.abstain.to_string(), "inline": true },
                ],
            }]
        })
    }

    async fn post(&self, body: &Value) -> Result<(), DomainError> {
        let res = self
            .client
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(|e| DomainError::Announce(format!("Request failed: {}", e)))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_else(|_| "unknown".to_string());
            return Err(DomainError::Announce(format!(
                "Webhook error {}: {}",
                status, text
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl AnnouncerPort for WebhookAnnouncer {
    async fn motion_proposed(&self, motion: &Motion) -> Result<(), DomainError> {
        self.post(&Self::proposal_payload(motion)).await
    }

    async fn motion_resolved(&self, motion: &Motion, tally: &Tally) -> Result<(), DomainError> {
        self.post(&Self::result_payload(motion, tally)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Majority;
    use chrono::Utc;

    fn motion(status: MotionStatus) -> Motion {
        Motion {
            id: 3,
            council_id: 1,
            author_id: 99,
            text: "Fund the library".into(),
            majority: Majority::new(2, 3).unwrap(),
            unanimous: false,
            status,
            created_at: Utc::now(),
            closed_at: None,
            expires_at: None,
        }
    }

    #[test]
    fn test_proposal_payload() {
        let body = WebhookAnnouncer::proposal_payload(&motion(MotionStatus::Active));
        let embed = &body["embeds"][0];
        assert_eq!(embed["title"], "New Motion #3");
        assert_eq!(embed["fields"][0]["value"], "<@99>");
        assert_eq!(embed["fields"][1]["value"], "2/3");
        assert_eq!(embed["fields"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_result_payload() {
        let body =
            WebhookAnnouncer::result_payload(&motion(MotionStatus::Passed), &Tally::new(4, 1, 2));
        let embed = &body["embeds"][0];
        assert_eq!(embed["title"], "Motion Passed");
        assert_eq!(embed["color"], COLOUR_PASSED);
        assert_eq!(embed["fields"][1]["value"], "4");
        assert_eq!(embed["fields"][3]["value"], "2");
    }

    #[tokio::test]
    async fn test_stalled_endpoint_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept and hold connections without ever answering.
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let announcer =
            WebhookAnnouncer::new(format!("http://{}/hook", addr), Duration::from_millis(200))
                .unwrap();
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            announcer.motion_proposed(&motion(MotionStatus::Active)),
        )
        .await
        .expect("announcement should give up on its own");
        assert!(matches!(result, Err(DomainError::Announce(_))));
        server.abort();
    }
}

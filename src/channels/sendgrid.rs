use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use super::MessageSender;
use crate::http;

/// Email over the SendGrid v3 mail API.
#[derive(Clone)]
pub struct SendGridSender {
    base_url: String,
    api_key: String,
    from_address: String,
    from_name: String,
    client: reqwest::Client,
}

impl SendGridSender {
    pub fn new(
        base_url: String,
        api_key: String,
        from_address: String,
        from_name: String,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            base_url,
            api_key,
            from_address,
            from_name,
            client: http::client(timeout)?,
        })
    }
}

#[derive(Serialize)]
struct MailSend<'a> {
    personalizations: [Personalization<'a>; 1],
    from: Address<'a>,
    subject: &'a str,
    content: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Personalization<'a> {
    to: [Address<'a>; 1],
}

#[derive(Serialize)]
struct Address<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    value: &'a str,
}

#[async_trait]
impl MessageSender for SendGridSender {
    async fn send_message(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        let payload = MailSend {
            personalizations: [Personalization {
                to: [Address {
                    email: recipient,
                    name: None,
                }],
            }],
            from: Address {
                email: &self.from_address,
                name: Some(&self.from_name),
            },
            subject,
            content: [Content {
                kind: "text/plain",
                value: body,
            }],
        };

        let url = format!("{}/v3/mail/send", self.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .context("sendgrid POST failed")?;
        http::success_body(resp, "sendgrid").await?;
        Ok(())
    }
}

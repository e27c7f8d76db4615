// Minimal Twilio Programmable Messaging client.
// https://www.twilio.com/docs/messaging/api/message-resource

use std::collections::HashMap;

pub mod models;

use reqwest::{header, Client, StatusCode};

use crate::models::MessageResponse;

#[derive(Debug, thiserror::Error)]
pub enum TwilioError {
    #[error("request to Twilio failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Twilio returned {status}: {body}")]
    Api { status: StatusCode, body: String },
}

#[derive(Debug, Clone)]
pub struct TwilioOptions {
    pub account_sid: String,
    pub auth_token: String,
    /// E.164 sender number the messages are sent from.
    pub from_number: String,
}

#[derive(Debug, Clone)]
pub struct TwilioService {
    options: TwilioOptions,
    client: Client,
}

impl TwilioService {
    pub fn new(options: TwilioOptions) -> Self {
        Self {
            options,
            client: Client::new(),
        }
    }

    /// Send one SMS message. Returns the created message resource.
    ///
    /// Any non-2xx answer from Twilio is surfaced as `TwilioError::Api` with
    /// the response body attached, so callers can tell delivery failures
    /// apart from transport failures.
    pub async fn send_message(&self, to: &str, body: &str) -> Result<MessageResponse, TwilioError> {
        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{sid}/Messages.json",
            sid = self.options.account_sid
        );

        let mut headers = header::HeaderMap::new();
        headers.insert(
            "Content-Type",
            "application/x-www-form-urlencoded"
                .parse()
                .expect("Header value should parse correctly"),
        );

        let mut form_body: HashMap<&str, &str> = HashMap::new();
        form_body.insert("To", to);
        form_body.insert("From", &self.options.from_number);
        form_body.insert("Body", body);

        let response = self
            .client
            .post(url)
            .basic_auth(
                self.options.account_sid.clone(),
                Some(self.options.auth_token.clone()),
            )
            .headers(headers)
            .form(&form_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, body, "Twilio message create failed");
            return Err(TwilioError::Api { status, body });
        }

        Ok(response.json::<MessageResponse>().await?)
    }
}

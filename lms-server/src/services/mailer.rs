//! Mail relay client
//!
//! Notifications go through a small HTTP relay. Most callers treat
//! delivery as best-effort and log failures; the OTP path is the one
//! place a send failure is surfaced to the client.

use anyhow::{anyhow, Context, Result};
use lms_common::config::MailConfig;
use serde_json::json;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Offline,
    Online,
}

/// HTTP mail relay client
pub struct Mailer {
    mode: Mode,
    base_url: String,
    from_address: String,
    client: reqwest::Client,
}

impl Mailer {
    pub fn from_config(config: &MailConfig) -> Self {
        let mode = if config.mode == "online" {
            Mode::Online
        } else {
            Mode::Offline
        };
        Self {
            mode,
            base_url: config.base_url.clone(),
            from_address: config.from_address.clone(),
            client: reqwest::Client::new(),
        }
    }

    /// Send a message, propagating delivery failure
    pub async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        match self.mode {
            Mode::Offline => {
                debug!("Mail (offline) to {}: {}", to, subject);
                Ok(())
            }
            Mode::Online => {
                let url = format!("{}/send", self.base_url);
                let response = self
                    .client
                    .post(&url)
                    .json(&json!({
                        "from": self.from_address,
                        "to": to,
                        "subject": subject,
                        "body": body,
                    }))
                    .send()
                    .await
                    .context("Mail relay request failed")?;

                if !response.status().is_success() {
                    return Err(anyhow!(
                        "Mail relay rejected message with status {}",
                        response.status()
                    ));
                }
                Ok(())
            }
        }
    }

    /// Send a message, swallowing failure with a warning
    pub async fn send_best_effort(&self, to: &str, subject: &str, body: &str) {
        if let Err(e) = self.send(to, subject, body).await {
            warn!("Failed to send mail to {}: {}", to, e);
        }
    }
}

//! Payment gateway client
//!
//! Checkout creates an order with the gateway and hands the reference to
//! the frontend; the gateway's callback is verified by recomputing the
//! signature over (order_id, payment_id) with the key secret. Offline
//! mode mints order references locally so development and tests need no
//! network.

use anyhow::{anyhow, Context, Result};
use lms_common::config::GatewayConfig;
use rand::RngCore;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Offline,
    Online,
}

/// Gateway order-creation client and signature verifier
pub struct PaymentGateway {
    mode: Mode,
    base_url: String,
    key_id: String,
    key_secret: String,
    currency: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
}

impl PaymentGateway {
    pub fn from_config(config: &GatewayConfig) -> Self {
        let mode = if config.mode == "online" {
            Mode::Online
        } else {
            Mode::Offline
        };
        Self {
            mode,
            base_url: config.base_url.clone(),
            key_id: config.key_id.clone(),
            key_secret: config.key_secret.clone(),
            currency: config.currency.clone(),
            client: reqwest::Client::new(),
        }
    }

    /// Public key identifier, returned to clients at checkout
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Currency code stamped on new orders
    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Create a gateway order for the given amount, returning the order
    /// reference
    pub async fn create_order(&self, amount: f64, receipt: &str) -> Result<String> {
        match self.mode {
            Mode::Offline => {
                let mut bytes = [0u8; 8];
                rand::thread_rng().fill_bytes(&mut bytes);
                let suffix: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
                let order_id = format!("order_{}", suffix);
                info!("Minted offline order {} for receipt {}", order_id, receipt);
                Ok(order_id)
            }
            Mode::Online => {
                let url = format!("{}/orders", self.base_url);
                let response = self
                    .client
                    .post(&url)
                    .basic_auth(&self.key_id, Some(&self.key_secret))
                    .json(&json!({
                        "amount": amount,
                        "currency": self.currency,
                        "receipt": receipt,
                    }))
                    .send()
                    .await
                    .context("Gateway order request failed")?;

                if !response.status().is_success() {
                    return Err(anyhow!(
                        "Gateway order creation failed with status {}",
                        response.status()
                    ));
                }

                let order: OrderResponse = response
                    .json()
                    .await
                    .context("Gateway order response was not valid JSON")?;
                Ok(order.id)
            }
        }
    }

    /// Check the callback signature over (order_id, payment_id)
    pub fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        self.sign(order_id, payment_id) == signature
    }

    /// Compute the expected signature for an order/payment pair
    pub fn sign(&self, order_id: &str, payment_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(order_id.as_bytes());
        hasher.update(b"|");
        hasher.update(payment_id.as_bytes());
        hasher.update(b"|");
        hasher.update(self.key_secret.as_bytes());
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_gateway() -> PaymentGateway {
        PaymentGateway::from_config(&GatewayConfig::default())
    }

    #[tokio::test]
    async fn offline_orders_are_unique() {
        let gateway = offline_gateway();
        let a = gateway.create_order(500.0, "r1").await.unwrap();
        let b = gateway.create_order(500.0, "r2").await.unwrap();

        assert!(a.starts_with("order_"));
        assert_ne!(a, b);
    }

    #[test]
    fn signature_round_trip() {
        let gateway = offline_gateway();
        let sig = gateway.sign("order_abc", "pay_def");

        assert!(gateway.verify_signature("order_abc", "pay_def", &sig));
        assert!(!gateway.verify_signature("order_abc", "pay_other", &sig));
        assert!(!gateway.verify_signature("order_abc", "pay_def", "forged"));
    }
}

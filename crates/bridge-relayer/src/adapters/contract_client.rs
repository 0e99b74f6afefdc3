//! # Contract Client
//!
//! The single path every contract call takes:
//!
//! ```text
//! msg ──pad──► EncryptedChannel ──timeout──► response
//!                   │
//!         query: retried with quadratic backoff
//!         execute: sent once, non-zero code => Execution error
//! ```

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::algorithms::pad_message;
use crate::config::ContractCallConfig;
use crate::domain::{RelayerError, TxResponse};
use crate::ports::{EncryptedChannel, TxFilter};
use crate::retry::ReadPolicy;

/// Client for one contract behind an encrypted channel.
pub struct ContractClient<C: EncryptedChannel> {
    channel: Arc<C>,
    address: String,
    config: ContractCallConfig,
    policy: ReadPolicy,
}

impl<C: EncryptedChannel> Clone for ContractClient<C> {
    fn clone(&self) -> Self {
        Self {
            channel: Arc::clone(&self.channel),
            address: self.address.clone(),
            config: self.config.clone(),
            policy: self.policy,
        }
    }
}

impl<C: EncryptedChannel> ContractClient<C> {
    /// Create a client for the contract at `address`.
    pub fn new(channel: Arc<C>, address: impl Into<String>, config: ContractCallConfig) -> Self {
        Self {
            channel,
            address: address.into(),
            policy: ReadPolicy::from_config(&config),
            config,
        }
    }

    /// Contract address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Address that signs executions.
    pub fn sender(&self) -> &str {
        self.channel.sender()
    }

    fn pad(&self, msg: Value) -> Result<Value, RelayerError> {
        pad_message(msg, self.config.block_size, self.config.min_padding_size)
    }

    /// Run a read-only query and decode the answer.
    pub async fn query<T: DeserializeOwned>(&self, msg: Value) -> Result<T, RelayerError> {
        let action = action_of(&msg)?;
        let padded = self.pad(msg)?;

        let answer = self
            .policy
            .read(&action, || self.channel.query(&self.address, padded.clone()))
            .await?;

        serde_json::from_value(answer).map_err(|e| {
            RelayerError::Serialization(format!("{action} answer did not decode: {e}"))
        })
    }

    /// Submit a state-changing message once.
    ///
    /// A response with a non-zero code becomes [`RelayerError::Execution`]
    /// carrying the unpadded request and the chain's log.
    pub async fn execute(&self, msg: Value, gas: Option<u64>) -> Result<TxResponse, RelayerError> {
        let action = action_of(&msg)?;
        let request = serde_json::to_string(&msg)?;
        let padded = self.pad(msg)?;

        let response = self
            .policy
            .submit(self.channel.execute(&self.address, padded, gas))
            .await?;

        if !response.is_success() {
            warn!(
                contract = %self.address,
                action = %action,
                code = response.code,
                log = %response.raw_log,
                "Execution rejected"
            );
            return Err(RelayerError::Execution {
                request,
                code: response.code,
                log: response.raw_log,
            });
        }

        debug!(
            contract = %self.address,
            action = %action,
            tx_hash = %response.tx_hash,
            gas_used = response.gas_used,
            "Execution accepted"
        );
        Ok(response)
    }

    /// This sender's recent executions of `action` on this contract.
    pub async fn recent_txs(&self, action: &str) -> Result<Vec<TxResponse>, RelayerError> {
        let filter = TxFilter {
            contract: self.address.clone(),
            sender: self.sender().to_string(),
            action: action.to_string(),
        };
        self.policy
            .read("recent_txs", || self.channel.recent_txs(&filter))
            .await
    }
}

/// First top-level key of an envelope message.
fn action_of(msg: &Value) -> Result<String, RelayerError> {
    msg.as_object()
        .and_then(|map| map.keys().next())
        .cloned()
        .ok_or_else(|| RelayerError::InvalidMessage(format!("expected {{\"action\": {{..}}}}, got {msg}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayerConfig;
    use crate::test_utils::MockChannel;
    use serde_json::json;

    fn client(channel: Arc<MockChannel>) -> ContractClient<MockChannel> {
        ContractClient::new(channel, "secret1contract", RelayerConfig::for_testing().contract)
    }

    #[tokio::test]
    async fn test_query_is_padded_and_decoded() {
        let channel = Arc::new(MockChannel::new());
        channel.on_query("best_header", |_| Ok(json!({ "height": 12 })));

        let answer: Value = client(Arc::clone(&channel))
            .query(json!({ "best_header": {} }))
            .await
            .unwrap();
        assert_eq!(answer["height"], 12);

        let sent = channel.queries();
        assert_eq!(sent.len(), 1);
        assert_eq!(serde_json::to_vec(&sent[0]).unwrap().len() % 256, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_retries_transient() {
        let channel = Arc::new(MockChannel::new());
        channel.fail_next_queries(2, RelayerError::Network("reset".into()));
        channel.on_query("best_header", |_| Ok(json!({})));

        let result: Result<Value, _> = client(Arc::clone(&channel))
            .query(json!({ "best_header": {} }))
            .await;
        assert!(result.is_ok());
        assert_eq!(channel.queries().len(), 3);
    }

    #[tokio::test]
    async fn test_execute_rejection_is_not_retried() {
        let channel = Arc::new(MockChannel::new());
        channel.push_execute_response(TxResponse {
            code: 11,
            raw_log: "out of gas".into(),
            ..Default::default()
        });

        let err = client(Arc::clone(&channel))
            .execute(json!({ "submit_headers": { "tip_height": 1 } }), Some(10))
            .await
            .unwrap_err();

        match err {
            RelayerError::Execution { request, code, log } => {
                assert_eq!(code, 11);
                assert_eq!(log, "out of gas");
                assert!(request.contains("submit_headers"));
                assert!(!request.contains("\"p\""));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(channel.executions().len(), 1);
        assert_eq!(channel.executions()[0].1, Some(10));
    }

    #[tokio::test]
    async fn test_execute_transport_error_surfaces_once() {
        let channel = Arc::new(MockChannel::new());
        channel.fail_next_executes(1, RelayerError::Network("broken pipe".into()));

        let err = client(Arc::clone(&channel))
            .execute(json!({ "append": {} }), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayerError::Network(_)));
        assert_eq!(channel.executions().len(), 1);
    }

    #[tokio::test]
    async fn test_message_without_envelope_is_rejected() {
        let channel = Arc::new(MockChannel::new());
        let err = client(channel).execute(json!([1, 2]), None).await.unwrap_err();
        assert!(matches!(err, RelayerError::InvalidMessage(_)));
    }
}

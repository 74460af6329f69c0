//! Single-node submission of Steem operations.

use std::sync::Arc;

use async_trait::async_trait;
use pyre_broadcast::{Confirmation, SubmissionError, Submitter};
use tracing::debug;

use crate::{Operation, PostingKey, SteemError, SteemRpc, Transaction, TransactionSigner};

/// Default lifetime of a transaction relative to the head block.
pub const DEFAULT_EXPIRATION_SECS: i64 = 60;

/// Submits operations to one node: reference its head block, sign, then
/// broadcast synchronously.
pub struct SteemSubmitter {
    rpc: SteemRpc,
    signer: Arc<dyn TransactionSigner>,
    expiration: chrono::Duration,
}

impl SteemSubmitter {
    pub fn new(rpc: SteemRpc, signer: Arc<dyn TransactionSigner>) -> Self {
        Self {
            rpc,
            signer,
            expiration: chrono::Duration::seconds(DEFAULT_EXPIRATION_SECS),
        }
    }

    pub fn with_expiration(mut self, expiration: chrono::Duration) -> Self {
        self.expiration = expiration;
        self
    }

    pub fn rpc(&self) -> &SteemRpc {
        &self.rpc
    }

    async fn submit_to(
        &self,
        endpoint: &str,
        operations: &[Operation],
        key: &PostingKey,
    ) -> Result<Confirmation, SteemError> {
        let props = self.rpc.dynamic_global_properties(endpoint).await?;
        let transaction = Transaction::from_head(&props, operations.to_vec(), self.expiration)?;
        debug!(
            endpoint,
            ref_block_num = transaction.ref_block_num,
            expiration = %transaction.expiration,
            "prepared transaction"
        );

        let signed = self.signer.sign(&transaction, key).await?;
        let result = self
            .rpc
            .broadcast_transaction_synchronous(endpoint, &signed)
            .await?;

        if result.expired {
            return Err(SteemError::InvalidResponse(format!(
                "transaction {} expired before inclusion",
                result.id
            )));
        }

        debug!(endpoint, id = %result.id, block_num = result.block_num, "transaction included");
        Ok(result.id)
    }
}

#[async_trait]
impl Submitter for SteemSubmitter {
    type Operation = Operation;
    type Credential = PostingKey;

    async fn submit(
        &self,
        endpoint: &str,
        operations: &[Operation],
        credential: &PostingKey,
    ) -> Result<Confirmation, SubmissionError> {
        self.submit_to(endpoint, operations, credential)
            .await
            .map_err(|e| e.into_submission_error(endpoint, self.rpc.timeout()))
    }
}

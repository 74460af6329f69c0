//! Transaction signing through an external program.
//!
//! pyre does not implement Steem's signature scheme. A signer program gets
//! the unsigned transaction, chain id and posting key as JSON on stdin and
//! prints the signed transaction as JSON on stdout.

use std::fmt;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::{STEEM_ADDRESS_PREFIX, SignedTransaction, SignerError, Transaction};

/// Default bound on one signer invocation.
const DEFAULT_SIGNER_TIMEOUT: Duration = Duration::from_secs(10);

/// A posting key in WIF form. Validated by the caller; opaque here.
#[derive(Clone, PartialEq, Eq)]
pub struct PostingKey(String);

impl PostingKey {
    pub fn new(wif: impl Into<String>) -> Self {
        Self(wif.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PostingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PostingKey(<redacted>)")
    }
}

impl fmt::Display for PostingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// Something that can attach signatures to a transaction.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    async fn sign(
        &self,
        transaction: &Transaction,
        key: &PostingKey,
    ) -> Result<SignedTransaction, SignerError>;
}

/// JSON document written to the signer's stdin.
#[derive(Serialize)]
struct SignRequest<'a> {
    chain_id: &'a str,
    address_prefix: &'a str,
    transaction: &'a Transaction,
    key: &'a str,
}

/// Signs by running an external program once per transaction.
#[derive(Debug, Clone)]
pub struct CommandSigner {
    program: String,
    args: Vec<String>,
    chain_id: String,
    timeout: Duration,
}

impl CommandSigner {
    pub fn new(program: impl Into<String>, args: Vec<String>, chain_id: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args,
            chain_id: chain_id.into(),
            timeout: DEFAULT_SIGNER_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl TransactionSigner for CommandSigner {
    async fn sign(
        &self,
        transaction: &Transaction,
        key: &PostingKey,
    ) -> Result<SignedTransaction, SignerError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        debug!(program = %self.program, operations = transaction.operations.len(), "invoking signer");

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SignerError::NotFound(self.program.clone())
            } else {
                SignerError::Io(e)
            }
        })?;

        let input = serde_json::to_string(&SignRequest {
            chain_id: &self.chain_id,
            address_prefix: STEEM_ADDRESS_PREFIX,
            transaction,
            key: key.expose(),
        })?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| SignerError::Timeout(self.timeout.as_millis() as u64))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(exit_code = ?output.status.code(), stderr = %stderr, "signer failed");
            return Err(SignerError::Failed {
                status: output.status.to_string(),
                stderr,
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let signed: SignedTransaction = serde_json::from_str(stdout.trim()).map_err(|e| {
            SignerError::InvalidOutput(format!("failed to parse signed transaction: {}", e))
        })?;

        if signed.signatures.is_empty() {
            return Err(SignerError::InvalidOutput(
                "signed transaction carries no signatures".to_string(),
            ));
        }
        if signed.ref_block_num != transaction.ref_block_num
            || signed.ref_block_prefix != transaction.ref_block_prefix
            || signed.operations.len() != transaction.operations.len()
        {
            return Err(SignerError::InvalidOutput(
                "signed transaction does not match the request".to_string(),
            ));
        }

        Ok(signed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transaction() -> Transaction {
        Transaction {
            ref_block_num: 17767,
            ref_block_prefix: 4022250974,
            expiration: "2026-10-19T12:01:00".to_string(),
            operations: vec![],
            extensions: vec![],
        }
    }

    fn sh(script: &str) -> CommandSigner {
        CommandSigner::new(
            "sh",
            vec!["-c".to_string(), script.to_string()],
            crate::STEEM_CHAIN_ID,
        )
    }

    #[test]
    fn test_posting_key_is_redacted() {
        let key = PostingKey::new("5JsecretsecretsecretsecretsecretsecretsecretsecretXX");
        assert_eq!(format!("{:?}", key), "PostingKey(<redacted>)");
        assert_eq!(key.to_string(), "<redacted>");
        assert!(key.expose().starts_with("5J"));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let signer = CommandSigner::new("pyre-definitely-not-a-signer", vec![], crate::STEEM_CHAIN_ID);
        let result = signer.sign(&transaction(), &PostingKey::new("5K")).await;
        assert!(matches!(result, Err(SignerError::NotFound(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_signer_output_is_parsed() {
        let signer = sh(r#"cat > /dev/null; echo '{"ref_block_num":17767,"ref_block_prefix":4022250974,"expiration":"2026-10-19T12:01:00","operations":[],"extensions":[],"signatures":["1f00"]}'"#);
        let signed = signer.sign(&transaction(), &PostingKey::new("5K")).await.unwrap();
        assert_eq!(signed.signatures, vec!["1f00".to_string()]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_signer_receives_request_on_stdin() {
        // Echo the key back inside a signature to prove it was passed through.
        let signer = sh(r#"input=$(cat); case "$input" in *'"key":"5Ktest"'*) sig=ok ;; *) sig=missing ;; esac; echo "{\"ref_block_num\":17767,\"ref_block_prefix\":4022250974,\"expiration\":\"x\",\"operations\":[],\"signatures\":[\"$sig\"]}""#);
        let signed = signer.sign(&transaction(), &PostingKey::new("5Ktest")).await.unwrap();
        assert_eq!(signed.signatures, vec!["ok".to_string()]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_failure() {
        let signer = sh("cat > /dev/null; echo 'bad key' >&2; exit 3");
        let result = signer.sign(&transaction(), &PostingKey::new("5K")).await;
        match result {
            Err(SignerError::Failed { stderr, .. }) => assert_eq!(stderr, "bad key"),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unsigned_output_rejected() {
        let signer = sh(r#"cat > /dev/null; echo '{"ref_block_num":17767,"ref_block_prefix":4022250974,"expiration":"x","operations":[],"signatures":[]}'"#);
        let result = signer.sign(&transaction(), &PostingKey::new("5K")).await;
        assert!(matches!(result, Err(SignerError::InvalidOutput(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_slow_signer_times_out() {
        let signer = sh("sleep 5").with_timeout(Duration::from_millis(100));
        let result = signer.sign(&transaction(), &PostingKey::new("5K")).await;
        assert!(matches!(result, Err(SignerError::Timeout(100))));
    }
}

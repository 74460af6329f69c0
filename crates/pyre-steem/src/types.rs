//! Steem chain and transaction types.

use chrono::{Duration, NaiveDateTime};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use pyre_broadcast::Confirmation;

use crate::SteemError;

/// Timestamp format used by condenser_api (UTC, no zone suffix).
pub const CHAIN_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Steem mainnet chain id.
pub const STEEM_CHAIN_ID: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Public key prefix for Steem mainnet.
pub const STEEM_ADDRESS_PREFIX: &str = "STM";

/// Account receiving burned rewards.
pub const BURN_ACCOUNT: &str = "null";

/// 100% in Steem basis points.
pub const FULL_WEIGHT: u16 = 10_000;

/// Subset of `condenser_api.get_dynamic_global_properties` needed for TaPoS.
#[derive(Debug, Clone, Deserialize)]
pub struct DynamicGlobalProperties {
    pub head_block_number: u32,
    pub head_block_id: String,
    pub time: String,
}

/// Subset of an account returned by `condenser_api.get_accounts`.
#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub name: String,
    /// Raw reputation. Nodes return it as a number or a numeric string.
    #[serde(default)]
    pub reputation: serde_json::Value,
    #[serde(default)]
    pub post_count: u64,
}

impl Account {
    /// Reputation on the familiar 25-based display scale.
    pub fn reputation_score(&self) -> Option<f64> {
        let raw = match &self.reputation {
            serde_json::Value::Number(n) => n.as_f64()?,
            serde_json::Value::String(s) => s.parse::<f64>().ok()?,
            _ => return None,
        };
        if raw == 0.0 {
            return Some(25.0);
        }
        let magnitude = (raw.abs().log10() - 9.0).max(0.0);
        let signed = if raw < 0.0 { -magnitude } else { magnitude };
        Some(signed * 9.0 + 25.0)
    }
}

/// A post or comment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentOperation {
    pub parent_author: String,
    pub parent_permlink: String,
    pub author: String,
    pub permlink: String,
    pub title: String,
    pub body: String,
    /// JSON-encoded metadata string.
    pub json_metadata: String,
}

/// Reward beneficiary and its share in basis points.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Beneficiary {
    pub account: String,
    pub weight: u16,
}

/// Extensions accepted by `comment_options`.
#[derive(Debug, Clone, PartialEq)]
pub enum CommentOptionsExtension {
    Beneficiaries(Vec<Beneficiary>),
}

impl Serialize for CommentOptionsExtension {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct BeneficiariesBody<'a> {
            beneficiaries: &'a [Beneficiary],
        }

        match self {
            CommentOptionsExtension::Beneficiaries(beneficiaries) => {
                (0u8, BeneficiariesBody { beneficiaries }).serialize(serializer)
            }
        }
    }
}

/// Payout options for a post, including beneficiaries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentOptionsOperation {
    pub author: String,
    pub permlink: String,
    pub max_accepted_payout: String,
    pub percent_steem_dollars: u16,
    pub allow_votes: bool,
    pub allow_curation_rewards: bool,
    pub extensions: Vec<CommentOptionsExtension>,
}

/// An upvote (positive weight) or downvote (negative weight).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoteOperation {
    pub voter: String,
    pub author: String,
    pub permlink: String,
    pub weight: i16,
}

/// Operations this agent knows how to build.
///
/// Serialized in condenser form: `["name", { ...fields }]`.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Comment(CommentOperation),
    CommentOptions(CommentOptionsOperation),
    Vote(VoteOperation),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Comment(_) => "comment",
            Operation::CommentOptions(_) => "comment_options",
            Operation::Vote(_) => "vote",
        }
    }
}

impl Serialize for Operation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Operation::Comment(op) => (self.name(), op).serialize(serializer),
            Operation::CommentOptions(op) => (self.name(), op).serialize(serializer),
            Operation::Vote(op) => (self.name(), op).serialize(serializer),
        }
    }
}

/// An unsigned transaction ready to hand to a signer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    pub ref_block_num: u16,
    pub ref_block_prefix: u32,
    pub expiration: String,
    pub operations: Vec<Operation>,
    pub extensions: Vec<serde_json::Value>,
}

impl Transaction {
    /// Build a transaction referencing the node's current head block.
    pub fn from_head(
        props: &DynamicGlobalProperties,
        operations: Vec<Operation>,
        expires_in: Duration,
    ) -> Result<Self, SteemError> {
        let head_time = NaiveDateTime::parse_from_str(&props.time, CHAIN_TIME_FORMAT)
            .map_err(|e| SteemError::InvalidResponse(format!("bad head block time {:?}: {}", props.time, e)))?;

        Ok(Self {
            ref_block_num: (props.head_block_number & 0xFFFF) as u16,
            ref_block_prefix: ref_block_prefix(&props.head_block_id)?,
            expiration: (head_time + expires_in).format(CHAIN_TIME_FORMAT).to_string(),
            operations,
            extensions: Vec::new(),
        })
    }
}

/// Read bytes 4..8 of a hex block id as a little-endian u32.
fn ref_block_prefix(block_id: &str) -> Result<u32, SteemError> {
    let hex = block_id
        .get(8..16)
        .ok_or_else(|| SteemError::InvalidResponse(format!("block id too short: {:?}", block_id)))?;

    let mut bytes = [0u8; 4];
    for (i, byte) in bytes.iter_mut().enumerate() {
        *byte = hex
            .get(i * 2..i * 2 + 2)
            .and_then(|pair| u8::from_str_radix(pair, 16).ok())
            .ok_or_else(|| SteemError::InvalidResponse(format!("block id is not hex: {:?}", block_id)))?;
    }

    Ok(u32::from_le_bytes(bytes))
}

/// A transaction with signatures attached, as returned by the signer.
///
/// Operations are kept as raw JSON; the node re-validates them anyway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub ref_block_num: u16,
    pub ref_block_prefix: u32,
    pub expiration: String,
    pub operations: Vec<serde_json::Value>,
    #[serde(default)]
    pub extensions: Vec<serde_json::Value>,
    pub signatures: Vec<String>,
}

/// Result of `condenser_api.broadcast_transaction_synchronous`.
#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastResult {
    pub id: Confirmation,
    #[serde(default)]
    pub block_num: u64,
    #[serde(default)]
    pub trx_num: u32,
    #[serde(default)]
    pub expired: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn props() -> DynamicGlobalProperties {
        DynamicGlobalProperties {
            head_block_number: 0x0123_4567,
            head_block_id: "01234567deadbeef00000000000000000000000000".to_string(),
            time: "2026-10-19T12:00:00".to_string(),
        }
    }

    #[test]
    fn test_transaction_from_head() {
        let tx = Transaction::from_head(&props(), vec![], Duration::seconds(60)).unwrap();

        assert_eq!(tx.ref_block_num, 0x4567);
        assert_eq!(tx.ref_block_prefix, u32::from_le_bytes([0xde, 0xad, 0xbe, 0xef]));
        assert_eq!(tx.expiration, "2026-10-19T12:01:00");
    }

    #[test]
    fn test_transaction_rejects_short_block_id() {
        let mut props = props();
        props.head_block_id = "0123".to_string();
        let result = Transaction::from_head(&props, vec![], Duration::seconds(60));
        assert!(matches!(result, Err(SteemError::InvalidResponse(_))));
    }

    #[test]
    fn test_transaction_rejects_bad_time() {
        let mut props = props();
        props.time = "yesterday".to_string();
        let result = Transaction::from_head(&props, vec![], Duration::seconds(60));
        assert!(matches!(result, Err(SteemError::InvalidResponse(_))));
    }

    #[test]
    fn test_operation_serializes_as_condenser_pair() {
        let op = Operation::Vote(VoteOperation {
            voter: "alice".to_string(),
            author: "alice".to_string(),
            permlink: "burn-pool-1".to_string(),
            weight: 10_000,
        });

        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            json!(["vote", {
                "voter": "alice",
                "author": "alice",
                "permlink": "burn-pool-1",
                "weight": 10000
            }])
        );
    }

    #[test]
    fn test_comment_options_beneficiary_extension() {
        let op = Operation::CommentOptions(CommentOptionsOperation {
            author: "alice".to_string(),
            permlink: "burn-pool-1".to_string(),
            max_accepted_payout: "1000000.000 SBD".to_string(),
            percent_steem_dollars: FULL_WEIGHT,
            allow_votes: true,
            allow_curation_rewards: true,
            extensions: vec![CommentOptionsExtension::Beneficiaries(vec![Beneficiary {
                account: BURN_ACCOUNT.to_string(),
                weight: FULL_WEIGHT,
            }])],
        });

        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value[0], "comment_options");
        assert_eq!(
            value[1]["extensions"],
            json!([[0, {"beneficiaries": [{"account": "null", "weight": 10000}]}]])
        );
    }

    #[test]
    fn test_reputation_score() {
        let account: Account = serde_json::from_value(json!({
            "name": "alice",
            "reputation": "95832978796820",
        }))
        .unwrap();
        let score = account.reputation_score().unwrap();
        assert!((score - 69.0).abs() < 1.0, "score was {}", score);

        let fresh: Account = serde_json::from_value(json!({"name": "bob", "reputation": 0})).unwrap();
        assert_eq!(fresh.reputation_score(), Some(25.0));

        let missing: Account = serde_json::from_value(json!({"name": "carol"})).unwrap();
        assert_eq!(missing.reputation_score(), None);
    }

    #[test]
    fn test_broadcast_result_decodes() {
        let result: BroadcastResult = serde_json::from_value(json!({
            "id": "a1b2c3",
            "block_num": 123,
            "trx_num": 4,
            "expired": false
        }))
        .unwrap();
        assert_eq!(result.id.as_str(), "a1b2c3");
        assert_eq!(result.block_num, 123);
    }
}

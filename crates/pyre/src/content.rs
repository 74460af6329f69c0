//! Post content and the operations that publish it.

use chrono::NaiveDateTime;
use serde_json::json;

use pyre_steem::{
    BURN_ACCOUNT, Beneficiary, CommentOperation, CommentOptionsExtension, CommentOptionsOperation,
    FULL_WEIGHT, Operation, VoteOperation,
};

/// Application tag written into `json_metadata`.
pub const APP_NAME: &str = concat!("pyre/", env!("CARGO_PKG_VERSION"));

/// Payout ceiling; effectively unlimited.
const MAX_ACCEPTED_PAYOUT: &str = "1000000.000 SBD";

/// Title, body and tags for one burn post.
#[derive(Debug, Clone, PartialEq)]
pub struct PostContent {
    pub title: String,
    pub body: String,
    pub tags: Vec<String>,
}

impl PostContent {
    /// Render a post for the given local time.
    pub fn generate(now: NaiveDateTime, tags: &[String], interval_hours: f64) -> Self {
        let title = format!("Burn Pool Contribution - {}", now.format("%B %-d, %Y"));
        let timestamp = now.format("%m/%d/%Y, %H:%M:%S");
        let cadence = describe_interval(interval_hours);

        let body = format!(
            r#"<center>

![fire](https://upload.wikimedia.org/wikipedia/commons/2/22/Animated_fire_by_nevit.gif)

# 🔥 Steem Burn Pool Contribution 🔥

</center>

This post is part of an automated burn pool initiative to reduce STEEM supply.

**Post Details:**
Date/Time: {timestamp}
100% of post rewards are sent to @{BURN_ACCOUNT} (burned)
This helps reduce inflation and benefits all STEEM holders

---

## What is STEEM Burning?

When rewards are sent to the @{BURN_ACCOUNT} account, those STEEM tokens are permanently removed from circulation. This deflationary mechanism helps:

Reduce overall STEEM supply
Increase scarcity
Potentially support token value
Benefit the entire Steem community

---

## Automated Contribution

This post is created automatically every {cadence} as part of a continuous burn pool initiative.

*Together, we make STEEM stronger! 💪*

---

*Posted via {APP_NAME}*"#
        );

        Self {
            title,
            body,
            tags: tags.to_vec(),
        }
    }

    /// Category the post is filed under.
    pub fn category(&self) -> &str {
        self.tags.first().map(String::as_str).unwrap_or("burnpost")
    }
}

fn describe_interval(hours: f64) -> String {
    if hours == 1.0 {
        "hour".to_string()
    } else if hours.fract() == 0.0 {
        format!("{} hours", hours as u64)
    } else {
        format!("{} hours", hours)
    }
}

/// Unique permlink derived from a millisecond timestamp.
pub fn permlink(timestamp_millis: i64) -> String {
    format!("burn-pool-{}", timestamp_millis)
}

pub fn post_url(username: &str, permlink: &str) -> String {
    format!("https://steemit.com/@{}/{}", username, permlink)
}

/// Build the comment, its burn beneficiary options and an optional self-vote.
pub fn build_operations(
    username: &str,
    permlink: &str,
    content: &PostContent,
    self_vote: bool,
) -> Vec<Operation> {
    let metadata = json!({
        "tags": content.tags,
        "app": APP_NAME,
    });

    let mut operations = vec![
        Operation::Comment(CommentOperation {
            parent_author: String::new(),
            parent_permlink: content.category().to_string(),
            author: username.to_string(),
            permlink: permlink.to_string(),
            title: content.title.clone(),
            body: content.body.clone(),
            json_metadata: metadata.to_string(),
        }),
        Operation::CommentOptions(CommentOptionsOperation {
            author: username.to_string(),
            permlink: permlink.to_string(),
            max_accepted_payout: MAX_ACCEPTED_PAYOUT.to_string(),
            percent_steem_dollars: FULL_WEIGHT,
            allow_votes: true,
            allow_curation_rewards: true,
            extensions: vec![CommentOptionsExtension::Beneficiaries(vec![Beneficiary {
                account: BURN_ACCOUNT.to_string(),
                weight: FULL_WEIGHT,
            }])],
        }),
    ];

    if self_vote {
        operations.push(Operation::Vote(VoteOperation {
            voter: username.to_string(),
            author: username.to_string(),
            permlink: permlink.to_string(),
            weight: FULL_WEIGHT as i16,
        }));
    }

    operations
}

//! Posting daemon: wires config, broadcaster and scheduler together.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, Utc};
use miette::Result;
use tokio::sync::watch;
use tracing::{error, info, warn};

use pyre_broadcast::{BroadcastOutcome, BroadcastRequest, Submitter, TransactionBroadcaster};
use pyre_scheduler::{IntervalScheduler, JobStatus, ScheduledJob};
use pyre_steem::{Account, CommandSigner, Operation, PostingKey, SteemError, SteemRpc, SteemSubmitter};

use crate::config::Config;
use crate::content::{self, PostContent};

/// How the job publishes what it generates.
enum Mode<S: Submitter> {
    /// Log the post instead of broadcasting it.
    DryRun,
    Live {
        broadcaster: TransactionBroadcaster<S>,
        key: PostingKey,
    },
}

/// Generates and broadcasts one burn post per execution.
pub struct BurnPostJob<S: Submitter> {
    username: String,
    tags: Vec<String>,
    interval_hours: f64,
    self_vote: bool,
    mode: Mode<S>,
}

impl<S> BurnPostJob<S>
where
    S: Submitter<Operation = Operation, Credential = PostingKey>,
{
    pub fn live(config: &Config, broadcaster: TransactionBroadcaster<S>) -> Self {
        Self::with_mode(
            config,
            Mode::Live {
                broadcaster,
                key: config.posting_key(),
            },
        )
    }

    pub fn dry_run(config: &Config) -> Self {
        Self::with_mode(config, Mode::DryRun)
    }

    fn with_mode(config: &Config, mode: Mode<S>) -> Self {
        Self {
            username: config.username.clone(),
            tags: config.tags.clone(),
            interval_hours: config.interval_hours,
            self_vote: config.self_vote,
            mode,
        }
    }

    fn display_username(&self) -> &str {
        if self.username.is_empty() {
            "TEST_USER"
        } else {
            &self.username
        }
    }
}

#[async_trait]
impl<S> ScheduledJob for BurnPostJob<S>
where
    S: Submitter<Operation = Operation, Credential = PostingKey> + 'static,
{
    fn name(&self) -> &str {
        "burn-post"
    }

    async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), String> {
        let post = PostContent::generate(Local::now().naive_local(), &self.tags, self.interval_hours);
        let permlink = content::permlink(Utc::now().timestamp_millis());
        let url = content::post_url(self.display_username(), &permlink);

        let (broadcaster, key) = match &mut self.mode {
            Mode::DryRun => {
                info!(
                    title = %post.title,
                    permlink = %permlink,
                    tags = %post.tags.join(", "),
                    body_chars = post.body.chars().count(),
                    url = %url,
                    "dry run: would publish post"
                );
                return Ok(());
            }
            Mode::Live { broadcaster, key } => (broadcaster, key),
        };

        let operations = content::build_operations(&self.username, &permlink, &post, self.self_vote);
        let request = BroadcastRequest::new(operations, key.clone()).map_err(|e| e.to_string())?;

        info!(title = %post.title, permlink = %permlink, "publishing burn post");

        match broadcaster.broadcast(&request, &mut shutdown).await {
            Ok(BroadcastOutcome::Success {
                confirmation,
                attempts,
            }) => {
                info!(url = %url, transaction_id = %confirmation, attempts, "burn post published");
                Ok(())
            }
            Ok(BroadcastOutcome::Failure {
                last_error,
                attempts,
            }) => {
                error!(error = %last_error, attempts, "failed to publish burn post");
                Err(format!("broadcast failed after {} attempts: {}", attempts, last_error))
            }
            Err(interrupted) => {
                warn!(
                    attempt = interrupted.attempt,
                    endpoint = %interrupted.endpoint,
                    "broadcast interrupted, outcome unknown"
                );
                Err(interrupted.to_string())
            }
        }
    }
}

/// Look up the configured account on `endpoint`.
pub async fn verify_account(
    rpc: &SteemRpc,
    endpoint: &str,
    username: &str,
) -> std::result::Result<Account, SteemError> {
    let accounts = rpc.get_accounts(endpoint, &[username]).await?;
    let account = accounts
        .into_iter()
        .find(|a| a.name == username)
        .ok_or_else(|| SteemError::InvalidResponse(format!("account @{} not found", username)))?;

    info!(
        account = %account.name,
        reputation = ?account.reputation_score(),
        posts = account.post_count,
        "account verified"
    );
    Ok(account)
}

fn load_config(path: &Path, dry_run: bool) -> Result<Config> {
    let mut config = Config::load(path).map_err(|e| miette::miette!("{}", e))?;
    if dry_run {
        config.dry_run = true;
    }
    config.validate().map_err(|e| miette::miette!("{}", e))?;
    Ok(config)
}

fn build_submitter(config: &Config) -> Result<SteemSubmitter> {
    let timeout = config.request_timeout().map_err(|e| miette::miette!("{}", e))?;
    let signer = config
        .signer
        .as_ref()
        .ok_or_else(|| miette::miette!("signer.command is required"))?;
    let (program, args) = signer
        .command
        .split_first()
        .ok_or_else(|| miette::miette!("signer.command is empty"))?;

    let signer = CommandSigner::new(program.clone(), args.to_vec(), config.chain_id.clone())
        .with_timeout(Duration::from_secs(signer.timeout_secs));

    Ok(SteemSubmitter::new(SteemRpc::new(timeout), Arc::new(signer)))
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}

/// Run the daemon until a shutdown signal arrives.
pub async fn run(config_path: &Path, dry_run: bool) -> Result<()> {
    let config = load_config(config_path, dry_run)?;

    let pool = config.endpoint_pool().map_err(|e| miette::miette!("{}", e))?;
    let policy = config.broadcast_policy().map_err(|e| miette::miette!("{}", e))?;
    let interval = config.interval().map_err(|e| miette::miette!("{}", e))?;
    let scheduler = IntervalScheduler::new(interval)
        .map_err(|e| miette::miette!("{}", e))?
        .run_immediately(config.post_immediately);

    info!(
        account = %config.username,
        nodes = pool.len(),
        interval_hours = config.interval_hours,
        dry_run = config.dry_run,
        "starting pyre"
    );

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        wait_for_signal().await;
        info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    let record = if config.dry_run {
        warn!("dry run mode: posts are logged, not broadcast");
        let job = BurnPostJob::<SteemSubmitter>::dry_run(&config);
        scheduler.run(job, shutdown_rx).await
    } else {
        let submitter = build_submitter(&config)?;

        // Verification only informs; it never rotates or aborts startup.
        if let Err(e) = verify_account(submitter.rpc(), pool.current(), &config.username).await {
            warn!(endpoint = %pool.current(), error = %e, "account verification failed, continuing");
        }

        let broadcaster = TransactionBroadcaster::new(pool, policy, submitter);
        let job = BurnPostJob::live(&config, broadcaster);
        scheduler.run(job, shutdown_rx).await
    };

    if let JobStatus::Failed { error } = &record.status {
        warn!(error = %error, "last post attempt failed before shutdown");
    }
    info!(posts_attempted = record.runs, "pyre shut down gracefully");
    Ok(())
}

/// Validate the config and confirm the account exists.
pub async fn check(config_path: &Path) -> Result<()> {
    let config = load_config(config_path, false)?;
    let pool = config.endpoint_pool().map_err(|e| miette::miette!("{}", e))?;
    let rpc = SteemRpc::new(config.request_timeout().map_err(|e| miette::miette!("{}", e))?);

    let account = verify_account(&rpc, pool.current(), &config.username)
        .await
        .map_err(|e| miette::miette!("account check against {} failed: {}", pool.current(), e))?;

    println!("Configuration OK");
    println!("  account:  @{}", account.name);
    println!("  nodes:    {}", pool.endpoints().join(", "));
    println!("  interval: every {} hours", config.interval_hours);
    Ok(())
}

/// Print the post that would be published now.
pub fn preview(config_path: &Path) -> Result<()> {
    let config = if config_path.exists() {
        Config::load(config_path).map_err(|e| miette::miette!("{}", e))?
    } else {
        Config::from_json("{}").map_err(|e| miette::miette!("{}", e))?
    };

    let post = PostContent::generate(Local::now().naive_local(), &config.tags, config.interval_hours);
    let permlink = content::permlink(Utc::now().timestamp_millis());

    println!("Title:    {}", post.title);
    println!("Permlink: {}", permlink);
    println!("Tags:     {}", post.tags.join(", "));
    println!();
    println!("{}", post.body);
    Ok(())
}

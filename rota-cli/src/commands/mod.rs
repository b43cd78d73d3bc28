//! CLI command implementations

pub mod heal;
pub mod pr;
pub mod stats;
pub mod team;
pub mod user;

pub use heal::HealArgs;
pub use pr::PrArgs;
pub use stats::StatsArgs;
pub use team::TeamArgs;
pub use user::UserArgs;

use std::sync::Arc;

use rota_core::{
    AssignmentEngine, Config, Directory, HealingEngine, OperationContext, PullRequestWithReviewers,
};
use rota_db::{Database, DatabaseConfig, SqliteStore};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Engines wired to the configured database
pub struct App {
    pub assignment: AssignmentEngine<SqliteStore>,
    pub healing: HealingEngine<SqliteStore>,
    pub directory: Directory<SqliteStore>,
    timeout: Option<std::time::Duration>,
    cancel: CancellationToken,
    json: bool,
}

impl App {
    /// Open the database and build the engines
    pub async fn open(config: &Config, json: bool) -> anyhow::Result<Self> {
        let db = Database::open(DatabaseConfig::from(config.database.clone()))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to open database: {}", e))?;
        let store = Arc::new(db.store());

        // Ctrl-C cancels whatever operation is in flight
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        });

        Ok(Self {
            assignment: AssignmentEngine::new(Arc::clone(&store), config.assignment),
            healing: HealingEngine::new(Arc::clone(&store), config.assignment),
            directory: Directory::new(store),
            timeout: config.operation.timeout,
            cancel,
            json,
        })
    }

    /// Fresh context per operation so each one gets the full timeout
    pub fn context(&self) -> OperationContext {
        OperationContext::new()
            .with_cancellation(self.cancel.clone())
            .with_optional_timeout(self.timeout)
    }

    /// Print `value` as JSON when requested, otherwise run `human`
    pub fn emit<T: Serialize>(&self, value: &T, human: impl FnOnce(&T)) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            human(value);
        }
        Ok(())
    }
}

pub(crate) fn print_pull_request(pr: &PullRequestWithReviewers) {
    let p = &pr.pull_request;
    println!("{} [{}] {}", p.pull_request_id, p.status, p.pull_request_name);
    println!("  author: {}", p.author_id);
    println!("  created: {}", p.created_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(merged_at) = p.merged_at {
        println!("  merged: {}", merged_at.format("%Y-%m-%d %H:%M:%S"));
    }
    if pr.reviewers.is_empty() {
        println!("  reviewers: (none)");
    } else {
        println!("  reviewers:");
        for r in &pr.reviewers {
            println!(
                "    {} (since {})",
                r.user_id,
                r.assigned_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
    }
}

//! Heal command - sweep inactive reviewers off open pull requests

use clap::Args;

use super::App;

/// Replace inactive reviewers on open pull requests
#[derive(Args, Debug)]
pub struct HealArgs {
    /// Only heal reviews held by this (inactive) user
    #[arg(long)]
    user: Option<String>,
}

impl HealArgs {
    pub async fn execute(&self, app: &App) -> anyhow::Result<()> {
        let ctx = app.context();
        let report = match &self.user {
            Some(user_id) => app.healing.heal_after_user_deactivation(&ctx, user_id).await?,
            None => app.healing.heal_inactive_reviewers(&ctx).await?,
        };

        app.emit(&report, |r| {
            if r.is_empty() {
                println!("Nothing to heal");
                return;
            }
            for s in &r.replacements {
                println!("  {}: {} -> {}", s.pull_request_id, s.old_user_id, s.new_user_id);
            }
            for s in &r.removals {
                println!("  {}: removed {}", s.pull_request_id, s.user_id);
            }
        })
    }
}

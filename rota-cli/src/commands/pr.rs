//! Pull request commands - creation, merge and reviewer changes

use clap::{Args, Subcommand};
use rota_core::PullRequestStatus;

use super::{print_pull_request, App};

/// Create pull requests and change their reviewers
#[derive(Args, Debug)]
pub struct PrArgs {
    #[command(subcommand)]
    command: PrCommand,
}

#[derive(Subcommand, Debug)]
enum PrCommand {
    /// Create a pull request and auto-assign reviewers
    Create {
        /// Pull request id
        id: String,

        /// Pull request title
        name: String,

        /// Author user id
        #[arg(short, long)]
        author: String,

        /// Reviewers to assign (defaults to the configured count)
        #[arg(short, long)]
        reviewers: Option<usize>,
    },

    /// Mark a pull request merged
    Merge {
        /// Pull request id
        id: String,
    },

    /// List pull requests by status
    List {
        /// OPEN or MERGED
        #[arg(short, long, default_value = "open", value_parser = parse_status)]
        status: PullRequestStatus,
    },

    /// Show a pull request and its reviewers
    Show {
        /// Pull request id
        id: String,
    },

    /// Add a specific reviewer
    Assign {
        /// Pull request id
        id: String,

        /// Reviewer user id
        user_id: String,
    },

    /// Add least-loaded reviewers from the author's team
    AutoAssign {
        /// Pull request id
        id: String,

        /// Reviewers to add
        #[arg(short, long, default_value_t = 1)]
        count: usize,
    },

    /// Remove a reviewer without replacement
    Remove {
        /// Pull request id
        id: String,

        /// Reviewer user id
        user_id: String,
    },

    /// Swap one reviewer for another
    Replace {
        /// Pull request id
        id: String,

        /// Reviewer to remove
        old_user_id: String,

        /// Reviewer to add
        new_user_id: String,
    },

    /// Swap a reviewer for the least-loaded eligible teammate
    Reassign {
        /// Pull request id
        id: String,

        /// Reviewer to replace
        old_user_id: String,
    },
}

/// Parse a status name, ignoring case
fn parse_status(s: &str) -> Result<PullRequestStatus, String> {
    s.to_uppercase()
        .parse()
        .map_err(|e: rota_core::Error| e.to_string())
}

impl PrArgs {
    pub async fn execute(&self, app: &App) -> anyhow::Result<()> {
        let ctx = app.context();
        match &self.command {
            PrCommand::Create {
                id,
                name,
                author,
                reviewers,
            } => {
                let target =
                    reviewers.unwrap_or(app.assignment.config().reviewers_per_pull_request);
                let pr = app
                    .assignment
                    .create_and_auto_assign(&ctx, id, name, author, target)
                    .await?;
                app.emit(&pr, print_pull_request)
            }
            PrCommand::Merge { id } => {
                let pr = app.directory.merge_pull_request(&ctx, id).await?;
                app.emit(&pr, print_pull_request)
            }
            PrCommand::List { status } => {
                let prs = app.directory.pull_requests_by_status(&ctx, *status).await?;
                app.emit(&prs, |prs| {
                    for p in prs {
                        println!(
                            "{:<16} {:<8} {:<16} {}",
                            p.pull_request_id,
                            p.status.as_str(),
                            p.author_id,
                            p.pull_request_name
                        );
                    }
                })
            }
            PrCommand::Show { id } => {
                let pr = app.directory.pull_request(&ctx, id).await?;
                app.emit(&pr, print_pull_request)
            }
            PrCommand::Assign { id, user_id } => {
                let assignment = app.assignment.assign_reviewer(&ctx, id, user_id).await?;
                app.emit(&assignment, |a| {
                    println!("Assigned {} to {}", a.user_id, a.pull_request_id)
                })
            }
            PrCommand::AutoAssign { id, count } => {
                let added = app.assignment.auto_assign(&ctx, id, *count).await?;
                app.emit(&added, |added| {
                    for a in added {
                        println!("Assigned {} to {}", a.user_id, a.pull_request_id);
                    }
                })
            }
            PrCommand::Remove { id, user_id } => {
                app.assignment.remove_reviewer(&ctx, id, user_id).await?;
                app.emit(&serde_json::json!({ "removed": user_id }), |_| {
                    println!("Removed {} from {}", user_id, id)
                })
            }
            PrCommand::Replace {
                id,
                old_user_id,
                new_user_id,
            } => {
                let assignment = app
                    .assignment
                    .replace_reviewer(&ctx, id, old_user_id, new_user_id)
                    .await?;
                app.emit(&assignment, |a| {
                    println!("Replaced {} with {} on {}", old_user_id, a.user_id, a.pull_request_id)
                })
            }
            PrCommand::Reassign { id, old_user_id } => {
                let assignment = app.assignment.reassign_reviewer(&ctx, id, old_user_id).await?;
                app.emit(&assignment, |a| {
                    println!("Replaced {} with {} on {}", old_user_id, a.user_id, a.pull_request_id)
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status("open").unwrap(), PullRequestStatus::Open);
        assert_eq!(parse_status("MERGED").unwrap(), PullRequestStatus::Merged);
        assert!(parse_status("closed").is_err());
    }
}

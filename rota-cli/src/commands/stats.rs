//! Stats commands - workload, assignment and pull request reporting

use clap::{Args, Subcommand};

use super::App;

/// Show workload and assignment statistics
#[derive(Args, Debug)]
pub struct StatsArgs {
    #[command(subcommand)]
    command: StatsCommand,
}

#[derive(Subcommand, Debug)]
enum StatsCommand {
    /// Open reviews per user
    Workload,

    /// Members, pull requests and review slots per team
    Teams,

    /// Assignment history per user
    Assignments,

    /// Reviewer count per pull request
    Prs,
}

impl StatsArgs {
    pub async fn execute(&self, app: &App) -> anyhow::Result<()> {
        let ctx = app.context();
        match self.command {
            StatsCommand::Workload => {
                let rows = app.directory.user_workloads(&ctx).await?;
                app.emit(&rows, |rows| {
                    println!("{:<16} {:<16} {:<8} OPEN", "USER", "TEAM", "ACTIVE");
                    for r in rows {
                        println!(
                            "{:<16} {:<16} {:<8} {}",
                            r.user_id, r.team_name, r.is_active, r.open_reviews
                        );
                    }
                })
            }
            StatsCommand::Teams => {
                let rows = app.directory.team_stats(&ctx).await?;
                app.emit(&rows, |rows| {
                    println!("{:<16} {:>8} {:>8} {:>8} {:>8}", "TEAM", "MEMBERS", "ACTIVE", "PRS", "REVIEWS");
                    for r in rows {
                        println!(
                            "{:<16} {:>8} {:>8} {:>8} {:>8}",
                            r.team_name,
                            r.total_members,
                            r.active_members,
                            r.pull_requests_authored,
                            r.review_assignments
                        );
                    }
                })
            }
            StatsCommand::Assignments => {
                let rows = app.directory.assignment_stats(&ctx).await?;
                app.emit(&rows, |rows| {
                    println!("{:<16} {:>8} {:>8} {:>8}", "USER", "TOTAL", "OPEN", "MERGED");
                    for r in rows {
                        println!(
                            "{:<16} {:>8} {:>8} {:>8}",
                            r.user_id, r.total_assignments, r.open_assignments, r.merged_assignments
                        );
                    }
                })
            }
            StatsCommand::Prs => {
                let rows = app.directory.pull_request_stats(&ctx).await?;
                app.emit(&rows, |rows| {
                    println!("{:<16} {:<8} {:<16} {:>9}", "PR", "STATUS", "AUTHOR", "REVIEWERS");
                    for r in rows {
                        println!(
                            "{:<16} {:<8} {:<16} {:>9}",
                            r.pull_request_id,
                            r.status.as_str(),
                            r.author_id,
                            r.reviewer_count
                        );
                    }
                })
            }
        }
    }
}

//! Team commands - upsert, show, deactivate

use clap::{Args, Subcommand};
use rota_core::TeamMember;

use super::App;

/// Manage teams and their members
#[derive(Args, Debug)]
pub struct TeamArgs {
    #[command(subcommand)]
    command: TeamCommand,
}

#[derive(Subcommand, Debug)]
enum TeamCommand {
    /// Create a team or update its members
    Add {
        /// Team name
        name: String,

        /// Member as `id:name`, or `id:name:inactive` (repeatable)
        #[arg(short, long = "member", value_parser = parse_member)]
        members: Vec<TeamMember>,
    },

    /// Show a team and its members
    Get {
        /// Team name
        name: String,
    },

    /// Deactivate every member and rebalance their open reviews
    Deactivate {
        /// Team name
        name: String,
    },
}

/// Parse `id:name[:active|inactive]`
fn parse_member(s: &str) -> Result<TeamMember, String> {
    let mut parts = s.splitn(3, ':');
    let id = parts.next().filter(|p| !p.is_empty());
    let name = parts.next().filter(|p| !p.is_empty());
    let (Some(id), Some(name)) = (id, name) else {
        return Err(format!("expected id:name[:inactive], got '{}'", s));
    };

    let is_active = match parts.next() {
        None | Some("active") => true,
        Some("inactive") => false,
        Some(other) => return Err(format!("unknown member state '{}'", other)),
    };
    Ok(TeamMember::new(id, name).with_active(is_active))
}

impl TeamArgs {
    pub async fn execute(&self, app: &App) -> anyhow::Result<()> {
        match &self.command {
            TeamCommand::Add { name, members } => {
                let result = app.directory.upsert_team(&app.context(), name, members).await?;
                app.emit(&result, |r| {
                    println!(
                        "Team '{}' now has {} members",
                        r.team.team.team_name,
                        r.team.members.len()
                    );
                    for s in &r.healing.replacements {
                        println!(
                            "  {}: {} -> {}",
                            s.pull_request_id, s.old_user_id, s.new_user_id
                        );
                    }
                    for s in &r.healing.removals {
                        println!("  {}: removed {}", s.pull_request_id, s.user_id);
                    }
                })
            }
            TeamCommand::Get { name } => {
                let team = app.directory.team(&app.context(), name).await?;
                app.emit(&team, |t| {
                    println!("{} ({} members)", t.team.team_name, t.members.len());
                    for m in &t.members {
                        let state = if m.is_active { "active" } else { "inactive" };
                        println!("  {:<16} {:<24} {}", m.user_id, m.username, state);
                    }
                })
            }
            TeamCommand::Deactivate { name } => {
                let report = app
                    .healing
                    .heal_after_team_deactivation(&app.context(), name)
                    .await?;
                app.emit(&report, |r| {
                    println!(
                        "Deactivated {} users in '{}', filled {} reviewer slots",
                        r.deactivated_users, r.team_name, r.reassigned
                    );
                    if !r.under_reviewed.is_empty() {
                        println!("Still under-reviewed: {}", r.under_reviewed.join(", "));
                    }
                })
            }
        }
    }
}

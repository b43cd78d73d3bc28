//! User commands - activation and review listing

use clap::{Args, Subcommand};

use super::App;

/// Manage users
#[derive(Args, Debug)]
pub struct UserArgs {
    #[command(subcommand)]
    command: UserCommand,
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    /// Mark a user active
    Activate {
        /// User id
        user_id: String,
    },

    /// Mark a user inactive and hand their open reviews to teammates
    Deactivate {
        /// User id
        user_id: String,
    },

    /// List pull requests the user reviews
    Reviews {
        /// User id
        user_id: String,
    },
}

impl UserArgs {
    pub async fn execute(&self, app: &App) -> anyhow::Result<()> {
        match &self.command {
            UserCommand::Activate { user_id } => {
                let user = app.directory.activate_user(&app.context(), user_id).await?;
                app.emit(&user, |u| println!("User '{}' is active", u.user_id))
            }
            UserCommand::Deactivate { user_id } => {
                let (user, report) = app.healing.deactivate_user(&app.context(), user_id).await?;
                app.emit(&report, |r| {
                    println!(
                        "User '{}' is inactive: {} reviews reassigned, {} removed",
                        user.user_id,
                        r.replacements.len(),
                        r.removals.len()
                    );
                })
            }
            UserCommand::Reviews { user_id } => {
                let reviews = app.directory.reviews_of(&app.context(), user_id).await?;
                app.emit(&reviews, |prs| {
                    if prs.is_empty() {
                        println!("No reviews for '{}'", user_id);
                    }
                    for pr in prs {
                        println!(
                            "  {:<16} {:<7} {}",
                            pr.pull_request_id,
                            pr.status.as_str(),
                            pr.pull_request_name
                        );
                    }
                })
            }
        }
    }
}

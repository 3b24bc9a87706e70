use chrono::Utc;
use clap::Subcommand;
use serde_json::json;
use uuid::Uuid;

use crate::auth::generate_jwt;
use crate::cli::context::open_state;
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum TokenCommands {
    #[command(about = "Issue a bearer token for an existing user")]
    Issue {
        #[arg(help = "User ID")]
        user_id: Uuid,
    },
}

pub async fn handle(cmd: TokenCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        TokenCommands::Issue { user_id } => {
            let state = open_state().await?;
            let user = state
                .store
                .find_user(user_id)
                .await?
                .filter(|user| !user.is_deleted())
                .ok_or_else(|| anyhow::anyhow!("User '{}' not found", user_id))?;

            let token = generate_jwt(&state.config.security, &user, Utc::now())?;

            match output_format {
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&json!({
                            "success": true,
                            "token": token,
                            "user_id": user.id,
                            "email": user.email,
                            "expires_in_hours": state.config.security.jwt_expiry_hours,
                        }))?
                    );
                }
                OutputFormat::Text => println!("{}", token),
            }
            Ok(())
        }
    }
}

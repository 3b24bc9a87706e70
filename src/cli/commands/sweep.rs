use serde_json::json;

use crate::cli::context::open_state;
use crate::cli::utils::{output_collection, output_empty_collection, output_success};
use crate::cli::OutputFormat;

pub async fn handle(dry_run: bool, output_format: OutputFormat) -> anyhow::Result<()> {
    let state = open_state().await?;

    if dry_run {
        let users = state.approvals.find_users_needing_reapproval().await?;
        if users.is_empty() {
            return output_empty_collection(&output_format, "users", "No users past the inactivity threshold");
        }

        match output_format {
            OutputFormat::Json => output_collection("users", serde_json::to_value(&users)?)?,
            OutputFormat::Text => {
                println!("{:<38} {:<32} {}", "ID", "EMAIL", "LAST ACTIVE");
                println!("{}", "-".repeat(90));
                for user in &users {
                    println!(
                        "{:<38} {:<32} {}",
                        user.id,
                        user.email,
                        user.activity_anchor().format("%Y-%m-%d %H:%M")
                    );
                }
            }
        }
        return Ok(());
    }

    let summary = state.approvals.process_approval_expiry().await?;
    output_success(
        &output_format,
        &format!(
            "Approval expiry sweep finished: {} moved to pending, {} failed",
            summary.processed, summary.errors
        ),
        Some(json!({ "summary": summary })),
    )
}

use anyhow::Context;
use clap::Subcommand;
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use uuid::Uuid;

use crate::cli::context::open_state;
use crate::cli::utils::{or_dash, output_collection, output_empty_collection, output_success};
use crate::cli::OutputFormat;
use crate::database::models::Role;
use crate::services::{PermissionUpdate, RequestOrigin};

#[derive(Subcommand)]
pub enum PermissionCommands {
    #[command(about = "List role permissions")]
    List {
        #[arg(long, help = "Only show rows for this role (leader, co-leader, member)")]
        role: Option<String>,
    },

    #[command(about = "Upsert role permissions from a YAML file")]
    Seed {
        #[arg(help = "YAML file with a top-level `permissions` list")]
        file: PathBuf,

        #[arg(long, help = "Admin user recorded as the author of each change")]
        actor: Uuid,
    },
}

#[derive(Debug, Deserialize)]
struct SeedFile {
    permissions: Vec<PermissionUpdate>,
}

fn parse_seed(raw: &str) -> anyhow::Result<Vec<PermissionUpdate>> {
    let file: SeedFile = serde_yaml::from_str(raw)?;
    Ok(file.permissions)
}

pub async fn handle(cmd: PermissionCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        PermissionCommands::List { role } => {
            let role = role.map(|r| r.parse::<Role>()).transpose()?;
            let state = open_state().await?;
            let permissions = state.permissions.list_role_permissions(role).await?;

            if permissions.is_empty() {
                return output_empty_collection(&output_format, "permissions", "No role permissions defined");
            }

            match output_format {
                OutputFormat::Json => output_collection("permissions", serde_json::to_value(&permissions)?)?,
                OutputFormat::Text => {
                    println!("{:<10} {:<36} {:<10} {:<8} {}", "ROLE", "RESOURCE", "ACTION", "ALLOWED", "DESCRIPTION");
                    println!("{}", "-".repeat(90));
                    for p in &permissions {
                        println!(
                            "{:<10} {:<36} {:<10} {:<8} {}",
                            p.role,
                            p.resource,
                            p.action,
                            p.allowed,
                            or_dash(p.description.as_deref())
                        );
                    }
                }
            }
            Ok(())
        }
        PermissionCommands::Seed { file, actor } => {
            let raw = std::fs::read_to_string(&file).with_context(|| format!("failed to read {}", file.display()))?;
            let updates = parse_seed(&raw).with_context(|| format!("invalid seed file {}", file.display()))?;

            let state = open_state().await?;
            let origin = RequestOrigin {
                ip_address: None,
                user_agent: Some(format!("opsctl/{}", env!("CARGO_PKG_VERSION"))),
            };

            let mut applied = Vec::with_capacity(updates.len());
            for update in updates {
                let subject = format!("{}:{}", update.role, update.resource);
                let change = state
                    .permissions
                    .update_role_permission(actor, update, &origin)
                    .await
                    .with_context(|| format!("failed to apply {}", subject))?;
                if let OutputFormat::Text = output_format {
                    println!(
                        "{:<8} {}:{}:{} allowed={}",
                        change.change_type.as_str(),
                        change.permission.role,
                        change.permission.resource,
                        change.permission.action,
                        change.permission.allowed
                    );
                }
                applied.push(change);
            }

            output_success(
                &output_format,
                &format!("Seeded {} role permissions", applied.len()),
                Some(json!({ "changes": applied })),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_files_default_the_action() {
        let raw = r#"
permissions:
  - role: leader
    resource: /tools/dispatch
    allowed: true
    description: Dispatch board
  - role: co-leader
    resource: /units/members
    action: view
    allowed: true
    reason: Leads review their roster
"#;
        let updates = parse_seed(raw).unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].role, Role::Leader);
        assert!(updates[0].action.is_none());
        assert_eq!(updates[1].action.as_deref(), Some("view"));
        assert_eq!(updates[1].reason.as_deref(), Some("Leads review their roster"));
    }

    #[test]
    fn unknown_roles_are_rejected() {
        assert!(parse_seed("permissions:\n  - role: owner\n    resource: /x\n    allowed: true\n").is_err());
    }
}

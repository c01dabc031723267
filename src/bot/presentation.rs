//! Renders records and results as chat messages.

use chrono::{DateTime, Utc};

use super::command_dispatcher::CommandError;
use super::interactions::VpsAction;
use crate::chat::{
    ActionRow, ButtonStyle, COLOR_BLUE, COLOR_GREEN, Component, Embed,
    OutgoingMessage, SelectOption,
};
use crate::db::{VpsRecord, VpsStatus};
use crate::docker::ContainerState;
use crate::provisioning::{NodeInfo, SessionInfo, VerifiedListing, VpsError};
use crate::version::VERSION;

/// Discord caps an embed at 25 fields.
const MAX_EMBED_FIELDS: usize = 25;

pub const NO_VPS: &str = "❌ You don't have a VPS. Ask an admin to create one.";

pub fn status_label(status: VpsStatus) -> &'static str {
    match status {
        VpsStatus::Running => "🟢 Running",
        VpsStatus::Stopped => "🔴 Stopped",
    }
}

fn state_label(state: Option<&ContainerState>) -> &'static str {
    match state {
        Some(state) if state.is_running() => "🟢 Running",
        Some(_) => "🔴 Stopped",
        None => "⚪ Unknown",
    }
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn resources(record: &VpsRecord) -> String {
    format!(
        "{}GB RAM, {} CPU, {}GB Disk",
        record.quota.ram, record.quota.cpu, record.quota.disk
    )
}

pub fn help_embed(prefix: &str, is_admin: bool) -> Embed {
    let basic = [
        ("list", "List your VPS instances"),
        ("manage_vps [vps_id]", "Manage your VPS"),
        ("connect_vps <vps_id>", "Get a fresh SSH session in your DMs"),
        ("check_ram <vps_id>", "Check RAM usage of your VPS"),
        ("start_vps <vps_id>", "Start your VPS"),
        ("stop_vps <vps_id>", "Stop your VPS"),
        ("restart_vps <vps_id>", "Restart your VPS"),
        ("reinstall_vps <vps_id> <image>", "Reinstall your VPS with another OS"),
        ("transfer_vps <vps_id> <@user>", "Give your VPS to another user"),
        ("delete_vps <vps_id>", "Delete your VPS"),
        ("node", "Show node information"),
        ("credits", "Show credits and license"),
    ];
    let admin = [
        ("create_vps <ram_gb> <cpu> <disk_gb> [@owner]", "Create a new VPS"),
        ("vps_list", "List all VPS instances and prune stale ones"),
        ("delete_all", "Delete every VPS instance"),
    ];

    let mut embed = Embed::new("Available Commands", COLOR_BLUE).field(
        "Basic Commands",
        command_lines(prefix, &basic),
        false,
    );
    if is_admin {
        embed = embed.field("Admin Commands", command_lines(prefix, &admin), false);
    }
    embed
}

fn command_lines(prefix: &str, commands: &[(&str, &str)]) -> String {
    commands
        .iter()
        .map(|(usage, about)| format!("`{prefix}{usage}` - {about}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn credits_embed() -> Embed {
    Embed::new("VPS Deployer Bot", COLOR_BLUE)
        .description("A Discord bot for managing VPS instances with Docker containers.")
        .field(
            "Developer Credits",
            "**Developed by:** DpWorld\n**Discord ID:** dpworld\n**GitHub:** https://github.com/dpworld\n**Discord:** https://discord.gg/dpworld",
            false,
        )
        .field(
            "License",
            "**MIT License**\nCopyright (c) 2024 DpWorld\n\nPermission is hereby granted, free of charge, to any person obtaining a copy of this software to deal in the Software without restriction, subject to the conditions of the MIT License.\n\nTHE SOFTWARE IS PROVIDED \"AS IS\", WITHOUT WARRANTY OF ANY KIND.",
            false,
        )
        .field(
            "Features",
            "• Create and manage VPS instances\n• Resource monitoring\n• Secure SSH access via tmate\n• Systemd support\n• Docker container management",
            false,
        )
        .footer(format!("Version {VERSION}"))
}

pub fn node_embed(info: &NodeInfo) -> Embed {
    Embed::new("🖥️ Node Information", COLOR_BLUE)
        .field("Docker Version", info.docker_version.clone(), true)
        .field("Network", info.network.clone(), true)
        .field("VPS Instances", info.total_vps.to_string(), true)
        .field("Running", info.running_vps.to_string(), true)
        .footer(format!("Bot version {VERSION}"))
}

pub fn owner_list_embed(records: &[VpsRecord]) -> Embed {
    let mut embed = Embed::new("📋 Your VPS", COLOR_BLUE).description("Here are your VPS details:");
    for record in records.iter().take(MAX_EMBED_FIELDS) {
        embed = embed.field(
            format!("VPS {}", record.id),
            format!(
                "Status: {}\nImage: {}\nCreated: {}\nResources: {}",
                status_label(record.status),
                record.image,
                timestamp(&record.created_at),
                resources(record)
            ),
            false,
        );
    }
    embed
}

/// `owners` pairs each record with its owner's display name.
pub fn admin_list_embed(entries: &[(VpsRecord, String)]) -> Embed {
    let mut embed = Embed::new("📋 VPS List (Admin View)", COLOR_BLUE)
        .description("Here are all the VPS instances:");
    for (record, owner) in entries.iter().take(MAX_EMBED_FIELDS) {
        embed = embed.field(
            format!("VPS {} ({owner})", record.id),
            format!(
                "Status: {}\nCreated: {}\nResources: {}",
                status_label(record.status),
                timestamp(&record.created_at),
                resources(record)
            ),
            false,
        );
    }
    if entries.len() > MAX_EMBED_FIELDS {
        embed = embed.footer(format!("Showing {MAX_EMBED_FIELDS} of {}", entries.len()));
    }
    embed
}

/// `owners` is parallel to `listing.entries`.
pub fn verified_list_embed(listing: &VerifiedListing, owners: &[String]) -> Embed {
    let mut embed = Embed::new("All VPS Instances", COLOR_BLUE);
    for (entry, owner) in listing.entries.iter().zip(owners).take(MAX_EMBED_FIELDS) {
        let record = &entry.record;
        embed = embed.field(
            format!("VPS {}", record.id),
            format!(
                "Owner: {owner}\nStatus: {}\nMemory: {}GB\nCPU: {} cores\nDisk: {}GB\nUsername: {}\nImage: {}\nCreated: {}",
                state_label(entry.state.as_ref()),
                record.quota.ram,
                record.quota.cpu,
                record.quota.disk,
                record.username,
                record.image,
                timestamp(&record.created_at),
            ),
            false,
        );
    }
    let mut footer = format!("Total VPS instances: {}", listing.entries.len());
    if !listing.pruned.is_empty() {
        footer.push_str(&format!(" • Removed {} stale record(s)", listing.pruned.len()));
    }
    embed.footer(footer)
}

pub fn created_embed(info: &SessionInfo) -> Embed {
    let record = &info.record;
    Embed::new("🎉 VPS Created Successfully!", COLOR_GREEN)
        .description("Here are your VPS credentials:")
        .field("Username", record.username.clone(), false)
        .field("Password", record.password.clone(), false)
        .field("VPS ID", record.id.clone(), false)
        .field(
            "Resources",
            format!(
                "RAM: {}GB\nCPU: {} cores\nDisk: {}GB",
                record.quota.ram, record.quota.cpu, record.quota.disk
            ),
            false,
        )
        .field("Image", record.image.clone(), false)
        .field("Created At", timestamp(&record.created_at), false)
        .field("SSH Command", format!("```{}```", info.session), false)
}

/// Connection details after start, restart, connect or reinstall.
pub fn session_embed(title: &str, description: &str, info: &SessionInfo) -> Embed {
    Embed::new(title, COLOR_GREEN)
        .description(description)
        .field("VPS ID", info.record.id.clone(), false)
        .field("SSH Command", format!("```{}```", info.session), false)
        .field("Username", info.record.username.clone(), false)
        .field("Password", info.record.password.clone(), false)
}

pub fn ram_embed(vps_id: &str, usage: &str) -> Embed {
    Embed::new(format!("📊 RAM Usage for VPS {vps_id}"), COLOR_BLUE)
        .description(format!("```\n{}\n```", usage.trim_end()))
}

pub fn manage_message(record: &VpsRecord, state: Option<&ContainerState>) -> OutgoingMessage {
    let embed = Embed::new("🎮 VPS Management", COLOR_BLUE).description(format!(
        "VPS ID: {}\nStatus: {}\nImage: {}\nResources: {}",
        record.id,
        state_label(state),
        record.image,
        resources(record)
    ));
    let button = |label: &str, style: ButtonStyle, action: VpsAction| Component::Button {
        label: label.to_string(),
        style,
        custom_id: action.custom_id(&record.id),
    };
    OutgoingMessage::embed(embed).with_components(vec![ActionRow {
        components: vec![
            button("Start VPS", ButtonStyle::Success, VpsAction::Start),
            button("Stop VPS", ButtonStyle::Danger, VpsAction::Stop),
            button("Restart VPS", ButtonStyle::Primary, VpsAction::Restart),
            button("Reinstall OS", ButtonStyle::Secondary, VpsAction::Reinstall),
            button("Delete VPS", ButtonStyle::Danger, VpsAction::Delete),
        ],
    }])
}

fn image_label(image: &str) -> (String, Option<String>) {
    match image {
        "ubuntu:22.04" => ("Ubuntu 22.04".to_string(), Some("Latest LTS version".to_string())),
        "ubuntu:20.04" => ("Ubuntu 20.04".to_string(), Some("Previous LTS version".to_string())),
        "debian:12" => ("Debian 12".to_string(), Some("Latest Debian stable".to_string())),
        "debian:11" => ("Debian 11".to_string(), Some("Previous Debian stable".to_string())),
        other => (other.to_string(), None),
    }
}

pub fn os_select_message(vps_id: &str, images: &[String]) -> OutgoingMessage {
    let options = images
        .iter()
        .map(|image| {
            let (label, description) = image_label(image);
            SelectOption {
                label,
                value: image.clone(),
                description,
            }
        })
        .collect();
    OutgoingMessage::text("Select an operating system to reinstall:")
        .with_components(vec![ActionRow {
            components: vec![Component::Select {
                custom_id: VpsAction::SelectOs.custom_id(vps_id),
                placeholder: "Select OS to install".to_string(),
                options,
            }],
        }])
        .ephemeral()
}

pub fn delete_all_prompt() -> OutgoingMessage {
    OutgoingMessage::text(
        "⚠️ Are you sure you want to delete ALL VPS instances? This action cannot be undone! Type 'yes' to confirm.",
    )
}

pub fn vps_error_text(error: &VpsError) -> String {
    match error {
        VpsError::AlreadyInState(VpsStatus::Running) => "✅ VPS is already running!".to_string(),
        VpsError::AlreadyInState(VpsStatus::Stopped) => "✅ VPS is already stopped!".to_string(),
        VpsError::NotFound(_) => "❌ VPS not found!".to_string(),
        VpsError::AlreadyHasVps { .. } => {
            "❌ That user already has a VPS. Please delete the existing VPS first.".to_string()
        }
        other => format!("❌ {other}"),
    }
}

pub fn command_error_text(error: &CommandError, prefix: &str) -> String {
    match error {
        CommandError::Usage(usage) => format!("❌ Usage: `{prefix}{usage}`"),
        CommandError::PermissionDenied | CommandError::NotOwner => format!("❌ {error}"),
        CommandError::Vps(e) => vps_error_text(e),
        CommandError::Chat(e) => format!("❌ Error talking to Discord: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ResourceQuota;

    fn record() -> VpsRecord {
        VpsRecord {
            id: "AB12CD34".to_string(),
            owner_id: "1001".to_string(),
            container_id: "c0ffee".to_string(),
            container_name: "vps_AB12CD34".to_string(),
            image: "ubuntu:22.04".to_string(),
            quota: ResourceQuota { ram: 2, cpu: 1, disk: 5 },
            username: "alice".to_string(),
            password: "p4ssw0rdp4ss".to_string(),
            created_at: Utc::now(),
            status: VpsStatus::Running,
            tmate_session: None,
        }
    }

    #[test]
    fn test_help_hides_admin_section() {
        assert_eq!(help_embed("!", false).fields.len(), 1);
        let admin = help_embed("!", true);
        assert_eq!(admin.fields.len(), 2);
        assert!(admin.fields[1].value.contains("`!create_vps"));
    }

    #[test]
    fn test_manage_message_buttons() {
        let message = manage_message(&record(), Some(&ContainerState::Running));
        let ids: Vec<String> = message.components[0]
            .components
            .iter()
            .filter_map(|c| match c {
                Component::Button { custom_id, .. } => Some(custom_id.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(
            ids,
            vec![
                "vps:start:AB12CD34",
                "vps:stop:AB12CD34",
                "vps:restart:AB12CD34",
                "vps:reinstall:AB12CD34",
                "vps:delete:AB12CD34",
            ]
        );
        assert!(message.embeds[0].description.as_deref().unwrap().contains("🟢 Running"));
    }

    #[test]
    fn test_os_select_labels() {
        let images = vec!["debian:12".to_string(), "alpine:3".to_string()];
        let message = os_select_message("AB12CD34", &images);
        assert!(message.is_ephemeral());
        let Component::Select { options, custom_id, .. } = &message.components[0].components[0] else {
            panic!("expected a select menu");
        };
        assert_eq!(custom_id, "vps:os:AB12CD34");
        assert_eq!(options[0].label, "Debian 12");
        assert_eq!(options[1].label, "alpine:3");
        assert!(options[1].description.is_none());
    }

    #[test]
    fn test_error_texts() {
        assert_eq!(
            command_error_text(&CommandError::PermissionDenied, "!"),
            "❌ You don't have permission to use this command!"
        );
        assert_eq!(
            command_error_text(&CommandError::Usage("check_ram <vps_id>".to_string()), "!"),
            "❌ Usage: `!check_ram <vps_id>`"
        );
        assert_eq!(
            vps_error_text(&VpsError::AlreadyInState(VpsStatus::Stopped)),
            "✅ VPS is already stopped!"
        );
    }

    #[test]
    fn test_verified_list_footer_mentions_pruning() {
        let listing = VerifiedListing {
            entries: vec![crate::provisioning::VerifiedVps {
                record: record(),
                state: Some(ContainerState::Exited),
            }],
            pruned: vec!["ZZ99ZZ99".to_string()],
        };
        let embed = verified_list_embed(&listing, &["alice".to_string()]);
        assert!(embed.fields[0].value.contains("🔴 Stopped"));
        assert_eq!(
            embed.footer.unwrap().text,
            "Total VPS instances: 1 • Removed 1 stale record(s)"
        );
    }
}

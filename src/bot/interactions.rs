//! Button presses and select menu choices on the management message.

use tracing::{error, info, warn};

use super::command_dispatcher::CommandError;
use super::presentation;
use super::progress::InteractionProgress;
use super::state::AppState;
use crate::chat::{ComponentInteraction, OutgoingMessage};
use crate::notifications::{AuditAction, AuditEvent};
use crate::provisioning::VpsError;

/// What a management component asks for. Custom ids look like
/// `vps:<action>:<vps_id>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VpsAction {
    Start,
    Stop,
    Restart,
    Reinstall,
    Delete,
    SelectOs,
}

impl VpsAction {
    fn as_str(self) -> &'static str {
        match self {
            VpsAction::Start => "start",
            VpsAction::Stop => "stop",
            VpsAction::Restart => "restart",
            VpsAction::Reinstall => "reinstall",
            VpsAction::Delete => "delete",
            VpsAction::SelectOs => "os",
        }
    }

    pub fn custom_id(self, vps_id: &str) -> String {
        format!("vps:{}:{vps_id}", self.as_str())
    }

    pub fn parse(custom_id: &str) -> Option<(Self, String)> {
        let mut parts = custom_id.splitn(3, ':');
        if parts.next()? != "vps" {
            return None;
        }
        let action = match parts.next()? {
            "start" => VpsAction::Start,
            "stop" => VpsAction::Stop,
            "restart" => VpsAction::Restart,
            "reinstall" => VpsAction::Reinstall,
            "delete" => VpsAction::Delete,
            "os" => VpsAction::SelectOs,
            _ => return None,
        };
        let vps_id = parts.next().filter(|id| !id.is_empty())?;
        Some((action, vps_id.to_string()))
    }
}

pub async fn handle_component(state: &AppState, interaction: &ComponentInteraction) {
    let Some((action, vps_id)) = VpsAction::parse(&interaction.custom_id) else {
        warn!(custom_id = %interaction.custom_id, "Ignoring unknown component.");
        return;
    };
    info!(action = ?action, vps_id = %vps_id, user = %interaction.user.id, "Handling component interaction.");

    if let Err(e) = run(state, interaction, action, &vps_id).await {
        error!(action = ?action, vps_id = %vps_id, error = %e, "Component interaction failed.");
    }
}

async fn run(
    state: &AppState,
    interaction: &ComponentInteraction,
    action: VpsAction,
    vps_id: &str,
) -> Result<(), CommandError> {
    let chat = state.chat.as_ref();
    let token = &interaction.token;

    let record = match state.orchestrator.get(vps_id).await {
        Ok(record) => record,
        Err(VpsError::NotFound(_)) => {
            let reply = OutgoingMessage::text("❌ VPS not found!").ephemeral();
            chat.respond(token, &reply).await?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    // The buttons are only for the owner, admins use the commands.
    if !record.is_owned_by(&interaction.user.id) {
        let reply = OutgoingMessage::text("❌ This is not your VPS!").ephemeral();
        chat.respond(token, &reply).await?;
        return Ok(());
    }

    if action == VpsAction::Reinstall {
        let menu =
            presentation::os_select_message(vps_id, &state.orchestrator.settings().allowed_images);
        chat.respond(token, &menu).await?;
        return Ok(());
    }

    chat.defer(token, true).await?;
    let progress = InteractionProgress::new(chat, token);
    let actor = interaction.user.id.as_str();

    let outcome = match action {
        VpsAction::Start => state.orchestrator.start(vps_id, &progress).await.map(|info| {
            OutgoingMessage::embed(presentation::session_embed(
                "🚀 VPS Started Successfully!",
                "Your VPS is running. Use the session below to connect.",
                &info,
            ))
        }),
        VpsAction::Stop => state
            .orchestrator
            .stop(vps_id)
            .await
            .map(|_| OutgoingMessage::text("✅ VPS stopped successfully!")),
        VpsAction::Restart => state.orchestrator.restart(vps_id, &progress).await.map(|info| {
            OutgoingMessage::embed(presentation::session_embed(
                "🔄 VPS Restarted Successfully!",
                "Your VPS has been restarted. Use the new session below to connect.",
                &info,
            ))
        }),
        VpsAction::Delete => state.orchestrator.delete(vps_id).await.map(|deleted| {
            state.audit(AuditEvent::new(
                AuditAction::Deleted,
                Some(&deleted.id),
                actor,
                format!("owner {} via button", deleted.owner_id),
            ));
            OutgoingMessage::text(format!("✅ VPS {vps_id} has been deleted."))
        }),
        VpsAction::SelectOs => match interaction.values.first() {
            Some(image) => state
                .orchestrator
                .reinstall(vps_id, image, &progress)
                .await
                .map(|info| {
                    state.audit(AuditEvent::new(
                        AuditAction::Reinstalled,
                        Some(vps_id),
                        actor,
                        format!("image {image}"),
                    ));
                    OutgoingMessage::embed(presentation::session_embed(
                        "✅ VPS Reinstalled Successfully!",
                        &format!("Your VPS now runs {image}."),
                        &info,
                    ))
                }),
            None => Err(VpsError::Validation("No operating system selected.".to_string())),
        },
        VpsAction::Reinstall => return Ok(()),
    };

    let reply = match outcome {
        Ok(message) => message,
        Err(e) => {
            warn!(action = ?action, vps_id = %vps_id, error = %e, "VPS action failed.");
            OutgoingMessage::text(presentation::vps_error_text(&e))
        }
    };
    chat.edit_original(token, &OutgoingMessage::text("Done.").ephemeral())
        .await?;
    chat.follow_up(token, &reply.ephemeral()).await?;
    Ok(())
}

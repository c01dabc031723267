use super::command_dispatcher::CommandError;
use crate::db::VpsRecord;

/// Who may invoke a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Basic,
    Admin,
}

pub fn is_admin(admin_role_id: Option<u64>, roles: &[String]) -> bool {
    match admin_role_id {
        Some(role_id) => {
            let role_id = role_id.to_string();
            roles.iter().any(|role| *role == role_id)
        }
        None => false,
    }
}

pub fn check_access(access: Access, admin: bool) -> Result<(), CommandError> {
    match access {
        Access::Basic => Ok(()),
        Access::Admin if admin => Ok(()),
        Access::Admin => Err(CommandError::PermissionDenied),
    }
}

/// Owners manage their own VPS; admins manage any.
pub fn ensure_owner_or_admin(record: &VpsRecord, user_id: &str, admin: bool) -> Result<(), CommandError> {
    if admin || record.is_owned_by(user_id) {
        Ok(())
    } else {
        Err(CommandError::NotOwner)
    }
}

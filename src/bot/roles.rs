//! Control de acceso por roles de DJ.
//!
//! Los roles se comparan por nombre. Tener el rol de baneo pesa más que tener
//! el rol de DJ.

use std::fmt;

use crate::error::MusicError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoDjReason {
    NotDj,
    DjBanned,
    /// No se pudieron leer los roles del miembro
    Other,
}

/// Decide si un miembro puede usar los comandos.
///
/// `member_roles` es `None` cuando no hay datos del miembro.
pub fn cannot_dj(
    dj_role: Option<&str>,
    dj_ban_role: Option<&str>,
    member_roles: Option<&[String]>,
) -> Option<NoDjReason> {
    let Some(roles) = member_roles else {
        return Some(NoDjReason::Other);
    };
    let has = |name: &str| roles.iter().any(|role| role == name);

    if dj_ban_role.is_some_and(has) {
        return Some(NoDjReason::DjBanned);
    }
    if dj_role.is_some_and(|role| !has(role)) {
        return Some(NoDjReason::NotDj);
    }
    None
}

/// Texto que explica al usuario por qué no puede ser DJ.
pub struct DjReasonText<'a> {
    pub reason: NoDjReason,
    pub dj_role: Option<&'a str>,
    pub dj_ban_role: Option<&'a str>,
}

impl fmt::Display for DjReasonText<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            NoDjReason::NotDj => write!(
                f,
                "you lack the {} role that enables you to DJ. You have yet to prove yourself worthy.",
                self.dj_role.unwrap_or_default()
            ),
            NoDjReason::DjBanned => write!(
                f,
                "you have been banned from DJing with the {} role. You must have really bad taste.",
                self.dj_ban_role.unwrap_or_default()
            ),
            NoDjReason::Other => write!(
                f,
                "there was an error checking your DJ permissions, try again later."
            ),
        }
    }
}

/// Chequeo completo: devuelve el error listo para responder.
pub fn check_dj(
    dj_role: Option<&str>,
    dj_ban_role: Option<&str>,
    member_roles: Option<&[String]>,
) -> Result<(), MusicError> {
    match cannot_dj(dj_role, dj_ban_role, member_roles) {
        None => Ok(()),
        Some(reason) => Err(MusicError::PermissionDenied(format!(
            "Sorry, {}",
            DjReasonText {
                reason,
                dj_role,
                dj_ban_role,
            }
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn roles(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn test_no_roles_configured() {
        assert_eq!(cannot_dj(None, None, Some(&roles(&["Member"]))), None);
    }

    #[test]
    fn test_missing_member_is_other() {
        assert_eq!(cannot_dj(None, None, None), Some(NoDjReason::Other));
    }

    #[test]
    fn test_dj_role_required() {
        let member = roles(&["Member"]);
        assert_eq!(cannot_dj(Some("DJ"), None, Some(&member)), Some(NoDjReason::NotDj));

        let dj = roles(&["Member", "DJ"]);
        assert_eq!(cannot_dj(Some("DJ"), None, Some(&dj)), None);
    }

    #[test]
    fn test_ban_overrides_dj() {
        let both = roles(&["DJ", "No DJ"]);
        assert_eq!(
            cannot_dj(Some("DJ"), Some("No DJ"), Some(&both)),
            Some(NoDjReason::DjBanned)
        );
        let banned = roles(&["No DJ"]);
        assert_eq!(
            cannot_dj(None, Some("No DJ"), Some(&banned)),
            Some(NoDjReason::DjBanned)
        );
    }

    fn denial(result: Result<(), MusicError>) -> String {
        match result {
            Err(MusicError::PermissionDenied(text)) => text,
            other => panic!("se esperaba un rechazo, llegó {:?}", other),
        }
    }

    #[test]
    fn test_reason_messages() {
        assert_eq!(
            denial(check_dj(Some("DJ"), None, Some(&roles(&[])))),
            "Sorry, you lack the DJ role that enables you to DJ. You have yet to prove yourself worthy."
        );

        assert_eq!(
            denial(check_dj(None, Some("Muted"), Some(&roles(&["Muted"])))),
            "Sorry, you have been banned from DJing with the Muted role. You must have really bad taste."
        );

        assert_eq!(
            denial(check_dj(None, None, None)),
            "Sorry, there was an error checking your DJ permissions, try again later."
        );
    }
}

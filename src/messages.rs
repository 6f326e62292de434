use crate::error::{EditRejection, RemoteError, SessionError};
use crate::model::Language;
use serde::Serialize;

/// User-facing notification shown after an interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UserMessage {
    QuotaLocal { limit: usize },
    QuotaRemote { limit: usize },
    PriorityExhausted,
    CellLocked { reason: String },
    NotEditable,
    NoticesPending,
    WeekClosed,
    LoginAgain,
    AdminOnly,
    SaveFailed,
    LockActionFailed,
}

pub fn default_lock_reason(lang: Language) -> &'static str {
    match lang {
        Language::En => "This day is locked by management.",
        Language::Es => "Este día está bloqueado por administración.",
    }
}

impl UserMessage {
    pub fn text(&self, lang: Language) -> String {
        use Language::{En, Es};
        match (self, lang) {
            (UserMessage::QuotaLocal { limit }, En) => {
                format!("You can only enter {limit} requests per week.")
            }
            (UserMessage::QuotaLocal { limit }, Es) => {
                format!("Solo puedes introducir {limit} peticiones por semana.")
            }
            (UserMessage::QuotaRemote { limit }, En) => {
                format!("Max {limit} requests per week. Clear one day to pick another.")
            }
            (UserMessage::QuotaRemote { limit }, Es) => {
                format!("Máximo {limit} peticiones por semana. Borra un día para elegir otro.")
            }
            (UserMessage::PriorityExhausted, En) => {
                "No more strong preferences available.\nUse O or add a comment.".to_string()
            }
            (UserMessage::PriorityExhausted, Es) => {
                "No quedan preferencias fuertes.\nUsa O o añade un comentario.".to_string()
            }
            (UserMessage::CellLocked { reason }, _) => reason.clone(),
            (UserMessage::NotEditable, En) => "This day cannot be edited.".to_string(),
            (UserMessage::NotEditable, Es) => "Este día no se puede editar.".to_string(),
            (UserMessage::NoticesPending, En) => {
                "Please read and acknowledge the new notices first.".to_string()
            }
            (UserMessage::NoticesPending, Es) => {
                "Lee y confirma primero los avisos nuevos.".to_string()
            }
            (UserMessage::WeekClosed, En) => "This week is closed for requests.".to_string(),
            (UserMessage::WeekClosed, Es) => {
                "Esta semana está cerrada para peticiones.".to_string()
            }
            (UserMessage::LoginAgain, En) => "Missing session PIN. Log in again.".to_string(),
            (UserMessage::LoginAgain, Es) => {
                "Falta el PIN de sesión. Vuelve a iniciar sesión.".to_string()
            }
            (UserMessage::AdminOnly, En) => "Admin only.".to_string(),
            (UserMessage::AdminOnly, Es) => "Solo administradores.".to_string(),
            (UserMessage::SaveFailed, En) => "Save failed.".to_string(),
            (UserMessage::SaveFailed, Es) => "No se pudo guardar.".to_string(),
            (UserMessage::LockActionFailed, En) => "Lock action failed.".to_string(),
            (UserMessage::LockActionFailed, Es) => {
                "No se pudo cambiar el bloqueo.".to_string()
            }
        }
    }

    pub fn for_rejection(r: &EditRejection) -> Self {
        match r {
            EditRejection::NotEditable => UserMessage::NotEditable,
            EditRejection::NoticesPending => UserMessage::NoticesPending,
            EditRejection::Locked { reason } => UserMessage::CellLocked {
                reason: reason.clone(),
            },
            EditRejection::Quota { limit, .. } => UserMessage::QuotaLocal { limit: *limit },
            EditRejection::PriorityExhausted => UserMessage::PriorityExhausted,
        }
    }

    /// Message for a write the store refused after the optimistic update.
    pub fn for_remote(e: &RemoteError) -> Self {
        match e {
            RemoteError::QuotaExceeded { limit } => UserMessage::QuotaRemote { limit: *limit },
            RemoteError::PrioritySlotExhausted => UserMessage::PriorityExhausted,
            RemoteError::Unauthorized(_) => UserMessage::LoginAgain,
            RemoteError::Locked => UserMessage::CellLocked {
                reason: String::new(),
            },
            RemoteError::WeekClosed => UserMessage::WeekClosed,
            RemoteError::NotFound(_) | RemoteError::Invalid(_) | RemoteError::Unknown(_) => {
                UserMessage::SaveFailed
            }
        }
    }

    pub fn for_session(e: &SessionError) -> Self {
        match e {
            SessionError::NotLoggedIn | SessionError::LoginRequired => UserMessage::LoginAgain,
            SessionError::AdminOnly => UserMessage::AdminOnly,
            SessionError::Remote(RemoteError::Unauthorized(_)) => UserMessage::LoginAgain,
            SessionError::Remote(_) | SessionError::NoPeriod | SessionError::UnknownDate(_) => {
                UserMessage::LockActionFailed
            }
        }
    }

    /// Like `text`, but a locked cell with no stored reason gets the default.
    pub fn render(&self, lang: Language) -> String {
        match self {
            UserMessage::CellLocked { reason } if reason.trim().is_empty() => {
                default_lock_reason(lang).to_string()
            }
            other => other.text(lang),
        }
    }
}

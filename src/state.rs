use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::{
    config::AppConfig,
    generation::GenerationMap,
    models::{format_timestamp, Appointment, Role},
    schedule::{Board, BoardKey},
    store::Store,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub config: Arc<AppConfig>,
    pub events: broadcast::Sender<ServerEvent>,
    pub sessions: broadcast::Sender<SessionEvent>,
    pub boards: Arc<GenerationMap<BoardKey, Board>>,
}

impl AppState {
    pub fn new(store: Store, config: AppConfig) -> Self {
        let (events, _) = broadcast::channel(100);
        let (sessions, _) = broadcast::channel(32);
        Self {
            store,
            config: Arc::new(config),
            events,
            sessions,
            boards: Arc::new(GenerationMap::default()),
        }
    }

    /// Subscribes to sign-in / sign-out notifications.
    pub fn on_session_change(&self) -> broadcast::Receiver<SessionEvent> {
        self.sessions.subscribe()
    }

    pub fn publish_session(&self, event: SessionEvent) {
        // No receivers is fine.
        let _ = self.sessions.send(event);
    }

    pub fn publish(&self, event: ServerEvent) {
        let _ = self.events.send(event);
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn { user_id: String, role: Role },
    SignedOut { user_id: String },
}

#[derive(Clone, Debug, Serialize)]
pub struct ServerEvent {
    pub kind: String,
    pub appointment_id: String,
    pub title: String,
    pub client_name: String,
    pub appointment_kind: String,
    pub starts_at: String,
    pub vendor_id: Option<String>,
    pub completed: bool,
}

impl ServerEvent {
    pub fn from_appointment(kind: &str, appointment: &Appointment) -> Self {
        Self {
            kind: kind.to_string(),
            appointment_id: appointment.id.clone(),
            title: appointment.title.clone(),
            client_name: appointment.client_name.clone(),
            appointment_kind: appointment.kind.as_str().to_string(),
            starts_at: format_timestamp(appointment.starts_at),
            vendor_id: appointment.vendor_id.clone(),
            completed: appointment.completed_at.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::memory_pool;

    #[actix_web::test]
    async fn session_changes_reach_subscribers_in_order() {
        let state = AppState::new(
            Store::new(memory_pool().await),
            AppConfig::from_lookup(|_| None),
        );
        let mut rx = state.on_session_change();
        state.publish_session(SessionEvent::SignedIn {
            user_id: "u1".into(),
            role: Role::Operator,
        });
        state.publish_session(SessionEvent::SignedOut { user_id: "u1".into() });

        assert_eq!(
            rx.recv().await.unwrap(),
            SessionEvent::SignedIn {
                user_id: "u1".into(),
                role: Role::Operator
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            SessionEvent::SignedOut { user_id: "u1".into() }
        );
    }
}

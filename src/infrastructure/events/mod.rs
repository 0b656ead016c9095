use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrchestratorEvent {
    SessionAdded,
    SessionRemoved,
    SessionStatus,
    SessionWarning,
    WebSessionUpdated,
    ConfigChanged,
}

impl OrchestratorEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrchestratorEvent::SessionAdded => "switchyard:session-added",
            OrchestratorEvent::SessionRemoved => "switchyard:session-removed",
            OrchestratorEvent::SessionStatus => "switchyard:session-status",
            OrchestratorEvent::SessionWarning => "switchyard:session-warning",
            OrchestratorEvent::WebSessionUpdated => "switchyard:web-session-updated",
            OrchestratorEvent::ConfigChanged => "switchyard:config-changed",
        }
    }
}

/// Sink for orchestrator notifications (a UI bridge, an RPC server, a log).
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: OrchestratorEvent, payload: serde_json::Value) -> anyhow::Result<()>;
}

/// Serialize and emit; failures are logged, never propagated to the caller.
pub fn emit_event<T: Serialize>(emitter: &dyn EventEmitter, event: OrchestratorEvent, payload: &T) {
    let value = match serde_json::to_value(payload) {
        Ok(value) => value,
        Err(e) => {
            log::warn!("Failed to serialize payload for {}: {e}", event.as_str());
            return;
        }
    };
    if let Err(e) = emitter.emit(event, value) {
        log::warn!("Failed to emit {}: {e}", event.as_str());
    }
}

/// Default emitter for embedders without an event surface.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEmitter;

impl EventEmitter for LogEmitter {
    fn emit(&self, event: OrchestratorEvent, payload: serde_json::Value) -> anyhow::Result<()> {
        log::debug!("{} {payload}", event.as_str());
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::recording::RecordingEmitter;
    use super::*;

    #[test]
    fn event_names_are_namespaced() {
        assert_eq!(
            OrchestratorEvent::SessionAdded.as_str(),
            "switchyard:session-added"
        );
        assert_eq!(
            OrchestratorEvent::WebSessionUpdated.as_str(),
            "switchyard:web-session-updated"
        );
        assert_eq!(
            OrchestratorEvent::ConfigChanged.as_str(),
            "switchyard:config-changed"
        );
    }

    #[test]
    fn emit_event_serializes_payload() {
        #[derive(Serialize)]
        struct Payload {
            session_id: &'static str,
        }

        let emitter = RecordingEmitter::default();
        emit_event(
            &emitter,
            OrchestratorEvent::SessionRemoved,
            &Payload { session_id: "s-1" },
        );
        let events = emitter.events_of(OrchestratorEvent::SessionRemoved);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["session_id"], "s-1");
        assert!(emitter.events_of(OrchestratorEvent::SessionAdded).is_empty());
    }

    #[test]
    fn emit_failures_are_swallowed() {
        struct Failing;
        impl EventEmitter for Failing {
            fn emit(&self, _: OrchestratorEvent, _: serde_json::Value) -> anyhow::Result<()> {
                anyhow::bail!("listener gone")
            }
        }
        emit_event(&Failing, OrchestratorEvent::SessionStatus, &"idle");
    }
}

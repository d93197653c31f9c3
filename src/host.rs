//! Message boundary between the panel and the host service.
//!
//! The panel fires requests without waiting; the host answers some of them later
//! with events that carry no correlation id. Handlers on the panel side read the
//! current panel context when an event arrives, never the context at request time.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clipboard::ClipboardWriter;
use crate::stages::{DocumentType, Stage};
use crate::store::{self, Storage};

/// Requests sent from the panel to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum HostRequest {
    CopyToClipboard { text: String },
    SaveStages { stages: Vec<Stage>, tab_type: DocumentType },
    LoadStages,
    ResetStages { tab_type: DocumentType },
    SaveRecentAgent { agent_id: String },
}

/// Events sent from the host back to the panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum HostEvent {
    StagesLoaded {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        requirements_stages: Option<Vec<Stage>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        issues_stages: Option<Vec<Stage>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        recent_agents: Option<Vec<String>>,
    },
    /// Informational message for the status line.
    Notice { message: String },
}

/// Host side: owns storage and the clipboard, answers panel requests.
pub struct HostService {
    storage: Box<dyn Storage + Send>,
    clipboard: Box<dyn ClipboardWriter + Send>,
    recent_limit: usize,
}

impl HostService {
    pub fn new(
        storage: Box<dyn Storage + Send>,
        clipboard: Box<dyn ClipboardWriter + Send>,
        recent_limit: usize,
    ) -> Self {
        Self {
            storage,
            clipboard,
            recent_limit,
        }
    }

    /// Handle one request, returning the events it produces.
    pub fn handle(&mut self, request: HostRequest) -> Vec<HostEvent> {
        match request {
            HostRequest::CopyToClipboard { text } => {
                if text.is_empty() {
                    return Vec::new();
                }
                match self.clipboard.write_text(&text) {
                    Ok(()) => {
                        info!(chars = text.chars().count(), "clipboard_written");
                        vec![HostEvent::Notice {
                            message: "プロンプトをクリップボードにコピーしました！".to_string(),
                        }]
                    }
                    Err(e) => {
                        warn!(error = %e, "clipboard_write_failed");
                        vec![HostEvent::Notice {
                            message: format!("Copy failed: {}", e),
                        }]
                    }
                }
            }
            HostRequest::SaveStages { stages, tab_type } => {
                if let Err(e) = store::save_stages(self.storage.as_ref(), tab_type, &stages) {
                    warn!(tab = %tab_type, error = %e, "stages_save_failed");
                }
                Vec::new()
            }
            HostRequest::ResetStages { tab_type } => {
                store::reset_stages(self.storage.as_ref(), tab_type);
                vec![self.stages_loaded()]
            }
            HostRequest::LoadStages => vec![self.stages_loaded()],
            HostRequest::SaveRecentAgent { agent_id } => {
                if agent_id.is_empty() {
                    return Vec::new();
                }
                let updated =
                    store::save_recent_agent(self.storage.as_ref(), &agent_id, self.recent_limit);
                vec![HostEvent::StagesLoaded {
                    requirements_stages: None,
                    issues_stages: None,
                    recent_agents: Some(updated),
                }]
            }
        }
    }

    fn stages_loaded(&self) -> HostEvent {
        let storage = self.storage.as_ref();
        let (requirements, req_source) = store::load_stages(storage, DocumentType::Requirements);
        let (issues, issues_source) = store::load_stages(storage, DocumentType::Issues);
        debug!(requirements = ?req_source, issues = ?issues_source, "stages_loaded");
        HostEvent::StagesLoaded {
            requirements_stages: Some(requirements),
            issues_stages: Some(issues),
            recent_agents: Some(store::load_recent_agents(storage)),
        }
    }
}

/// Panel side of the channel pair.
pub struct HostLink {
    requests: Sender<HostRequest>,
    events: Receiver<HostEvent>,
}

/// Host side of the channel pair.
pub struct HostEndpoint {
    requests: Receiver<HostRequest>,
    events: Sender<HostEvent>,
}

impl HostLink {
    /// Create connected panel and host ends.
    pub fn pair() -> (HostLink, HostEndpoint) {
        let (req_tx, req_rx) = mpsc::channel();
        let (ev_tx, ev_rx) = mpsc::channel();
        (
            HostLink {
                requests: req_tx,
                events: ev_rx,
            },
            HostEndpoint {
                requests: req_rx,
                events: ev_tx,
            },
        )
    }

    /// Fire a request. A disconnected host is logged and otherwise ignored.
    pub fn send(&self, request: HostRequest) {
        if let Err(e) = self.requests.send(request) {
            warn!(error = %e, "host_request_dropped");
        }
    }

    /// Next pending event, if any.
    pub fn try_recv(&self) -> Option<HostEvent> {
        match self.events.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => None,
        }
    }
}

impl HostEndpoint {
    /// Process every queued request synchronously. Returns how many were handled.
    ///
    /// Stops early once the panel side has hung up.
    #[cfg(test)]
    pub fn pump(&self, service: &mut HostService) -> usize {
        let mut handled = 0;
        while let Ok(request) = self.requests.try_recv() {
            handled += 1;
            for event in service.handle(request) {
                if self.events.send(event).is_err() {
                    return handled;
                }
            }
        }
        handled
    }

    /// Block on requests until the panel side hangs up.
    pub fn serve(self, mut service: HostService) {
        for request in self.requests.iter() {
            for event in service.handle(request) {
                if self.events.send(event).is_err() {
                    return;
                }
            }
        }
        debug!("host_stopped");
    }
}

/// Run the host service on its own thread.
///
/// The service is built inside the thread so handles that must stay on one thread
/// (such as the system clipboard) are created where they are used.
pub fn spawn<F>(make_service: F) -> std::io::Result<(HostLink, JoinHandle<()>)>
where
    F: FnOnce() -> HostService + Send + 'static,
{
    let (link, endpoint) = HostLink::pair();
    let handle = thread::Builder::new()
        .name("host".to_string())
        .spawn(move || endpoint.serve(make_service()))?;
    Ok((link, handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::RecordingClipboard;
    use crate::store::{MemoryStorage, REQUIREMENTS_STAGES_KEY};
    use crate::templates::default_stages;
    use serde_json::json;

    fn service_with(storage: MemoryStorage) -> (HostService, RecordingClipboard) {
        let clipboard = RecordingClipboard::new();
        let service = HostService::new(Box::new(storage), Box::new(clipboard.clone()), 10);
        (service, clipboard)
    }

    #[test]
    fn test_request_wire_names() {
        let req = HostRequest::SaveStages {
            stages: vec![Stage::new(1, "x")],
            tab_type: DocumentType::Issues,
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["command"], "saveStages");
        assert_eq!(value["tabType"], "issues");

        let parsed: HostRequest =
            serde_json::from_value(json!({"command": "saveRecentAgent", "agentId": "@a"}))
                .unwrap();
        assert_eq!(
            parsed,
            HostRequest::SaveRecentAgent {
                agent_id: "@a".to_string()
            }
        );
        let load: HostRequest = serde_json::from_value(json!({"command": "loadStages"})).unwrap();
        assert_eq!(load, HostRequest::LoadStages);
    }

    #[test]
    fn test_event_wire_names_skip_absent_fields() {
        let event = HostEvent::StagesLoaded {
            requirements_stages: None,
            issues_stages: None,
            recent_agents: Some(vec!["@a".to_string()]),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, json!({"command": "stagesLoaded", "recentAgents": ["@a"]}));
    }

    #[test]
    fn test_load_returns_both_lists_and_history() {
        let (mut service, _) = service_with(MemoryStorage::new());
        let events = service.handle(HostRequest::LoadStages);
        assert_eq!(
            events,
            vec![HostEvent::StagesLoaded {
                requirements_stages: Some(default_stages(DocumentType::Requirements)),
                issues_stages: Some(default_stages(DocumentType::Issues)),
                recent_agents: Some(Vec::new()),
            }]
        );
    }

    #[test]
    fn test_load_migrates_stale_schema() {
        let storage = MemoryStorage::new();
        storage
            .set(REQUIREMENTS_STAGES_KEY, &json!([{"id": 1, "content": "old"}]))
            .unwrap();
        let (mut service, _) = service_with(storage);
        let events = service.handle(HostRequest::LoadStages);
        let HostEvent::StagesLoaded {
            requirements_stages,
            ..
        } = &events[0]
        else {
            panic!("expected stagesLoaded");
        };
        assert_eq!(
            requirements_stages.as_deref(),
            Some(default_stages(DocumentType::Requirements).as_slice())
        );
    }

    #[test]
    fn test_save_is_silent_and_reset_answers_with_defaults() {
        let (mut service, _) = service_with(MemoryStorage::new());
        let custom = vec![Stage::new(1, "custom")];
        let events = service.handle(HostRequest::SaveStages {
            stages: custom.clone(),
            tab_type: DocumentType::Issues,
        });
        assert!(events.is_empty());

        let events = service.handle(HostRequest::LoadStages);
        let HostEvent::StagesLoaded { issues_stages, .. } = &events[0] else {
            panic!("expected stagesLoaded");
        };
        assert_eq!(issues_stages.as_ref(), Some(&custom));

        let events = service.handle(HostRequest::ResetStages {
            tab_type: DocumentType::Issues,
        });
        let HostEvent::StagesLoaded { issues_stages, .. } = &events[0] else {
            panic!("expected stagesLoaded");
        };
        assert_eq!(
            issues_stages.as_ref(),
            Some(&default_stages(DocumentType::Issues))
        );
    }

    #[test]
    fn test_save_recent_agent_answers_with_history_only() {
        let (mut service, _) = service_with(MemoryStorage::new());
        service.handle(HostRequest::SaveRecentAgent {
            agent_id: "@first".into(),
        });
        let events = service.handle(HostRequest::SaveRecentAgent {
            agent_id: "@second".into(),
        });
        assert_eq!(
            events,
            vec![HostEvent::StagesLoaded {
                requirements_stages: None,
                issues_stages: None,
                recent_agents: Some(vec!["@second".to_string(), "@first".to_string()]),
            }]
        );
    }

    #[test]
    fn test_copy_writes_clipboard_and_notifies() {
        let (mut service, clipboard) = service_with(MemoryStorage::new());
        let events = service.handle(HostRequest::CopyToClipboard {
            text: "1. Do\n".into(),
        });
        assert_eq!(clipboard.contents(), vec!["1. Do\n"]);
        assert!(matches!(events.as_slice(), [HostEvent::Notice { .. }]));

        let events = service.handle(HostRequest::CopyToClipboard {
            text: String::new(),
        });
        assert!(events.is_empty());
        assert_eq!(clipboard.contents().len(), 1);
    }

    #[test]
    fn test_pump_stops_when_panel_hangs_up() {
        let (link, endpoint) = HostLink::pair();
        let (mut service, _) = service_with(MemoryStorage::new());
        link.send(HostRequest::LoadStages);
        link.send(HostRequest::LoadStages);
        link.send(HostRequest::LoadStages);
        drop(link);

        assert_eq!(endpoint.pump(&mut service), 1);
    }

    #[test]
    fn test_pump_delivers_events_in_order() {
        let (link, endpoint) = HostLink::pair();
        let (mut service, _) = service_with(MemoryStorage::new());
        link.send(HostRequest::SaveRecentAgent {
            agent_id: "@x".into(),
        });
        link.send(HostRequest::LoadStages);
        assert!(link.try_recv().is_none());
        assert_eq!(endpoint.pump(&mut service), 2);

        let first = link.try_recv().unwrap();
        assert!(matches!(
            first,
            HostEvent::StagesLoaded {
                requirements_stages: None,
                ..
            }
        ));
        let second = link.try_recv().unwrap();
        assert!(matches!(
            second,
            HostEvent::StagesLoaded {
                requirements_stages: Some(_),
                ..
            }
        ));
        assert!(link.try_recv().is_none());
    }

    #[test]
    fn test_spawned_host_answers_load() {
        let (link, handle) = spawn(|| {
            HostService::new(
                Box::new(MemoryStorage::new()),
                Box::new(RecordingClipboard::new()),
                10,
            )
        })
        .unwrap();
        link.send(HostRequest::LoadStages);
        let mut event = None;
        for _ in 0..200 {
            if let Some(e) = link.try_recv() {
                event = Some(e);
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert!(matches!(event, Some(HostEvent::StagesLoaded { .. })));
        drop(link);
        handle.join().unwrap();
    }
}

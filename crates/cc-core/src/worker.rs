//! Translates a decoded [`Command`] into store calls, notifies the relevant
//! actor queues of what happened, and reports a [`HandlerStatus`] plus any
//! payload back through a [`ResponseConsumer`].
//!
//! Every store mutation that touches the optimizer or tag manager posts its
//! notice to the matching queue *after* the store call has already
//! committed — the queues are notification pipelines, not a two-phase
//! commit protocol, so the store itself is always the source of truth.

use std::sync::Arc;

use cc_actors::{OptimizerMessage, TagMessage};
use cc_store::CleanMode;

use crate::commands::{Command, FpcCommand, SessionCommand};
use crate::interfaces::ResponseConsumer;
use crate::state::CoreState;
use crate::status::HandlerStatus;

pub struct Worker {
    state: Arc<CoreState>,
}

impl Worker {
    #[must_use]
    pub fn new(state: Arc<CoreState>) -> Self {
        Self { state }
    }

    pub fn handle(&self, command: Command, out: &mut dyn ResponseConsumer) -> HandlerStatus {
        let status = match command {
            Command::Session(cmd) => self.handle_session(cmd, out),
            Command::Fpc(cmd) => self.handle_fpc(cmd, out),
            Command::HealthCheck => {
                out.write_payload(b"OK");
                HandlerStatus::Success
            }
            Command::Info => {
                out.write_payload(self.info_blob().as_bytes());
                HandlerStatus::Success
            }
        };
        out.write_status(status);
        status
    }

    fn handle_session(&self, command: SessionCommand, out: &mut dyn ResponseConsumer) -> HandlerStatus {
        match command {
            SessionCommand::Read { key, request_id, user_agent_class } => {
                let result = self.state.session_store.read(&key, request_id);
                if let Some(record) = self.state.session_store.inner().get(&key) {
                    record.set_user_agent_class(user_agent_class);
                    let _ = self
                        .state
                        .session_optimizer_queue
                        .put_always(OptimizerMessage::Read(record));
                }
                out.write_payload(&result.data);
                if result.lock_broken {
                    tracing::warn!(request_id, "session lock was broken on read");
                }
                HandlerStatus::Success
            }
            SessionCommand::Write { key, request_id, data, user_agent_class } => {
                match self.state.session_store.write(&key, request_id, data) {
                    Ok(()) => {
                        if let Some(record) = self.state.session_store.inner().get(&key) {
                            record.set_user_agent_class(user_agent_class);
                            let _ = self
                                .state
                                .session_optimizer_queue
                                .put_always(OptimizerMessage::Write(record));
                        }
                        HandlerStatus::Success
                    }
                    Err(e) => HandlerStatus::from(&e),
                }
            }
            SessionCommand::Destroy { key, request_id } => {
                let record = self.state.session_store.inner().get(&key);
                match self.state.session_store.destroy(&key, request_id) {
                    Ok(()) => {
                        if let Some(record) = record {
                            let _ = self
                                .state
                                .session_optimizer_queue
                                .put_always(OptimizerMessage::Delete(record));
                        }
                        HandlerStatus::Success
                    }
                    Err(e) => HandlerStatus::from(&e),
                }
            }
            SessionCommand::Gc => {
                let collected = self.state.session_store.gc();
                out.write_payload(collected.to_string().as_bytes());
                HandlerStatus::Success
            }
        }
    }

    fn handle_fpc(&self, command: FpcCommand, out: &mut dyn ResponseConsumer) -> HandlerStatus {
        match command {
            FpcCommand::Load { key, user_agent_class } => match self.state.fpc_store.load(&key) {
                Some(data) => {
                    if let Some(record) = self.state.fpc_store.inner().get(&key) {
                        record.set_user_agent_class(user_agent_class);
                        let _ =
                            self.state.fpc_optimizer_queue.put_always(OptimizerMessage::Read(record));
                    }
                    out.write_payload(&data);
                    HandlerStatus::Success
                }
                None => HandlerStatus::Failure,
            },
            FpcCommand::Test { key } => {
                out.write_payload(if self.state.fpc_store.test(&key) { b"1" } else { b"0" });
                HandlerStatus::Success
            }
            FpcCommand::Save { key, data, ttl_ms, tags, user_agent_class } => {
                let previous_tags =
                    self.state.fpc_store.inner().get(&key).map(|r| r.tags()).unwrap_or_default();
                match self.state.fpc_store.save(&key, data, ttl_ms, tags.clone()) {
                    Ok(record) => {
                        record.set_user_agent_class(user_agent_class);
                        let _ = self
                            .state
                            .fpc_optimizer_queue
                            .put_always(OptimizerMessage::Write(Arc::clone(&record)));
                        let _ = self.state.tag_queue.put_always(TagMessage::Associate {
                            record,
                            previous_tags,
                            tags,
                        });
                        HandlerStatus::Success
                    }
                    Err(e) => HandlerStatus::from(&e),
                }
            }
            FpcCommand::Remove { key } => match self.state.fpc_store.remove(&key) {
                Some(record) => {
                    let tags = record.tags();
                    let _ = self
                        .state
                        .fpc_optimizer_queue
                        .put_always(OptimizerMessage::Delete(Arc::clone(&record)));
                    let _ = self.state.tag_queue.put_always(TagMessage::Unlink { record, tags });
                    HandlerStatus::Success
                }
                None => HandlerStatus::Failure,
            },
            FpcCommand::Touch { key, ttl_ms, user_agent_class } => {
                match self.state.fpc_store.touch(&key, ttl_ms) {
                    Ok(()) => {
                        if let Some(record) = self.state.fpc_store.inner().get(&key) {
                            record.set_user_agent_class(user_agent_class);
                            let _ = self
                                .state
                                .fpc_optimizer_queue
                                .put_always(OptimizerMessage::Touch(record));
                        }
                        HandlerStatus::Success
                    }
                    Err(e) => HandlerStatus::from(&e),
                }
            }
            FpcCommand::Clean { mode, tags } => {
                let count = match mode {
                    CleanMode::All | CleanMode::Old => self.state.fpc_store.clean(mode, &[]),
                    _ => {
                        let (tx, rx) = std::sync::mpsc::channel();
                        let message = TagMessage::Clean { mode, reference_tags: tags, reply: tx };
                        let _ = self.state.tag_queue.put_always(message);
                        rx.recv().unwrap_or(0)
                    }
                };
                out.write_payload(count.to_string().as_bytes());
                HandlerStatus::Success
            }
            FpcCommand::GetFillingPercentage => {
                out.write_payload(format!("{:.2}", self.state.fpc_store.filling_percentage()).as_bytes());
                HandlerStatus::Success
            }
            FpcCommand::GetMetadatas { key } => match self.state.fpc_store.get_metadata(&key) {
                Some(meta) => {
                    out.write_payload(
                        format!(
                            "size={} last_modified={} expiration={} tags={}",
                            meta.size,
                            meta.last_modified,
                            meta.expiration,
                            meta.tags.join(",")
                        )
                        .as_bytes(),
                    );
                    HandlerStatus::Success
                }
                None => HandlerStatus::Failure,
            },
            FpcCommand::GetIds => {
                let ids = self.state.fpc_store.get_ids();
                out.write_list(&ids);
                HandlerStatus::Success
            }
            FpcCommand::GetTags => {
                let (tx, rx) = std::sync::mpsc::channel();
                let _ = self.state.tag_queue.put_always(TagMessage::ListTags { reply: tx });
                let tags = rx.recv().unwrap_or_default();
                let items: Vec<Vec<u8>> = tags.iter().map(|t| t.as_bytes().to_vec()).collect();
                out.write_list(&items);
                HandlerStatus::Success
            }
            FpcCommand::GetIdsMatchingAllTags { tags } => {
                let ids = self.state.fpc_store.get_ids_matching_all(&tags);
                out.write_list(&ids);
                HandlerStatus::Success
            }
            FpcCommand::GetIdsMatchingAnyTag { tags } => {
                let ids = self.state.fpc_store.get_ids_matching_any(&tags);
                out.write_list(&ids);
                HandlerStatus::Success
            }
            FpcCommand::GetIdsNotMatchingAnyTag { tags } => {
                let ids = self.state.fpc_store.get_ids_not_matching_any(&tags);
                out.write_list(&ids);
                HandlerStatus::Success
            }
        }
    }

    fn info_blob(&self) -> String {
        format!(
            "session_records={} fpc_records={} session_mem={} fpc_mem={}",
            self.state.session_store.inner().len(),
            self.state.fpc_store.inner().len(),
            self.state.session_store.inner().memory_used(),
            self.state.fpc_store.inner().memory_used(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;

    struct Recorder {
        status: Option<HandlerStatus>,
        payload: Vec<u8>,
    }

    impl ResponseConsumer for Recorder {
        fn write_status(&mut self, status: HandlerStatus) {
            self.status = Some(status);
        }
        fn write_payload(&mut self, bytes: &[u8]) {
            self.payload = bytes.to_vec();
        }
    }

    fn worker() -> (Worker, Recorder) {
        let state = Arc::new(CoreState::new(CoreConfig::default()));
        (Worker::new(state), Recorder { status: None, payload: Vec::new() })
    }

    #[test]
    fn fpc_save_then_load_round_trips() {
        let (worker, mut out) = worker();
        let status = worker.handle(
            Command::Fpc(FpcCommand::Save {
                key: b"p1".to_vec(),
                data: b"hello".to_vec(),
                ttl_ms: 0,
                tags: vec![Arc::from("a")],
                user_agent_class: cc_store::UserAgentClass::Unknown,
            }),
            &mut out,
        );
        assert_eq!(status, HandlerStatus::Success);

        let status = worker.handle(
            Command::Fpc(FpcCommand::Load {
                key: b"p1".to_vec(),
                user_agent_class: cc_store::UserAgentClass::Unknown,
            }),
            &mut out,
        );
        assert_eq!(status, HandlerStatus::Success);
        assert_eq!(out.payload, b"hello");
    }

    #[test]
    fn fpc_load_missing_key_is_failure() {
        let (worker, mut out) = worker();
        let status = worker.handle(
            Command::Fpc(FpcCommand::Load {
                key: b"missing".to_vec(),
                user_agent_class: cc_store::UserAgentClass::Unknown,
            }),
            &mut out,
        );
        assert_eq!(status, HandlerStatus::Failure);
    }

    #[test]
    fn session_write_then_read_round_trips() {
        let (worker, mut out) = worker();
        worker.handle(
            Command::Session(SessionCommand::Write {
                key: b"sid".to_vec(),
                request_id: 1,
                data: b"payload".to_vec(),
                user_agent_class: cc_store::UserAgentClass::Unknown,
            }),
            &mut out,
        );
        worker.handle(
            Command::Session(SessionCommand::Read {
                key: b"sid".to_vec(),
                request_id: 2,
                user_agent_class: cc_store::UserAgentClass::Unknown,
            }),
            &mut out,
        );
        assert_eq!(out.payload, b"payload");
    }

    #[test]
    fn health_check_reports_ok() {
        let (worker, mut out) = worker();
        let status = worker.handle(Command::HealthCheck, &mut out);
        assert_eq!(status, HandlerStatus::Success);
        assert_eq!(out.payload, b"OK");
    }
}

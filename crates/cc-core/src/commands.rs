//! The command set a worker thread dispatches against the stores. The wire
//! protocol that decodes bytes into one of these (and the binlog format that
//! records them) are out of scope; this is the boundary the worker handler
//! operates on.

use std::sync::Arc;

use cc_store::{CleanMode, UserAgentClass};

pub enum SessionCommand {
    Read { key: Vec<u8>, request_id: u64, user_agent_class: UserAgentClass },
    Write { key: Vec<u8>, request_id: u64, data: Vec<u8>, user_agent_class: UserAgentClass },
    Destroy { key: Vec<u8>, request_id: u64 },
    Gc,
}

pub enum FpcCommand {
    Load { key: Vec<u8>, user_agent_class: UserAgentClass },
    Test { key: Vec<u8> },
    Save { key: Vec<u8>, data: Vec<u8>, ttl_ms: i64, tags: Vec<Arc<str>>, user_agent_class: UserAgentClass },
    Remove { key: Vec<u8> },
    Touch { key: Vec<u8>, ttl_ms: i64, user_agent_class: UserAgentClass },
    Clean { mode: CleanMode, tags: Vec<Arc<str>> },
    GetFillingPercentage,
    GetMetadatas { key: Vec<u8> },
    GetIds,
    GetTags,
    GetIdsMatchingAllTags { tags: Vec<Arc<str>> },
    GetIdsMatchingAnyTag { tags: Vec<Arc<str>> },
    GetIdsNotMatchingAnyTag { tags: Vec<Arc<str>> },
}

pub enum Command {
    Session(SessionCommand),
    Fpc(FpcCommand),
    /// Reports health/liveness without touching either store.
    HealthCheck,
    /// Returns a text info blob with per-domain record counts and memory use.
    Info,
}

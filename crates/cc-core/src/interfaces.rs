//! Contracts for collaborators that live outside this crate's scope: the
//! wire-protocol response writer, the replication binary log reader/writer,
//! and the replication fan-out itself. Only the shapes the core dispatcher
//! and worker need to call are specified here — their implementations (the
//! network listener, the on-disk binlog format, the replica connections)
//! are a different concern from the cache engine itself.

use crate::status::HandlerStatus;

/// Where a finished request's result is written back to. In the full
/// system this is the connection that issued the request; tests use an
/// in-memory stand-in.
pub trait ResponseConsumer: Send {
    fn write_status(&mut self, status: HandlerStatus);
    fn write_payload(&mut self, bytes: &[u8]);

    /// Writes a list of opaque items (id or tag names) as the response body.
    /// The default newline-joins them through `write_payload`; a real
    /// wire-protocol writer can override this to frame a proper list instead.
    fn write_list(&mut self, items: &[Vec<u8>]) {
        let joined = items.join(&b"\n"[..]);
        self.write_payload(&joined);
    }
}

/// Appends successfully-applied write commands to the replication log.
pub trait BinlogWriter: Send + Sync {
    fn append(&self, domain: cc_store::Domain, key: &[u8], payload: &[u8]) -> std::io::Result<()>;
    fn flush(&self) -> std::io::Result<()>;
}

/// Replays a binary log into a freshly started store during startup.
pub trait BinlogLoader: Send + Sync {
    fn load_into(&self, session: &cc_store::SessionStore, fpc: &cc_store::FpcStore) -> std::io::Result<u64>;
}

/// Forwards applied writes to replica nodes.
pub trait Replicator: Send + Sync {
    fn replicate(&self, domain: cc_store::Domain, key: &[u8], payload: &[u8]);
}

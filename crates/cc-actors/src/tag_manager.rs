//! The tag manager: a single thread that owns the FPC domain's tag
//! cross-reference index and runs entirely lock-free with respect to the
//! store shards, because it is the only writer of its own `HashMap` and it
//! never blocks waiting on a shard's lock — it only ever reads a record's
//! already-resolved handle, which workers hand it through the queue.
//!
//! A tag's reference list tracks which records currently carry that tag.
//! `Clean`'s "matching all tags" mode walks the *shortest* of the requested
//! tags' lists rather than the whole keyspace, since a record can only match
//! all of them if it appears in every one — and in particular in the
//! smallest.

use std::collections::HashMap;
use std::sync::mpsc::Sender;
use std::sync::Arc;

use cc_queue::DynamicQueue;
use cc_store::{CleanMode, FpcStore, Record};

struct TagEntry {
    refs: Vec<Arc<Record>>,
}

impl TagEntry {
    fn new() -> Self {
        Self { refs: Vec::new() }
    }

    fn link(&mut self, record: &Arc<Record>) {
        if !self.refs.iter().any(|r| Arc::ptr_eq(r, record)) {
            self.refs.push(Arc::clone(record));
        }
    }

    fn unlink(&mut self, record: &Arc<Record>) {
        self.refs.retain(|r| !Arc::ptr_eq(r, record));
    }
}

pub enum TagMessage {
    /// A record was saved (or re-saved) with a new tag set: link it to each
    /// tag named and unlink it from any it no longer carries.
    Associate { record: Arc<Record>, previous_tags: Vec<Arc<str>>, tags: Vec<Arc<str>> },
    /// A record was removed or expired: drop it from every tag it was in.
    Unlink { record: Arc<Record>, tags: Vec<Arc<str>> },
    /// Run an invalidation sweep and report back how many records it swept.
    Clean { mode: CleanMode, reference_tags: Vec<Arc<str>>, reply: Sender<usize> },
    /// Report every tag name currently cross-referencing at least one record.
    ListTags { reply: Sender<Vec<Arc<str>>> },
    Quit,
}

pub struct TagManager {
    tags: HashMap<Arc<str>, TagEntry>,
    store: Arc<FpcStore>,
    queue: Arc<DynamicQueue<TagMessage>>,
}

impl TagManager {
    #[must_use]
    pub fn new(store: Arc<FpcStore>, queue: Arc<DynamicQueue<TagMessage>>) -> Self {
        Self { tags: HashMap::new(), store, queue }
    }

    /// Runs the actor loop on the calling thread until a [`TagMessage::Quit`]
    /// is received or the queue is closed.
    pub fn run(mut self) {
        loop {
            let message = self.queue.get();
            match message {
                TagMessage::Associate { record, previous_tags, tags } => {
                    self.associate(&record, &previous_tags, &tags);
                }
                TagMessage::Unlink { record, tags } => {
                    self.unlink(&record, &tags);
                }
                TagMessage::Clean { mode, reference_tags, reply } => {
                    let count = self.clean(mode, &reference_tags);
                    let _ = reply.send(count);
                }
                TagMessage::ListTags { reply } => {
                    let _ = reply.send(self.tags.keys().cloned().collect());
                }
                TagMessage::Quit => break,
            }
        }
    }

    fn associate(&mut self, record: &Arc<Record>, previous_tags: &[Arc<str>], tags: &[Arc<str>]) {
        for old in previous_tags {
            if !tags.iter().any(|t| t.as_ref() == old.as_ref()) {
                if let Some(entry) = self.tags.get_mut(old) {
                    entry.unlink(record);
                    if entry.refs.is_empty() {
                        self.tags.remove(old);
                    }
                }
            }
        }
        for tag in tags {
            self.tags.entry(Arc::clone(tag)).or_insert_with(TagEntry::new).link(record);
        }
    }

    fn unlink(&mut self, record: &Arc<Record>, tags: &[Arc<str>]) {
        for tag in tags {
            if let Some(entry) = self.tags.get_mut(tag) {
                entry.unlink(record);
                if entry.refs.is_empty() {
                    self.tags.remove(tag);
                }
            }
        }
    }

    fn clean(&mut self, mode: CleanMode, reference_tags: &[Arc<str>]) -> usize {
        let matched: Vec<Arc<Record>> = match mode {
            CleanMode::All | CleanMode::Old => {
                // Neither mode is tag-scoped; the store itself knows how to
                // select "everything" or "everything expired" cheaply.
                self.store.clean(mode, &[]);
                return 0;
            }
            CleanMode::MatchingAllTags => self.matching_all(reference_tags),
            CleanMode::MatchingAnyTag => self.matching_any(reference_tags),
            CleanMode::NotMatchingAnyTag => self.not_matching_any(reference_tags),
        };

        for record in &matched {
            self.store.inner().remove(&record.key);
            let record_tags = record.tags();
            self.unlink(record, &record_tags);
        }
        matched.len()
    }

    fn matching_all(&self, tags: &[Arc<str>]) -> Vec<Arc<Record>> {
        if tags.is_empty() {
            return Vec::new();
        }
        let Some(shortest) = tags
            .iter()
            .filter_map(|t| self.tags.get(t))
            .min_by_key(|e| e.refs.len())
        else {
            return Vec::new();
        };
        shortest
            .refs
            .iter()
            .filter(|record| {
                let owned = record.tags();
                tags.iter().all(|t| owned.iter().any(|o| o.as_ref() == t.as_ref()))
            })
            .cloned()
            .collect()
    }

    fn matching_any(&self, tags: &[Arc<str>]) -> Vec<Arc<Record>> {
        let mut seen = Vec::new();
        for tag in tags {
            if let Some(entry) = self.tags.get(tag) {
                for record in &entry.refs {
                    if !seen.iter().any(|r: &Arc<Record>| Arc::ptr_eq(r, record)) {
                        seen.push(Arc::clone(record));
                    }
                }
            }
        }
        seen
    }

    fn not_matching_any(&self, tags: &[Arc<str>]) -> Vec<Arc<Record>> {
        let excluded = self.matching_any(tags);
        let mut out = Vec::new();
        self.store.inner().for_each(|r| {
            if !excluded.iter().any(|e| Arc::ptr_eq(e, r)) {
                out.push(Arc::clone(r));
            }
        });
        out
    }

    #[must_use]
    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    #[must_use]
    pub fn marked_count(&self, tag: &str) -> usize {
        self.tags.get(tag).map_or(0, |e| e.refs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cc_store::DomainConfig;
    use std::sync::mpsc;

    fn tags(names: &[&str]) -> Vec<Arc<str>> {
        names.iter().map(|n| Arc::from(*n)).collect()
    }

    #[test]
    fn associate_and_matching_all_finds_intersection() {
        let store = Arc::new(FpcStore::new(DomainConfig::default()));
        let queue = Arc::new(DynamicQueue::new(cc_queue::QueueConfig::default()));
        let mut tm = TagManager::new(Arc::clone(&store), queue);

        let r1 = store.save(b"p1", b"1".to_vec(), 0, tags(&["a", "b"])).unwrap();
        let r2 = store.save(b"p2", b"2".to_vec(), 0, tags(&["a"])).unwrap();
        tm.associate(&r1, &[], &tags(&["a", "b"]));
        tm.associate(&r2, &[], &tags(&["a"]));

        let matched = tm.matching_all(&tags(&["a", "b"]));
        assert_eq!(matched.len(), 1);
        assert_eq!(&*matched[0].key, b"p1");
    }

    #[test]
    fn clean_matching_any_removes_from_store_and_index() {
        let store = Arc::new(FpcStore::new(DomainConfig::default()));
        let queue = Arc::new(DynamicQueue::new(cc_queue::QueueConfig::default()));
        let mut tm = TagManager::new(Arc::clone(&store), queue);

        let r1 = store.save(b"p1", b"1".to_vec(), 0, tags(&["a"])).unwrap();
        tm.associate(&r1, &[], &tags(&["a"]));

        let (tx, rx) = mpsc::channel();
        let count = tm.clean(CleanMode::MatchingAnyTag, &tags(&["a"]));
        let _ = tx.send(count);
        assert_eq!(rx.recv().unwrap(), 1);
        assert!(store.load(b"p1").is_none());
        assert_eq!(tm.marked_count("a"), 0);
    }
}

//! Message log reconciliation.
//!
//! The log is ordered by arrival, never reordered, and never holds two
//! entries with the same non-empty id. Every mutation is reported as a
//! [`LogEvent`] so a renderer can mirror the log without keeping its own copy.

use std::collections::HashSet;

use tracing::{debug, trace};

use trollbox_types::{ChatAction, Message};

/// A change to the message log, in the order it must be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    /// Appended at the end of the log.
    Added(Message),
    /// Removed from the log; the renderer drops the row with this id.
    Removed(Message),
}

#[derive(Debug, Default)]
pub struct Synchronizer {
    messages: Vec<Message>,
    ids: HashSet<String>,
}

impl Synchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Reconcile a history batch received on (re)connect.
    ///
    /// With an empty log the batch is the full history. Otherwise everything
    /// after the last held message's position in the batch is new. When that
    /// anchor is missing from the batch (deleted, or the gateway's window moved
    /// past it) the log is replaced by the batch, deduped by id.
    pub fn apply_batch(&mut self, batch: Vec<Message>) -> Vec<LogEvent> {
        if self.messages.is_empty() {
            return self.append_all(batch);
        }

        let anchor = self
            .messages
            .last()
            .filter(|m| m.has_id())
            .and_then(|last| batch.iter().position(|m| m.id == last.id));

        match anchor {
            Some(pos) => {
                trace!("History anchor at {} of {}", pos, batch.len());
                self.append_all(batch.into_iter().skip(pos + 1))
            }
            None => {
                debug!(
                    "Last held message not in history batch of {}, replacing the log",
                    batch.len()
                );
                self.replace(batch)
            }
        }
    }

    /// Make the log equal to `batch`. Held messages the batch lacks are
    /// removed. Survivors stay in place only when they form a prefix of the
    /// batch; otherwise they are removed and re-added in batch order, so the
    /// rendered order still equals the log order.
    fn replace(&mut self, batch: Vec<Message>) -> Vec<LogEvent> {
        let mut seen = HashSet::new();
        let batch: Vec<Message> = batch
            .into_iter()
            .filter(|m| !m.has_id() || seen.insert(m.id.clone()))
            .collect();

        let (kept, dropped): (Vec<Message>, Vec<Message>) = std::mem::take(&mut self.messages)
            .into_iter()
            .partition(|m| m.has_id() && seen.contains(&m.id));
        self.ids.clear();

        let mut events: Vec<LogEvent> = dropped.into_iter().map(LogEvent::Removed).collect();

        let in_place = kept.len() <= batch.len() && kept.iter().zip(&batch).all(|(k, b)| k.id == b.id);
        if in_place {
            self.ids.extend(kept.iter().map(|m| m.id.clone()));
            self.messages = kept;
        } else {
            events.extend(kept.into_iter().map(LogEvent::Removed));
        }

        events.extend(self.append_all(batch));
        events
    }

    /// Apply an incremental post or delete from the gateway.
    pub fn apply_action(&mut self, action: ChatAction) -> Option<LogEvent> {
        match action {
            ChatAction::PostMessage(message) => self.append(message),
            ChatAction::DeleteMessage(target) => self.remove(&target.id),
        }
    }

    fn append_all(&mut self, messages: impl IntoIterator<Item = Message>) -> Vec<LogEvent> {
        messages
            .into_iter()
            .filter_map(|m| self.append(m))
            .collect()
    }

    fn append(&mut self, message: Message) -> Option<LogEvent> {
        if message.has_id() && !self.ids.insert(message.id.clone()) {
            trace!("Skipping already held message {}", message.id);
            return None;
        }
        self.messages.push(message.clone());
        Some(LogEvent::Added(message))
    }

    fn remove(&mut self, id: &str) -> Option<LogEvent> {
        if id.is_empty() {
            return None;
        }
        let idx = self.messages.iter().position(|m| m.id == id)?;
        self.ids.remove(id);
        Some(LogEvent::Removed(self.messages.remove(idx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trollbox_types::Role;

    fn msg(id: &str) -> Message {
        Message {
            id: id.to_string(),
            author_name: "alice".into(),
            author_uid: 7,
            author_role: Role::User,
            text: format!("text {}", id),
            timestamp: 1_700_000_000,
        }
    }

    fn batch(ids: &[&str]) -> Vec<Message> {
        ids.iter().map(|id| msg(id)).collect()
    }

    fn ids(sync: &Synchronizer) -> Vec<&str> {
        sync.messages().iter().map(|m| m.id.as_str()).collect()
    }

    fn added_ids(events: &[LogEvent]) -> Vec<String> {
        events
            .iter()
            .map(|e| match e {
                LogEvent::Added(m) => m.id.clone(),
                LogEvent::Removed(m) => panic!("unexpected removal of {}", m.id),
            })
            .collect()
    }

    #[test]
    fn first_batch_is_full_history() {
        let mut sync = Synchronizer::new();
        let mut first = msg("1");
        first.text = "hi".into();
        let mut second = msg("2");
        second.text = "yo".into();

        let events = sync.apply_batch(vec![first.clone(), second.clone()]);

        assert_eq!(events, vec![LogEvent::Added(first), LogEvent::Added(second)]);
        assert_eq!(ids(&sync), vec!["1", "2"]);
    }

    #[test]
    fn reconnect_batch_appends_only_new_tail() {
        let mut sync = Synchronizer::new();
        sync.apply_batch(batch(&["1", "2", "3"]));

        let events = sync.apply_batch(batch(&["1", "2", "3", "4", "5"]));

        assert_eq!(added_ids(&events), vec!["4", "5"]);
        assert_eq!(ids(&sync), vec!["1", "2", "3", "4", "5"]);
    }

    #[test]
    fn anchor_is_found_by_equality_not_first_position() {
        let mut sync = Synchronizer::new();
        sync.apply_batch(batch(&["a", "b"]));

        let events = sync.apply_batch(batch(&["x", "a", "b", "c"]));

        assert_eq!(added_ids(&events), vec!["c"]);
        assert_eq!(ids(&sync), vec!["a", "b", "c"]);
    }

    #[test]
    fn superset_batches_keep_each_id_once() {
        let mut sync = Synchronizer::new();
        let rounds: [&[&str]; 4] = [
            &["1"],
            &["1", "2", "3"],
            &["1", "2", "3"],
            &["1", "2", "3", "4", "5", "6"],
        ];
        for round in rounds {
            sync.apply_batch(batch(round));
        }
        assert_eq!(ids(&sync), vec!["1", "2", "3", "4", "5", "6"]);
    }

    fn changes(events: &[LogEvent]) -> Vec<String> {
        events
            .iter()
            .map(|e| match e {
                LogEvent::Added(m) => format!("+{}", m.id),
                LogEvent::Removed(m) => format!("-{}", m.id),
            })
            .collect()
    }

    #[test]
    fn missing_anchor_replaces_the_log() {
        let mut sync = Synchronizer::new();
        sync.apply_batch(batch(&["1", "2", "3"]));

        // "1" rolled out of the gateway window and "3" was deleted while away.
        let events = sync.apply_batch(batch(&["2", "4", "5"]));

        assert_eq!(changes(&events), vec!["-1", "-3", "+4", "+5"]);
        assert_eq!(ids(&sync), vec!["2", "4", "5"]);
        assert!(!sync.contains("3"));
    }

    #[test]
    fn replace_readds_survivors_that_are_out_of_order() {
        let mut sync = Synchronizer::new();
        sync.apply_batch(batch(&["2", "3"]));

        let events = sync.apply_batch(batch(&["9", "2", "4", "2"]));

        assert_eq!(changes(&events), vec!["-3", "-2", "+9", "+2", "+4"]);
        assert_eq!(ids(&sync), vec!["9", "2", "4"]);
    }

    #[test]
    fn replace_with_empty_batch_clears_the_log() {
        let mut sync = Synchronizer::new();
        sync.apply_batch(batch(&["1", "2"]));
        sync.apply_action(ChatAction::PostMessage(msg("")));

        let events = sync.apply_batch(vec![]);

        assert_eq!(changes(&events), vec!["-1", "-2", "-"]);
        assert!(sync.is_empty());
        assert!(!sync.contains("1"));
    }


    #[test]
    fn duplicate_ids_inside_first_batch_are_dropped() {
        let mut sync = Synchronizer::new();
        let events = sync.apply_batch(batch(&["1", "2", "1"]));
        assert_eq!(added_ids(&events), vec!["1", "2"]);
    }

    #[test]
    fn post_appends() {
        let mut sync = Synchronizer::new();
        sync.apply_batch(batch(&["1"]));

        let event = sync.apply_action(ChatAction::PostMessage(msg("2")));

        assert_eq!(event, Some(LogEvent::Added(msg("2"))));
        assert_eq!(ids(&sync), vec!["1", "2"]);
    }

    #[test]
    fn post_of_held_id_is_skipped() {
        let mut sync = Synchronizer::new();
        sync.apply_batch(batch(&["1", "2"]));
        assert_eq!(sync.apply_action(ChatAction::PostMessage(msg("2"))), None);
        assert_eq!(sync.len(), 2);
    }

    #[test]
    fn delete_removes_and_is_idempotent() {
        let mut sync = Synchronizer::new();
        sync.apply_batch(batch(&["1", "2", "3"]));

        let first = sync.apply_action(ChatAction::delete("2"));
        assert_eq!(first, Some(LogEvent::Removed(msg("2"))));
        assert_eq!(ids(&sync), vec!["1", "3"]);
        assert!(!sync.contains("2"));

        assert_eq!(sync.apply_action(ChatAction::delete("2")), None);
        assert_eq!(ids(&sync), vec!["1", "3"]);
    }

    #[test]
    fn delete_of_unknown_id_is_noop() {
        let mut sync = Synchronizer::new();
        assert_eq!(sync.apply_action(ChatAction::delete("nope")), None);
        assert_eq!(sync.apply_action(ChatAction::delete("")), None);
        assert!(sync.is_empty());
    }

    #[test]
    fn deleted_tail_reanchors_on_previous_message() {
        let mut sync = Synchronizer::new();
        sync.apply_batch(batch(&["1", "2"]));
        sync.apply_action(ChatAction::PostMessage(msg("3")));
        sync.apply_action(ChatAction::delete("3"));

        let events = sync.apply_batch(batch(&["1", "2", "4"]));
        assert_eq!(added_ids(&events), vec!["4"]);
        assert_eq!(ids(&sync), vec!["1", "2", "4"]);
    }
}

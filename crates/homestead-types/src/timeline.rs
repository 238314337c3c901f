//! Client-side view of one conversation.
//!
//! Sends are optimistic: a message is shown as `Pending` as soon as the user
//! submits it, becomes `Committed` once the REST call returns the persisted
//! message, or `Failed` if it errors. Gateway broadcasts and REST refetches feed
//! the same committed set, deduplicated by message id, so a broadcast that
//! arrives before or after the REST response never shows twice.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::api::MessageResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Pending,
    Committed,
    Failed,
}

/// A message that exists only locally.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalMessage {
    pub client_id: Uuid,
    pub text: String,
    pub attachments: Vec<String>,
    pub queued_at: DateTime<Utc>,
    pub delivery: Delivery,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Entry<'a> {
    Committed(&'a MessageResponse),
    Local(&'a LocalMessage),
}

impl<'a> Entry<'a> {
    pub fn delivery(&self) -> Delivery {
        match self {
            Entry::Committed(_) => Delivery::Committed,
            Entry::Local(local) => local.delivery,
        }
    }

    /// Borrowed from the timeline, not from the entry.
    pub fn text(&self) -> &'a str {
        match *self {
            Entry::Committed(message) => &message.text,
            Entry::Local(local) => &local.text,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Timeline {
    conversation_id: Uuid,
    committed: BTreeMap<(DateTime<Utc>, i64), MessageResponse>,
    keys: HashMap<Uuid, (DateTime<Utc>, i64)>,
    local: Vec<LocalMessage>,
}

impl Timeline {
    pub fn new(conversation_id: Uuid) -> Self {
        Self {
            conversation_id,
            committed: BTreeMap::new(),
            keys: HashMap::new(),
            local: Vec::new(),
        }
    }

    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    /// Queue an optimistic send. Returns the client id to reconcile against.
    pub fn push_pending(&mut self, text: impl Into<String>, attachments: Vec<String>) -> Uuid {
        let client_id = Uuid::new_v4();
        self.local.push(LocalMessage {
            client_id,
            text: text.into(),
            attachments,
            queued_at: Utc::now(),
            delivery: Delivery::Pending,
        });
        client_id
    }

    /// The server accepted the send. Returns false if `client_id` is unknown.
    pub fn commit(&mut self, client_id: Uuid, message: MessageResponse) -> bool {
        let Some(pos) = self.local.iter().position(|m| m.client_id == client_id) else {
            return false;
        };
        self.local.remove(pos);
        self.insert(message);
        true
    }

    pub fn fail(&mut self, client_id: Uuid) -> bool {
        match self.local.iter_mut().find(|m| m.client_id == client_id) {
            Some(local) if local.delivery == Delivery::Pending => {
                local.delivery = Delivery::Failed;
                true
            }
            _ => false,
        }
    }

    /// Move a failed send back to pending so the caller can resubmit it.
    pub fn retry(&mut self, client_id: Uuid) -> Option<&LocalMessage> {
        let local = self
            .local
            .iter_mut()
            .find(|m| m.client_id == client_id && m.delivery == Delivery::Failed)?;
        local.delivery = Delivery::Pending;
        Some(local)
    }

    pub fn discard(&mut self, client_id: Uuid) -> bool {
        let before = self.local.len();
        self.local.retain(|m| m.client_id != client_id);
        before != self.local.len()
    }

    /// Apply a `newMessage` broadcast. Messages for other conversations and
    /// messages already present are ignored.
    pub fn apply_broadcast(&mut self, message: MessageResponse) -> bool {
        if message.conversation_id != self.conversation_id {
            return false;
        }
        self.insert(message)
    }

    /// Apply a `messagesRead` broadcast.
    pub fn apply_read(&mut self, user_id: Uuid) {
        for message in self.committed.values_mut() {
            if !message.read_by.contains(&user_id) {
                message.read_by.push(user_id);
            }
        }
    }

    /// Replace committed history with a REST refetch, e.g. after reconnecting.
    /// Local pending and failed sends are kept.
    pub fn replace_with(&mut self, history: Vec<MessageResponse>) {
        self.committed.clear();
        self.keys.clear();
        for message in history {
            if message.conversation_id == self.conversation_id {
                self.insert(message);
            }
        }
    }

    /// Committed messages in store order, followed by local sends in submission order.
    pub fn entries(&self) -> impl Iterator<Item = Entry<'_>> {
        self.committed
            .values()
            .map(Entry::Committed)
            .chain(self.local.iter().map(Entry::Local))
    }

    pub fn len(&self) -> usize {
        self.committed.len() + self.local.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&mut self, message: MessageResponse) -> bool {
        if self.keys.contains_key(&message.id) {
            return false;
        }
        let key = (message.created_at, message.seq);
        self.keys.insert(message.id, key);
        self.committed.insert(key, message);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn message(conversation_id: Uuid, seq: i64, text: &str, at: DateTime<Utc>) -> MessageResponse {
        let sender = Uuid::new_v4();
        MessageResponse {
            id: Uuid::new_v4(),
            seq,
            conversation_id,
            sender_id: sender,
            sender_name: "ann".into(),
            text: text.into(),
            attachments: vec![],
            created_at: at,
            read_by: vec![sender],
        }
    }

    #[test]
    fn commit_replaces_pending() {
        let cid = Uuid::new_v4();
        let mut tl = Timeline::new(cid);
        let client_id = tl.push_pending("hello", vec![]);
        assert_eq!(tl.entries().next().unwrap().delivery(), Delivery::Pending);

        let saved = message(cid, 1, "hello", Utc::now());
        assert!(tl.commit(client_id, saved.clone()));
        assert_eq!(tl.len(), 1);

        // The broadcast of the same message arrives afterwards.
        assert!(!tl.apply_broadcast(saved));
        assert_eq!(tl.len(), 1);
        assert_eq!(tl.entries().next().unwrap().delivery(), Delivery::Committed);
    }

    #[test]
    fn broadcast_before_rest_response_is_not_duplicated() {
        let cid = Uuid::new_v4();
        let mut tl = Timeline::new(cid);
        let client_id = tl.push_pending("hi", vec![]);
        let saved = message(cid, 1, "hi", Utc::now());

        assert!(tl.apply_broadcast(saved.clone()));
        assert!(tl.commit(client_id, saved));
        assert_eq!(tl.len(), 1);
    }

    #[test]
    fn failed_send_can_be_retried() {
        let mut tl = Timeline::new(Uuid::new_v4());
        let client_id = tl.push_pending("oops", vec![]);
        assert!(tl.fail(client_id));
        assert!(!tl.fail(client_id));
        assert_eq!(tl.entries().next().unwrap().delivery(), Delivery::Failed);

        let local = tl.retry(client_id).unwrap();
        assert_eq!(local.text, "oops");
        assert_eq!(local.delivery, Delivery::Pending);
        assert!(tl.discard(client_id));
        assert!(tl.is_empty());
    }

    #[test]
    fn entries_follow_store_order() {
        let cid = Uuid::new_v4();
        let now = Utc::now();
        let mut tl = Timeline::new(cid);
        tl.apply_broadcast(message(cid, 3, "third", now + Duration::seconds(1)));
        tl.apply_broadcast(message(cid, 2, "second", now));
        tl.apply_broadcast(message(cid, 1, "first", now));
        tl.push_pending("draft", vec![]);

        let texts: Vec<&str> = tl.entries().map(|e| e.text()).collect();
        assert_eq!(texts, vec!["first", "second", "third", "draft"]);
    }

    #[test]
    fn refetch_keeps_local_sends_and_drops_foreign_messages() {
        let cid = Uuid::new_v4();
        let mut tl = Timeline::new(cid);
        tl.apply_broadcast(message(cid, 1, "stale", Utc::now()));
        tl.push_pending("draft", vec![]);

        tl.replace_with(vec![
            message(cid, 2, "fresh", Utc::now()),
            message(Uuid::new_v4(), 3, "elsewhere", Utc::now()),
        ]);
        let texts: Vec<&str> = tl.entries().map(|e| e.text()).collect();
        assert_eq!(texts, vec!["fresh", "draft"]);
    }

    #[test]
    fn read_receipts_are_applied_once() {
        let cid = Uuid::new_v4();
        let reader = Uuid::new_v4();
        let mut tl = Timeline::new(cid);
        tl.apply_broadcast(message(cid, 1, "a", Utc::now()));
        tl.apply_read(reader);
        tl.apply_read(reader);
        match tl.entries().next().unwrap() {
            Entry::Committed(m) => assert_eq!(m.read_by.iter().filter(|u| **u == reader).count(), 1),
            Entry::Local(_) => panic!("expected committed entry"),
        }
    }
}

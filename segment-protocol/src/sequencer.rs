//! Per-conversation sequence tracking for the segment server.
//!
//! Each conversation remembers the last segment number it accepted
//! ([`SequenceState::last_segment_no`]); the next acceptable segment is
//! `last + 1`.  A conversation is fixed at [`DEFAULT_CONVERSATION_LENGTH`]
//! accepted segments, after which it starts again from zero.  Any violation
//! also starts it again from zero.
//!
//! Conversations are keyed by source address and client id
//! ([`KeyMode::PerConversation`]).  [`KeyMode::Shared`] folds all traffic
//! onto a single key, which reproduces a server with one process-wide
//! counter: interleaved clients then disturb each other's sequencing.
//!
//! The table is bounded.  An entry is created on first contact, removed on
//! reset, and the least recently seen entry is evicted when the table is
//! full.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

use crate::validator::Inspection;

/// Accepted segments per conversation before the counter restarts.
pub const DEFAULT_CONVERSATION_LENGTH: u8 = 5;

/// Upper bound on concurrently tracked conversations.
pub const DEFAULT_MAX_CONVERSATIONS: usize = 1024;

/// How incoming datagrams are grouped into conversations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyMode {
    /// One conversation per (source address, client id).
    #[default]
    PerConversation,
    /// Every datagram belongs to the same conversation.
    Shared,
}

/// Identifies one conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversationKey {
    Peer { addr: SocketAddr, client_id: u8 },
    Shared,
}

/// Sequence state of a single conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SequenceState {
    pub last_segment_no: u8,
}

impl SequenceState {
    pub fn reset(&mut self) {
        self.last_segment_no = 0;
    }

    pub fn advance(&mut self, segment_no: u8) {
        self.last_segment_no = segment_no;
    }
}

#[derive(Debug)]
struct Entry {
    state: SequenceState,
    last_seen: Instant,
}

/// All live conversations of one server.
#[derive(Debug)]
pub struct Sequencer {
    mode: KeyMode,
    conversation_length: u8,
    max_conversations: usize,
    entries: HashMap<ConversationKey, Entry>,
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new(KeyMode::default())
    }
}

impl Sequencer {
    pub fn new(mode: KeyMode) -> Self {
        Self::with_limits(mode, DEFAULT_CONVERSATION_LENGTH, DEFAULT_MAX_CONVERSATIONS)
    }

    pub fn with_limits(mode: KeyMode, conversation_length: u8, max_conversations: usize) -> Self {
        Self {
            mode,
            conversation_length,
            max_conversations: max_conversations.max(1),
            entries: HashMap::new(),
        }
    }

    /// Map a datagram's origin onto its conversation key.
    pub fn key(&self, addr: SocketAddr, client_id: u8) -> ConversationKey {
        match self.mode {
            KeyMode::PerConversation => ConversationKey::Peer { addr, client_id },
            KeyMode::Shared => ConversationKey::Shared,
        }
    }

    /// Last accepted segment number for `key` (0 for an unknown conversation).
    pub fn last_segment_no(&self, key: &ConversationKey) -> u8 {
        self.entries
            .get(key)
            .map_or(0, |e| e.state.last_segment_no)
    }

    /// Apply the outcome of one inspection to the conversation's state.
    ///
    /// An accepted segment advances the counter, unless it completes the
    /// conversation, in which case the conversation is reset.  A violation
    /// always resets.
    pub fn record(&mut self, key: ConversationKey, inspection: &Inspection<'_>) {
        if inspection.is_ok() && inspection.segment_no != self.conversation_length {
            self.state_mut(key).advance(inspection.segment_no);
        } else {
            self.reset(&key);
        }
    }

    /// Forget a conversation; it restarts from segment 1 on next contact.
    pub fn reset(&mut self, key: &ConversationKey) {
        self.entries.remove(key);
    }

    /// Number of conversations currently mid-flight.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn state_mut(&mut self, key: ConversationKey) -> &mut SequenceState {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_conversations {
            self.evict_oldest();
        }
        let entry = self.entries.entry(key).or_insert_with(|| Entry {
            state: SequenceState::default(),
            last_seen: Instant::now(),
        });
        entry.last_seen = Instant::now();
        &mut entry.state
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_seen)
            .map(|(k, _)| *k);
        if let Some(key) = oldest {
            log::debug!("[sequencer] evicting idle conversation {key:?}");
            self.entries.remove(&key);
        }
    }
}

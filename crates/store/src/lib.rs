//! Storage collaborators for the chat pipeline: the [`ChatStore`] and
//! [`StoreResolver`] traits, an in-memory store with daily counters, and
//! the JSONL transcript writer.

pub mod memory;
pub mod store;
pub mod transcript;

pub use memory::MemoryStore;
pub use store::{
    CallerProfile, ChatStore, ConversationMeta, MessageRecord, SharedStoreResolver, StoreHandle,
    StoreResolver,
};
pub use transcript::{TranscriptLine, TranscriptWriter};

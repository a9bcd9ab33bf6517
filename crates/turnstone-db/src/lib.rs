pub mod checkpoint_store;
pub mod memory_store;

pub use checkpoint_store::{
    Checkpoint, CheckpointStore, CheckpointSummary, SqliteCheckpointStore,
};
pub use memory_store::{KeywordMemoryStore, MemoryRecall};

//! External collaborator interfaces named in the crate's scope boundary:
//! model inference, the memory store, and the focus manager. These are the
//! seams at which real LLM inference, a real vector/graph store, and a real
//! focus board would be wired in; none of that is implemented here.

/// `FocusManager` trait and in-memory test double.
pub mod focus;
/// `LLMBackend` trait, streaming types, and a deterministic test double.
pub mod llm;
/// `MemoryStore` trait and in-memory test double.
pub mod memory;

pub use focus::{FocusManager, InMemoryFocusManager};
pub use llm::{EchoLLMBackend, LLMBackend, ModelTier, StreamParams, Token};
pub use memory::{Hit, InMemoryMemoryStore, MemoryStore};

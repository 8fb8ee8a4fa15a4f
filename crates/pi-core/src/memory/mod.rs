//! Short-term conversation memory
//!
//! Keeps the last few turns of each conversation in process so the chat
//! service can prepend recent history to a prompt.

mod clock;
mod store;
mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use store::{ConversationStore, StoreLimits};
pub use types::{Role, Turn};

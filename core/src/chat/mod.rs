//! Kid-facing tutor chat: message checks, prompt selection and the
//! streaming relay.

mod context;
mod relay;
pub mod safety;

pub use context::{ChatContext, LESSON_CONTEXT_CHARS, system_prompt};
pub use relay::{ChatRelay, RelayEvent};

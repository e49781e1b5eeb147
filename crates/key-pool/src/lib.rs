//! Rotating API-key pool and the completion client built on it
//!
//! Holds an ordered list of interchangeable Gemini API keys with a rotation
//! pointer, and wraps every completion request so that a quota or rate-limit
//! failure on the active key rotates to the next key and retries exactly once.
//!
//! Request lifecycle:
//! 1. Client holds a configuration bound to `keys[current_index]`
//! 2. Prompt = instruction preamble + caller context + user question
//! 3. Failure text mentioning "quota" or "limit" → advance, rebind, retry once
//! 4. Every failure path resolves to one of three placeholder strings

pub mod completion;
pub mod error;
pub mod pool;
pub mod prompt;
pub mod quota;

pub use completion::{CompletionClient, KeyInfo, Placeholders};
pub use error::{Error, Result};
pub use pool::{CredentialPool, PoolStatus};
pub use prompt::PromptTemplate;
pub use quota::{classify_failure, classify_message};

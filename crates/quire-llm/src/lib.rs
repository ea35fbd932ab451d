//! Model provider abstraction and backend implementations.

pub mod any;
#[cfg(feature = "candle")]
pub mod candle_provider;
pub mod claude;
pub mod error;
pub mod http;
#[cfg(feature = "mock")]
pub mod mock;
pub mod ollama;
pub mod provider;
mod retry;

pub use error::LlmError;
pub use provider::LlmProvider;

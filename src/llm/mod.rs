//! LLM 层：客户端抽象、消息类型与 Mock 实现

pub mod message;
pub mod mock;
pub mod traits;

pub use message::{Message, Role};
pub use mock::MockLlmClient;
pub use traits::LlmClient;

//! LLM 客户端抽象
//!
//! 后端实现 LlmClient：complete（非流式）、complete_stream（流式增量文本）。
//! 具体的 HTTP 后端由外层应用提供，本 crate 只依赖该 trait。

use async_trait::async_trait;

use crate::agents::TextStream;
use crate::llm::Message;

/// LLM 客户端 trait：非流式完成与流式完成（返回增量文本流）
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成
    async fn complete(&self, messages: &[Message]) -> Result<String, String>;

    /// 流式完成；默认把 complete 的结果作为单个分片
    async fn complete_stream(&self, messages: &[Message]) -> Result<TextStream, String> {
        let content = self.complete(messages).await?;
        Ok(Box::pin(futures_util::stream::iter(vec![Ok(content)])))
    }

    /// 累计 token 使用：(prompt_tokens, completion_tokens, total_tokens)，默认 (0, 0, 0)
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

//! Mock LLM 客户端（用于测试与演示，无需 API）
//!
//! 按顺序返回预设回复；预设用完后回显最后一条 User 消息。
//! 流式调用把回复按空白切成多个分片，便于验证分片转发。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;

use crate::agents::TextStream;
use crate::llm::{LlmClient, Message, Role};

#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预设一组成功回复
    pub fn scripted<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client = Self::default();
        for r in responses {
            client.push_response(r);
        }
        client
    }

    pub fn push_response(&self, response: impl Into<String>) {
        if let Ok(mut q) = self.script.lock() {
            q.push_back(Ok(response.into()));
        }
    }

    pub fn push_failure(&self, reason: impl Into<String>) {
        if let Ok(mut q) = self.script.lock() {
            q.push_back(Err(reason.into()));
        }
    }

    /// 已收到的调用（每次调用的完整消息列表）
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }
        let next = self.script.lock().ok().and_then(|mut q| q.pop_front());
        if let Some(scripted) = next {
            return scripted;
        }
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        Ok(format!("Echo from Mock: {}", last_user))
    }

    async fn complete_stream(&self, messages: &[Message]) -> Result<TextStream, String> {
        let content = self.complete(messages).await?;
        let chunks: Vec<Result<String, String>> = content
            .split_inclusive(char::is_whitespace)
            .map(|s| Ok(s.to_string()))
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_scripted_then_echo() {
        let llm = MockLlmClient::scripted(["first"]);
        llm.push_failure("boom");
        assert_eq!(llm.complete(&[Message::user("hi")]).await.unwrap(), "first");
        assert_eq!(llm.complete(&[Message::user("hi")]).await.unwrap_err(), "boom");
        assert_eq!(
            llm.complete(&[Message::user("hi")]).await.unwrap(),
            "Echo from Mock: hi"
        );
        assert_eq!(llm.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_stream_chunks_reassemble() {
        let llm = MockLlmClient::scripted(["one two three"]);
        let stream = llm.complete_stream(&[Message::user("x")]).await.unwrap();
        let chunks: Vec<String> = stream.map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), "one two three");
    }
}

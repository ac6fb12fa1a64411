//! `generate_image(path, prompt)`：调用图片生成服务并写入工作区

use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::ImageGenerator;
use crate::core::DirectiveError;
use crate::directives::registry::{Args, DirectiveContext, DirectiveHandler};
use crate::directives::DirectiveEvent;
use crate::workspace::ChangeAction;

pub struct GenerateImage {
    generator: Arc<dyn ImageGenerator>,
}

impl GenerateImage {
    pub fn new(generator: Arc<dyn ImageGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl DirectiveHandler for GenerateImage {
    fn name(&self) -> &str {
        "generate_image"
    }

    fn description(&self) -> &str {
        "generate_image(path, prompt): generate an image and save it at path"
    }

    async fn execute(
        &self,
        args: &Args<'_>,
        ctx: &mut DirectiveContext<'_>,
    ) -> Result<Vec<DirectiveEvent>, DirectiveError> {
        args.expect_count(2, 2)?;
        let path = args.text(0)?;
        let prompt = args.text(1)?;
        // 先校验路径，避免为越界路径白白调用生成服务
        let target = ctx.workspace.safe_path(path)?;
        let rel = ctx.workspace.relative(&target);

        let bytes = self
            .generator
            .generate(prompt)
            .await
            .map_err(DirectiveError::ImageGeneration)?;
        if bytes.is_empty() {
            return Err(DirectiveError::NoImageData(rel));
        }
        let existed = ctx.workspace.exists(path);
        ctx.workspace.write_bytes(path, &bytes)?;
        let action = if existed {
            ChangeAction::Written
        } else {
            ChangeAction::Created
        };
        ctx.state
            .record_change(action, rel.clone(), Some(format!("image, {} bytes", bytes.len())));
        ctx.artifacts.push(rel.clone());
        Ok(vec![DirectiveEvent::file_changed(rel)])
    }
}

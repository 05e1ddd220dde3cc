//! 实时验证：对刚绑定（或缓存中）的模型跑一次固定的探测输入
//!
//! 空输出、格式不符、报错或超时都视为完整的加载失败，而不是部分成功。

use std::time::Duration;

use crate::core::LoadError;
use crate::engine::{InferenceInput, InferenceOutput, ModelHandle, ModelTask};

/// 验证调用的生成长度上限
const VERIFY_MAX_NEW_TOKENS: u32 = 16;

pub async fn verify_handle(
    handle: &dyn ModelHandle,
    task: ModelTask,
    probe_input: &str,
    timeout: Duration,
) -> Result<InferenceOutput, LoadError> {
    let input = InferenceInput::new(probe_input).with_max_new_tokens(VERIFY_MAX_NEW_TOKENS);
    let output = match tokio::time::timeout(timeout, handle.run(&input)).await {
        Err(_) => {
            return Err(LoadError::VerificationFailure(format!(
                "no output within {}ms",
                timeout.as_millis()
            )))
        }
        Ok(Err(msg)) => return Err(LoadError::VerificationFailure(msg)),
        Ok(Ok(output)) => output,
    };

    let kind_matches = matches!(
        (task, &output),
        (ModelTask::TextClassification, InferenceOutput::Labels { .. })
            | (ModelTask::Text2TextGeneration, InferenceOutput::Text { .. })
    );
    if !kind_matches || !output.is_well_formed() {
        return Err(LoadError::VerificationFailure(
            "model produced empty or malformed output".to_string(),
        ));
    }
    Ok(output)
}

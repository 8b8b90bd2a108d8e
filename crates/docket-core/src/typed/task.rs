//! Task trait - 型付き Task の定義
//!
//! # 学習ポイント
//! - Associated Constants (`const NAME`)
//! - Trait bounds の組み合わせ (DeserializeOwned + Send + 'static)

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::handler::JobCall;
use crate::domain::JobError;

/// Task は task_name と入力の型を対応付ける
///
/// # 使用例
/// ```ignore
/// #[derive(Deserialize)]
/// struct AnalyzeDocument {
///     document_id: String,
/// }
///
/// impl Task for AnalyzeDocument {
///     const NAME: &'static str = "document_analysis";
/// }
/// ```
///
/// 既定では `kwargs` をオブジェクトとして T にデコードします。
/// 位置引数を使う Task は `decode` を上書きしてください。
pub trait Task: DeserializeOwned + Send + 'static {
    /// Registry key. Must be a well-formed task name.
    const NAME: &'static str;

    fn decode(call: &JobCall) -> Result<Self, JobError> {
        serde_json::from_value(Value::Object(call.kwargs.clone()))
            .map_err(|e| JobError::handler(format!("invalid kwargs for {}: {e}", Self::NAME)))
    }
}

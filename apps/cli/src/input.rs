//! 序列输入：命令行文本或文件，二选一

use clap::Args;
use gasmix_sdk::tools::SequenceInput;
use std::path::PathBuf;

#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct InputArgs {
    /// 逗号分隔的数值，如 `10,5000,5,3000`
    #[arg(long, value_name = "TEXT", allow_hyphen_values = true)]
    pub input: Option<String>,

    /// 从文件读取（内容格式同 --input）
    #[arg(long, value_name = "PATH")]
    pub file: Option<PathBuf>,
}

impl InputArgs {
    pub fn source(&self) -> SequenceInput {
        match (&self.input, &self.file) {
            (_, Some(path)) => SequenceInput::File(path.clone()),
            (Some(text), None) => SequenceInput::Inline(text.clone()),
            // clap 保证二者恰有其一
            (None, None) => SequenceInput::Inline(String::new()),
        }
    }
}

//! 备份请求的前置校验：目录、名称、重试参数

use regex::Regex;
use std::time::Duration;

use crate::error::{BackupError, Result, Status};

const FOLDER_PATTERN: &str = r"^[.:/A-Za-z0-9_-]*$";
const NAME_PATTERN: &str = r"^[.:A-Za-z0-9_-]*$";

fn matches(pattern: &str, value: &str) -> Result<bool> {
    let re = Regex::new(pattern)
        .map_err(|e| BackupError::custom(format!("正则表达式编译失败: {e}")))?;
    Ok(re.is_match(value))
}

/// 校验备份目录：允许为空；非空时必须是规范的相对路径，不能指向上级目录
pub fn is_folder_safe(folder: &str) -> Result<()> {
    if folder.is_empty() {
        return Ok(());
    }

    let canonical = clean_path(folder);
    if canonical != folder {
        return Err(Status::invalid_argument(format!(
            "Specified folder in non-canonical format, canonical would be: {canonical:?}."
        ))
        .into());
    }

    if folder.starts_with('/') {
        return Err(Status::invalid_argument(
            "Folder should be a relative path (shouldn't contain leading slashes).",
        )
        .into());
    }

    if folder == ".." || folder.starts_with("../") {
        return Err(
            Status::invalid_argument("Specified folder refers to a parent directory.").into(),
        );
    }

    if !matches(FOLDER_PATTERN, folder)? {
        return Err(Status::invalid_argument(
            "Folder name can contain only dots, colons, slashes, letters, digits, underscores and dashes.",
        )
        .into());
    }

    Ok(())
}

/// 校验备份名称，字符集与目录相同但不允许斜杠
pub fn is_name_safe(name: &str) -> Result<()> {
    if !matches(NAME_PATTERN, name)? {
        return Err(Status::invalid_argument(
            "Backup name can contain only dots, colons, letters, digits, underscores and dashes.",
        )
        .into());
    }
    Ok(())
}

/// 重试上限错误信息的写法
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundsMessage {
    /// `Exceeded max retries 10.`，新建备份和计划时使用
    Sentence,
    /// `exceeded max retries 10`，修改计划时使用
    Lowercase,
}

impl BoundsMessage {
    fn render(self, text: String) -> String {
        match self {
            BoundsMessage::Lowercase => text,
            BoundsMessage::Sentence => {
                let mut chars = text.chars();
                match chars.next() {
                    Some(first) => format!("{}{}.", first.to_uppercase(), chars.as_str()),
                    None => text,
                }
            }
        }
    }
}

/// 校验重试次数与重试间隔上限，未给出的值不检查
pub fn check_retry_bounds(
    retries: Option<u32>,
    retry_interval: Option<Duration>,
    max_retries: u32,
    max_retry_interval: Duration,
    style: BoundsMessage,
) -> Result<()> {
    if retries.is_some_and(|r| r > max_retries) {
        let message = style.render(format!("exceeded max retries {max_retries}"));
        return Err(Status::invalid_argument(message).into());
    }
    if retry_interval.is_some_and(|i| i > max_retry_interval) {
        let message = style.render(format!(
            "exceeded max retry interval {}",
            format_duration(max_retry_interval)
        ));
        return Err(Status::invalid_argument(message).into());
    }
    Ok(())
}

/// 按 `8h0m0s` 的形式输出时长
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let nanos = duration.subsec_nanos();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    let seconds = if nanos == 0 {
        format!("{seconds}s")
    } else {
        let frac = format!("{:09}", nanos);
        format!("{seconds}.{}s", frac.trim_end_matches('0'))
    };

    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}")
    } else {
        seconds
    }
}

/// 纯词法的路径规范化：合并多余斜杠，去掉 `.`，消解 `..`
///
/// 结果为空时返回 `.`；绝对路径开头的 `..` 直接丢弃。
pub fn clean_path(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }

    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for part in path.split('/') {
        match part {
            "" | "." => continue,
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if rooted => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

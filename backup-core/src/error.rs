use std::fmt;

use thiserror::Error;

use crate::backup::executor::ExecutorError;

pub type Result<T> = std::result::Result<T, BackupError>;

/// 对外接口使用的状态码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    InvalidArgument,
    FailedPrecondition,
    NotFound,
    AlreadyExists,
    OutOfRange,
    Unimplemented,
    Unknown,
    Internal,
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Code::InvalidArgument => "InvalidArgument",
            Code::FailedPrecondition => "FailedPrecondition",
            Code::NotFound => "NotFound",
            Code::AlreadyExists => "AlreadyExists",
            Code::OutOfRange => "OutOfRange",
            Code::Unimplemented => "Unimplemented",
            Code::Unknown => "Unknown",
            Code::Internal => "Internal",
        };
        f.write_str(s)
    }
}

/// 附加在 FailedPrecondition 上的细分错误码，供调用方识别具体的环境问题
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    XtrabackupNotInstalled,
    InvalidXtrabackup,
    IncompatibleXtrabackup,
    IncompatibleTargetMysql,
    IncompatibleTargetMongodb,
}

/// 对外接口错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub code: Code,
    pub message: String,
    pub error_code: Option<ErrorCode>,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            error_code: None,
        }
    }

    pub fn with_error_code(mut self, error_code: ErrorCode) -> Self {
        self.error_code = Some(error_code);
        self
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Self::new(Code::FailedPrecondition, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Code::NotFound, message)
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::new(Code::Unimplemented, message)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("{0}")]
    Status(Status),

    #[error("{0}: not found")]
    NotFound(String),

    #[error("{0}: already exists")]
    AlreadyExists(String),

    /// 任务参数校验失败
    #[error("{0}")]
    Validation(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0}: the specified backup model is not compatible with other parameters")]
    IncompatibleDataModel(String),

    #[error("location and folder pair is already used by another service")]
    LocationFolderPairAlreadyUsed,

    #[error("scheduled backup for this service, location and folder already exists")]
    ScheduleOverlap,

    #[error("{0}")]
    Executor(#[from] ExecutorError),

    #[error("任务已取消")]
    Cancelled,

    #[error("Cron表达式无效: {0}")]
    Cron(String),

    #[error("DuckDB数据库错误: {0}")]
    DuckDb(String),

    #[error("配置错误: {0}")]
    Config(#[from] toml::de::Error),

    #[error("配置序列化错误: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("任务执行错误: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("自定义错误: {0}")]
    Custom(String),
}

// 为DuckDB错误实现From trait
impl From<duckdb::Error> for BackupError {
    fn from(err: duckdb::Error) -> Self {
        BackupError::DuckDb(err.to_string())
    }
}

impl From<Status> for BackupError {
    fn from(status: Status) -> Self {
        BackupError::Status(status)
    }
}

impl BackupError {
    pub fn custom(msg: impl Into<String>) -> Self {
        BackupError::Custom(msg.into())
    }

    pub fn status(code: Code, message: impl Into<String>) -> Self {
        BackupError::Status(Status::new(code, message))
    }

    /// 返回对外状态（如果已经转换过）
    pub fn as_status(&self) -> Option<&Status> {
        match self {
            BackupError::Status(s) => Some(s),
            _ => None,
        }
    }

    /// 返回状态码；未转换的错误视为 Unknown
    pub fn code(&self) -> Code {
        match self {
            BackupError::Status(s) => s.code,
            _ => Code::Unknown,
        }
    }
}

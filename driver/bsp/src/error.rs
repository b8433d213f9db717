//! 驱动错误分类
//!
//! 传输、协议、关联（join）、扫描、注册表与参数错误统一为 [WhdError]。
//! 固件报告的 "unsupported"（BCME −23）单独成一类，调用方可经 [Tolerate] 显式容忍。

use thiserror::Error;

/// BCME 错误码：固件不支持该命令/变量
pub const BCME_UNSUPPORTED: i32 = -23;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WhdError {
    // 传输
    #[error("command timed out")]
    Timeout,
    #[error("buffer allocation failed")]
    NoMem,
    #[error("response does not match the outstanding request")]
    IdMismatch,
    #[error("bus transfer failed")]
    Bus,

    // 协议
    #[error("chip reported error {0}")]
    Chip(i32),
    #[error("unsupported by firmware")]
    Unsupported,
    #[error("malformed frame")]
    MalformedFrame,

    // 关联
    #[error("invalid key for the requested security")]
    InvalidKey,
    #[error("invalid ssid")]
    BadSsid,
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("not keyed")]
    NotKeyed,
    #[error("join in progress")]
    JoinInProgress,
    #[error("network not found")]
    NetworkNotFound,
    #[error("EAPOL M1 timeout")]
    EapolM1Timeout,
    #[error("EAPOL M3 timeout")]
    EapolM3Timeout,
    #[error("EAPOL G1 timeout")]
    EapolG1Timeout,
    #[error("EAPOL key failure")]
    EapolKeyFailure,
    #[error("invalid join status")]
    InvalidJoinStatus,

    // 扫描
    #[error("bss info outside the enclosing buffer")]
    ProtocolBounds,
    #[error("unexpected bss count in escan result")]
    BadBssCount,
    #[error("scan aborted")]
    ScanAborted,
    #[error("operation already in progress")]
    Busy,

    // 注册表
    #[error("no free event slot")]
    OutOfSpace,
    #[error("too many events in one subscription")]
    TooManyEvents,

    // 参数
    #[error("bad argument")]
    BadArg,
    #[error("invalid interface")]
    InvalidInterface,
}

pub type WhdResult<T> = core::result::Result<T, WhdError>;

/// Linux errno（取负后用于 `Result<_, i32>` 接口）
mod errno {
    pub const ENOENT: i32 = 2;
    pub const EIO: i32 = 5;
    pub const ENOMEM: i32 = 12;
    pub const EBUSY: i32 = 16;
    pub const ENODEV: i32 = 19;
    pub const EINVAL: i32 = 22;
    pub const ENOSPC: i32 = 28;
    pub const EPROTO: i32 = 71;
    pub const EBADMSG: i32 = 74;
    pub const EOPNOTSUPP: i32 = 95;
    pub const ENOTCONN: i32 = 107;
    pub const ETIMEDOUT: i32 = 110;
    pub const EALREADY: i32 = 114;
    pub const EINPROGRESS: i32 = 115;
    pub const ECANCELED: i32 = 125;
    pub const EKEYREJECTED: i32 = 129;
}

impl WhdError {
    /// 由 CDC 响应中的固件状态构造
    pub fn from_chip_status(status: i32) -> Self {
        if status == BCME_UNSUPPORTED {
            WhdError::Unsupported
        } else {
            WhdError::Chip(status)
        }
    }

    /// 负 errno
    pub fn errno(self) -> i32 {
        use errno::*;
        let e = match self {
            WhdError::Timeout
            | WhdError::EapolM1Timeout
            | WhdError::EapolM3Timeout
            | WhdError::EapolG1Timeout => ETIMEDOUT,
            WhdError::NoMem => ENOMEM,
            WhdError::IdMismatch | WhdError::MalformedFrame | WhdError::BadBssCount => EBADMSG,
            WhdError::Bus | WhdError::Chip(_) => EIO,
            WhdError::Unsupported => EOPNOTSUPP,
            WhdError::InvalidKey | WhdError::EapolKeyFailure => EKEYREJECTED,
            WhdError::BadSsid | WhdError::BadArg | WhdError::TooManyEvents => EINVAL,
            WhdError::NotAuthenticated | WhdError::NotKeyed => ENOTCONN,
            WhdError::JoinInProgress => EINPROGRESS,
            WhdError::NetworkNotFound => ENOENT,
            WhdError::InvalidJoinStatus | WhdError::ProtocolBounds => EPROTO,
            WhdError::ScanAborted => ECANCELED,
            WhdError::Busy => EALREADY,
            WhdError::OutOfSpace => ENOSPC,
            WhdError::InvalidInterface => ENODEV,
        };
        -e
    }
}

impl From<WhdError> for i32 {
    fn from(e: WhdError) -> i32 {
        e.errno()
    }
}

/// "unsupported, continue" 软失败路径
pub trait Tolerate<T> {
    /// `Unsupported` 变为 `Ok(None)`，其它错误原样返回
    fn tolerate_unsupported(self) -> WhdResult<Option<T>>;
}

impl<T> Tolerate<T> for WhdResult<T> {
    fn tolerate_unsupported(self) -> WhdResult<Option<T>> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(WhdError::Unsupported) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

use thiserror::Error;

use crate::WireFormat;

/// Результат для операций конвертации выборок.
pub type IqResult<T> = std::result::Result<T, IqError>;

/// Ошибки уровня формата выборок.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IqError {
    /// Длина блока не кратна размеру одной IQ пары
    #[error("Malformed {format} block: {len} bytes is not a multiple of {sample_size}")]
    MalformedBlock {
        format: WireFormat,
        len: usize,
        sample_size: usize,
    },

    /// Неизвестный формат (строка или числовой код)
    #[error("Unknown wire format: {0}")]
    UnknownFormat(String),
}

impl IqError {
    pub fn malformed(
        format: WireFormat,
        len: usize,
    ) -> Self {
        Self::MalformedBlock {
            format,
            len,
            sample_size: format.sample_size(),
        }
    }

    pub fn unknown_format<S: Into<String>>(s: S) -> Self {
        Self::UnknownFormat(s.into())
    }
}

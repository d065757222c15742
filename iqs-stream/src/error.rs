use iqs_types::{Direction, IqError};
use thiserror::Error;

use crate::TransportError;

pub type StreamResult<T> = std::result::Result<T, StreamError>;

#[derive(Debug, Error)]
pub enum StreamError {
    /// start/stop/настройка вызваны в неподходящем состоянии
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Некорректная конфигурация канала или потока
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// SDR устройство не найдено
    #[error("SDR device not found: {0}")]
    DeviceNotFound(String),

    /// Индекс канала за пределами устройства
    #[error("{direction} channel {index} out of range (device has {count})")]
    ChannelOutOfRange {
        direction: Direction,
        index: usize,
        count: usize,
    },

    /// Ошибка транспорта на конкретном канале
    #[error("{direction} channel {channel}: {source}")]
    Transport {
        direction: Direction,
        channel: usize,
        #[source]
        source: TransportError,
    },

    /// Транспорт принял меньше выборок, чем было запрошено
    #[error("TX channel {channel} underrun: sent {sent} of {requested} samples")]
    Underrun {
        channel: usize,
        requested: usize,
        sent: usize,
    },

    /// Транспорт отдал меньше выборок, чем было запрошено
    #[error("RX channel {channel} short read: received {received} of {requested} samples")]
    Overrun {
        channel: usize,
        requested: usize,
        received: usize,
    },

    /// Поток воркера или диспетчера завершился паникой
    #[error("Worker panicked: {0}")]
    WorkerPanicked(String),

    /// Ошибка конвертации выборок
    #[error("Codec error: {0}")]
    Codec(#[from] IqError),

    /// Ошибка ввода/вывода (чтение конфигурации, создание потоков)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Ошибка разбора JSON конфигурации
    #[error("Config parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StreamError {
    pub fn invalid_state<S: Into<String>>(s: S) -> Self {
        Self::InvalidState(s.into())
    }

    pub fn config<S: Into<String>>(s: S) -> Self {
        Self::Config(s.into())
    }
}

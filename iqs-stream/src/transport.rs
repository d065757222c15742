//! Граница с железом.
//!
//! [`Transport`] это поток данных одного канала (аналог stream handle
//! драйвера). [`SdrDriver`] настраивает каналы и открывает потоки.
//! Реализации: [`crate::SimulatedDriver`], в будущем привязки к LimeSuite.

use std::time::Duration;

use iqs_types::{Direction, WireFormat};
use thiserror::Error;

use crate::{ChannelConfig, StreamResult};

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Сбой одного вызова транспорта.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transport error {code}: {message}")]
pub struct TransportError {
    /// Код ошибки драйвера (-1, если кода нет)
    pub code: i32,
    pub message: String,
}

/// Результат одного чтения.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecvMeta {
    /// Кол-во принятых IQ пар (0 = таймаут без данных)
    pub samples: usize,
    /// Счётчик выборок железа на начало блока
    pub timestamp: u64,
}

/// Информация об устройстве (для логирования).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub serial: Option<String>,
    pub firmware_version: Option<String>,
    pub hardware_version: Option<String>,
    pub rx_channels: usize,
    pub tx_channels: usize,
}

/// Поток данных одного канала.
///
/// Объект принадлежит либо устройству, либо (на время сессии) ровно одному
/// воркеру, поэтому методы берут `&mut self` и не требуют `Sync`.
pub trait Transport: Send {
    /// Запускает поток на стороне железа.
    fn activate(&mut self) -> TransportResult<()> {
        Ok(())
    }

    /// Останавливает поток на стороне железа. Вызывается только после
    /// завершения воркера.
    fn deactivate(&mut self) -> TransportResult<()> {
        Ok(())
    }

    /// Принимает до `max_samples` пар в `buf`, ожидая не дольше `timeout`.
    fn receive(
        &mut self,
        buf: &mut [u8],
        max_samples: usize,
        timeout: Duration,
    ) -> TransportResult<RecvMeta>;

    /// Отправляет `n_samples` пар из `buf`, ожидая не дольше `timeout`.
    /// Возвращает число принятых железом пар.
    fn send(
        &mut self,
        buf: &[u8],
        n_samples: usize,
        timeout: Duration,
    ) -> TransportResult<usize>;
}

/// Драйвер устройства: настройка каналов и открытие потоков.
pub trait SdrDriver: Send {
    fn info(&self) -> DeviceInfo;

    /// Кол-во каналов в направлении.
    fn channel_count(
        &self,
        direction: Direction,
    ) -> usize;

    /// Применяет уже проверенную конфигурацию к каналу.
    fn apply(
        &mut self,
        direction: Direction,
        index: usize,
        config: &ChannelConfig,
    ) -> StreamResult<()>;

    /// Открывает поток канала с заданным форматом и размером FIFO.
    fn open_stream(
        &mut self,
        direction: Direction,
        index: usize,
        format: WireFormat,
        fifo_size: usize,
    ) -> StreamResult<Box<dyn Transport>>;
}

impl TransportError {
    pub fn new<S: Into<String>>(
        code: i32,
        message: S,
    ) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for DeviceInfo {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(serial) = &self.serial {
            write!(f, " (serial {serial})")?;
        }
        if let Some(fw) = &self.firmware_version {
            write!(f, " fw {fw}")?;
        }
        if let Some(hw) = &self.hardware_version {
            write!(f, " hw {hw}")?;
        }
        write!(f, ", {} RX / {} TX", self.rx_channels, self.tx_channels)
    }
}

//! Отчёты о сбоях из воркеров.
//!
//! Сбои одного вызова транспорта не прерывают сессию: воркер логирует их,
//! считает в [`StreamMetrics`] и передаёт [`StreamEvent`] в callback
//! приложения. Подряд идущие сбои эскалируются по [`crate::EscalationPolicy`].

use std::sync::Arc;

use iqs_types::{Direction, IqError};
use log::{debug, error, warn};

use crate::{StreamError, StreamMetrics, TransportError};

/// Callback событий. Вызывается синхронно в потоке воркера, должен быть
/// быстрым.
pub type EventCallback = Arc<dyn Fn(&StreamEvent) + Send + Sync>;

/// Вид повторяющегося сбоя.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    TransportError,
    Underrun,
}

/// Событие стриминга.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    TransportError {
        direction: Direction,
        channel: usize,
        error: TransportError,
        consecutive: u32,
    },
    /// Транспорт вернул блок, который нельзя декодировать
    MalformedBlock {
        channel: usize,
        error: IqError,
    },
    Underrun {
        channel: usize,
        requested: usize,
        sent: usize,
    },
    /// Неполное чтение RX
    Overrun {
        channel: usize,
        requested: usize,
        received: usize,
    },
    /// Метка времени ушла вперёд: железо потеряло выборки
    TimestampGap {
        channel: usize,
        expected: u64,
        actual: u64,
    },
    /// Сбой повторился `consecutive` раз подряд
    Escalated {
        direction: Direction,
        channel: usize,
        kind: FaultKind,
        consecutive: u32,
    },
    WorkerStopped {
        direction: Direction,
        channel: usize,
    },
}

/// Счётчик подряд идущих сбоев одного вида.
#[derive(Debug, Clone)]
pub struct FaultTracker {
    threshold: Option<u32>,
    consecutive: u32,
}

/// Логирование + метрики + callback для одного воркера.
#[derive(Clone)]
pub struct Reporter {
    direction: Direction,
    channel: usize,
    metrics: Arc<StreamMetrics>,
    callback: Option<EventCallback>,
}

impl StreamEvent {
    /// Ошибка, соответствующая событию (для событий-сбоев).
    pub fn as_error(&self) -> Option<StreamError> {
        match self {
            StreamEvent::TransportError {
                direction,
                channel,
                error,
                ..
            } => Some(StreamError::Transport {
                direction: *direction,
                channel: *channel,
                source: error.clone(),
            }),
            StreamEvent::MalformedBlock { error, .. } => Some(StreamError::Codec(error.clone())),
            StreamEvent::Underrun {
                channel,
                requested,
                sent,
            } => Some(StreamError::Underrun {
                channel: *channel,
                requested: *requested,
                sent: *sent,
            }),
            StreamEvent::Overrun {
                channel,
                requested,
                received,
            } => Some(StreamError::Overrun {
                channel: *channel,
                requested: *requested,
                received: *received,
            }),
            _ => None,
        }
    }

    /// Канал, к которому относится событие.
    pub fn channel(&self) -> usize {
        match self {
            StreamEvent::TransportError { channel, .. }
            | StreamEvent::MalformedBlock { channel, .. }
            | StreamEvent::Underrun { channel, .. }
            | StreamEvent::Overrun { channel, .. }
            | StreamEvent::TimestampGap { channel, .. }
            | StreamEvent::Escalated { channel, .. }
            | StreamEvent::WorkerStopped { channel, .. } => *channel,
        }
    }
}

impl FaultTracker {
    pub fn new(threshold: Option<u32>) -> Self {
        Self {
            threshold,
            consecutive: 0,
        }
    }

    /// Учитывает сбой. Возвращает длину серии и `true`, если именно этот
    /// сбой достиг порога (эскалация срабатывает один раз на серию).
    pub fn record(&mut self) -> (u32, bool) {
        self.consecutive = self.consecutive.saturating_add(1);
        let escalate = self.threshold == Some(self.consecutive);
        (self.consecutive, escalate)
    }

    /// Успешный вызов обрывает серию.
    pub fn reset(&mut self) {
        self.consecutive = 0;
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}

impl Reporter {
    pub fn new(
        direction: Direction,
        channel: usize,
        metrics: Arc<StreamMetrics>,
        callback: Option<EventCallback>,
    ) -> Self {
        Self {
            direction,
            channel,
            metrics,
            callback,
        }
    }

    pub fn metrics(&self) -> &StreamMetrics {
        &self.metrics
    }

    fn emit(
        &self,
        event: StreamEvent,
    ) {
        if let Some(cb) = &self.callback {
            cb(&event);
        }
    }

    pub fn transport_error(
        &self,
        error: &TransportError,
        (consecutive, escalate): (u32, bool),
    ) {
        StreamMetrics::add(&self.metrics.transport_errors, 1);

        let event = StreamEvent::TransportError {
            direction: self.direction,
            channel: self.channel,
            error: error.clone(),
            consecutive,
        };

        if let Some(err) = event.as_error() {
            warn!("{err} (x{consecutive})");
        }

        self.emit(event);

        if escalate {
            self.escalate(FaultKind::TransportError, consecutive);
        }
    }

    pub fn malformed(
        &self,
        error: &IqError,
        (consecutive, escalate): (u32, bool),
    ) {
        StreamMetrics::add(&self.metrics.malformed_blocks, 1);
        warn!(
            "{} channel {}: dropping undecodable block: {error}",
            self.direction, self.channel
        );

        self.emit(StreamEvent::MalformedBlock {
            channel: self.channel,
            error: error.clone(),
        });

        if escalate {
            self.escalate(FaultKind::TransportError, consecutive);
        }
    }

    pub fn underrun(
        &self,
        requested: usize,
        sent: usize,
        (consecutive, escalate): (u32, bool),
    ) {
        StreamMetrics::add(&self.metrics.underruns, 1);
        StreamMetrics::add(
            &self.metrics.underrun_samples,
            requested.saturating_sub(sent) as u64,
        );

        let event = StreamEvent::Underrun {
            channel: self.channel,
            requested,
            sent,
        };

        if let Some(err) = event.as_error() {
            warn!("{err}");
        }

        self.emit(event);

        if escalate {
            self.escalate(FaultKind::Underrun, consecutive);
        }
    }

    pub fn overrun(
        &self,
        requested: usize,
        received: usize,
    ) {
        StreamMetrics::add(&self.metrics.overruns, 1);

        let event = StreamEvent::Overrun {
            channel: self.channel,
            requested,
            received,
        };

        // неполные чтения при коротких таймаутах штатны
        if let Some(err) = event.as_error() {
            debug!("{err}");
        }

        self.emit(event);
    }

    pub fn timestamp_gap(
        &self,
        expected: u64,
        actual: u64,
    ) {
        let lost = actual - expected;
        StreamMetrics::add(&self.metrics.gap_samples, lost);
        warn!(
            "RX channel {}: timestamp jumped from {expected} to {actual}, {lost} samples lost upstream",
            self.channel
        );

        self.emit(StreamEvent::TimestampGap {
            channel: self.channel,
            expected,
            actual,
        });
    }

    pub fn stopped(&self) {
        self.emit(StreamEvent::WorkerStopped {
            direction: self.direction,
            channel: self.channel,
        });
    }

    fn escalate(
        &self,
        kind: FaultKind,
        consecutive: u32,
    ) {
        StreamMetrics::add(&self.metrics.escalations, 1);
        error!(
            "{} channel {}: {kind:?} repeated {consecutive} times in a row",
            self.direction, self.channel
        );

        self.emit(StreamEvent::Escalated {
            direction: self.direction,
            channel: self.channel,
            kind,
            consecutive,
        });
    }
}

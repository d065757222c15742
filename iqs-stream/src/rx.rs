use std::ops::ControlFlow;

use crossbeam_channel::{SendTimeoutError, Sender};
use iqs_core::WireBlock;
use iqs_types::{ChannelMessage, WireFormat};
use log::{debug, error, warn};

use crate::{FaultTracker, SamplePool, StreamMetrics, Transport, WorkerContext, WorkerState};

/// Цикл приёма одного RX канала.
///
/// На каждой итерации: проверка сигнала остановки, одно чтение с
/// ограниченным ожиданием, декодирование, доставка сообщения диспетчеру.
/// Сообщения канала уходят в очередь в порядке чтения.
pub struct RxWorker {
    ctx: WorkerContext,
    transport: Box<dyn Transport>,
    block: WireBlock,
    out: Sender<ChannelMessage>,
    pool: SamplePool,
    errors: FaultTracker,
    /// (метка предыдущего блока, ожидаемая метка следующего)
    last_timestamp: Option<(u64, u64)>,
}

impl RxWorker {
    pub fn new(
        ctx: WorkerContext,
        transport: Box<dyn Transport>,
        format: WireFormat,
        out: Sender<ChannelMessage>,
        pool: SamplePool,
        errors: FaultTracker,
    ) -> Self {
        let block = WireBlock::new(format, ctx.fifo_size);

        Self {
            ctx,
            transport,
            block,
            out,
            pool,
            errors,
            last_timestamp: None,
        }
    }

    /// Крутит цикл до сигнала остановки и возвращает транспорт.
    pub fn run(mut self) -> Box<dyn Transport> {
        let channel = self.ctx.channel_index;
        self.ctx.state.set(WorkerState::Running);
        debug!("RX channel {channel}: worker running ({})", self.block.format());

        while !self.ctx.stop.is_signaled() {
            if self.step().is_break() {
                break;
            }
        }

        self.ctx.state.set(WorkerState::Stopping);
        self.ctx.reporter.stopped();
        debug!("RX channel {channel}: worker stopped");

        self.ctx.state.set(WorkerState::Terminated);
        self.transport
    }

    /// Одна итерация: чтение, декодирование, доставка.
    fn step(&mut self) -> ControlFlow<()> {
        let fifo_size = self.ctx.fifo_size;

        let meta = match self
            .transport
            .receive(self.block.as_bytes_mut(), fifo_size, self.ctx.timeout)
        {
            Ok(meta) => meta,
            Err(e) => {
                self.ctx.reporter.transport_error(&e, self.errors.record());
                return ControlFlow::Continue(());
            }
        };

        // таймаут без данных
        if meta.samples == 0 {
            return ControlFlow::Continue(());
        }

        let mut samples = self.pool.take();

        if let Err(e) = self.block.decode_into(meta.samples, &mut samples) {
            self.pool.give(samples);
            self.ctx.reporter.malformed(&e, self.errors.record());
            return ControlFlow::Continue(());
        }

        self.errors.reset();

        if meta.samples < fifo_size {
            self.ctx.reporter.overrun(fifo_size, meta.samples);
        }

        self.check_timestamp(meta.timestamp, meta.samples);

        let metrics = self.ctx.reporter.metrics();
        StreamMetrics::add(&metrics.rx_blocks, 1);
        StreamMetrics::add(&metrics.rx_samples, meta.samples as u64);

        self.deliver(ChannelMessage::new(
            self.ctx.channel_index,
            meta.timestamp,
            samples,
        ))
    }

    fn check_timestamp(
        &mut self,
        timestamp: u64,
        samples: usize,
    ) {
        if let Some((previous, expected)) = self.last_timestamp {
            // ожидаемая метка перешла через ноль вместе со счётчиком железа
            let wrapped = expected < previous;

            if timestamp > expected && !wrapped {
                self.ctx.reporter.timestamp_gap(expected, timestamp);
            } else if timestamp < previous || wrapped {
                warn!(
                    "RX channel {}: timestamp went backwards or wrapped ({previous} -> {timestamp})",
                    self.ctx.channel_index
                );
            }
        }

        self.last_timestamp = Some((timestamp, timestamp.wrapping_add(samples as u64)));
    }

    /// Отдаёт сообщение диспетчеру. Медленный потребитель задерживает
    /// воркер, но сообщение не выбрасывается.
    fn deliver(
        &mut self,
        mut msg: ChannelMessage,
    ) -> ControlFlow<()> {
        loop {
            match self.out.send_timeout(msg, self.ctx.timeout) {
                Ok(()) => return ControlFlow::Continue(()),
                Err(SendTimeoutError::Timeout(m)) => {
                    StreamMetrics::add(&self.ctx.reporter.metrics().delivery_stalls, 1);
                    debug!(
                        "RX channel {}: consumer is slow, still holding block ts={}",
                        self.ctx.channel_index, m.timestamp
                    );
                    msg = m;
                }
                Err(SendTimeoutError::Disconnected(m)) => {
                    error!(
                        "RX channel {}: dispatcher is gone, block ts={} ({} samples) undelivered",
                        self.ctx.channel_index,
                        m.timestamp,
                        m.len()
                    );
                    return ControlFlow::Break(());
                }
            }
        }
    }
}

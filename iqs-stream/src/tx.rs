use std::sync::Arc;

use iqs_core::WireBlock;
use iqs_types::{Complex32, WireFormat};
use log::debug;

use crate::{FaultTracker, StreamMetrics, Transport, WorkerContext, WorkerState};

/// Callback передачи: заполняет буфер на `fifo_size` выборок для канала.
///
/// Вызывается в потоке воркера и задаёт темп передачи, поэтому не должен
/// блокироваться.
pub type TxCallback = Arc<dyn Fn(&mut [Complex32], usize) + Send + Sync>;

/// Цикл передачи одного TX канала.
///
/// Темп задаёт транспорт: блок запрашивается у callback только когда
/// предыдущий отправлен. Недоотправленный хвост не повторяется.
pub struct TxWorker {
    ctx: WorkerContext,
    transport: Box<dyn Transport>,
    block: WireBlock,
    samples: Vec<Complex32>,
    producer: Option<TxCallback>,
    underruns: FaultTracker,
    errors: FaultTracker,
}

impl TxWorker {
    pub fn new(
        ctx: WorkerContext,
        transport: Box<dyn Transport>,
        format: WireFormat,
        producer: Option<TxCallback>,
        underruns: FaultTracker,
        errors: FaultTracker,
    ) -> Self {
        let block = WireBlock::new(format, ctx.fifo_size);
        let samples = vec![Complex32::new(0.0, 0.0); ctx.fifo_size];

        Self {
            ctx,
            transport,
            block,
            samples,
            producer,
            underruns,
            errors,
        }
    }

    /// Крутит цикл до сигнала остановки и возвращает транспорт.
    pub fn run(mut self) -> Box<dyn Transport> {
        let channel = self.ctx.channel_index;
        self.ctx.state.set(WorkerState::Running);
        debug!("TX channel {channel}: worker running ({})", self.block.format());

        while !self.ctx.stop.is_signaled() {
            self.step();
        }

        self.ctx.state.set(WorkerState::Stopping);
        self.ctx.reporter.stopped();
        debug!("TX channel {channel}: worker stopped");

        self.ctx.state.set(WorkerState::Terminated);
        self.transport
    }

    /// Одна итерация: callback, кодирование, отправка.
    fn step(&mut self) {
        let fifo_size = self.ctx.fifo_size;

        // без callback уходит тишина (или последний блок)
        if let Some(producer) = &self.producer {
            producer(&mut self.samples, self.ctx.channel_index);
        }

        let wire = self.block.encode_from(&self.samples);

        match self.transport.send(wire, fifo_size, self.ctx.timeout) {
            Ok(sent) => {
                self.errors.reset();

                let metrics = self.ctx.reporter.metrics();
                StreamMetrics::add(&metrics.tx_samples, sent.min(fifo_size) as u64);

                if sent >= fifo_size {
                    StreamMetrics::add(&metrics.tx_blocks, 1);
                    self.underruns.reset();
                } else {
                    self.ctx
                        .reporter
                        .underrun(fifo_size, sent, self.underruns.record());
                }
            }
            Err(e) => {
                self.ctx.reporter.transport_error(&e, self.errors.record());
            }
        }
    }
}

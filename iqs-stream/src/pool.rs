use crossbeam_channel::{Receiver, Sender};
use iqs_types::Complex32;

/// Пул буферов выборок для RX сообщений.
///
/// Буфер всегда принадлежит ровно одной стороне: воркер берёт его из пула,
/// заполняет и отдаёт в сообщении диспетчеру, диспетчер после callback
/// возвращает его в пул. Общего изменяемого буфера нет.
#[derive(Debug, Clone)]
pub struct SamplePool {
    free_tx: Sender<Vec<Complex32>>,
    free_rx: Receiver<Vec<Complex32>>,
    block_len: usize,
}

impl SamplePool {
    /// Пул до `slots` свободных буферов по `block_len` выборок.
    pub fn new(
        slots: usize,
        block_len: usize,
    ) -> Self {
        let (free_tx, free_rx) = crossbeam_channel::bounded(slots.max(1));

        Self {
            free_tx,
            free_rx,
            block_len,
        }
    }

    /// Берёт свободный буфер или выделяет новый.
    pub fn take(&self) -> Vec<Complex32> {
        self.free_rx
            .try_recv()
            .unwrap_or_else(|_| Vec::with_capacity(self.block_len))
    }

    /// Возвращает буфер. Если пул полон, буфер освобождается.
    pub fn give(
        &self,
        mut buf: Vec<Complex32>,
    ) {
        buf.clear();
        let _ = self.free_tx.try_send(buf);
    }

    /// Свободных буферов сейчас.
    pub fn available(&self) -> usize {
        self.free_rx.len()
    }
}

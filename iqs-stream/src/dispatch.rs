use std::sync::Arc;

use crossbeam_channel::Receiver;
use iqs_types::{ChannelMessage, Complex32};
use log::debug;

use crate::{SamplePool, StreamMetrics};

/// Callback приёма: `(samples, channel_index, timestamp)`.
pub type RxCallback = Arc<dyn Fn(&[Complex32], usize, u64) + Send + Sync>;

/// Единая точка доставки RX сообщений всех каналов.
///
/// Читает очередь, пока живы отправители (RX воркеры), и вызывает callback
/// в порядке поступления. Порядок внутри канала сохраняется, между каналами
/// сообщения перемешаны произвольно.
pub struct Dispatcher {
    rx: Receiver<ChannelMessage>,
    callback: RxCallback,
    pool: SamplePool,
    metrics: Arc<StreamMetrics>,
}

impl Dispatcher {
    pub fn new(
        rx: Receiver<ChannelMessage>,
        callback: RxCallback,
        pool: SamplePool,
        metrics: Arc<StreamMetrics>,
    ) -> Self {
        Self {
            rx,
            callback,
            pool,
            metrics,
        }
    }

    /// Работает, пока все отправители не закрыты и очередь не пуста.
    /// Возвращает число доставленных блоков.
    pub fn run(self) -> u64 {
        let mut delivered = 0u64;

        for msg in self.rx.iter() {
            (self.callback)(&msg.samples, msg.channel_index, msg.timestamp);
            delivered += 1;
            StreamMetrics::add(&self.metrics.dispatched_blocks, 1);
            self.pool.give(msg.samples);
        }

        debug!("Dispatcher drained, {delivered} blocks delivered");
        delivered
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn test_dispatcher_drains_after_senders_close() {
        let (tx, rx) = crossbeam_channel::bounded(8);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: RxCallback = Arc::new(move |s: &[Complex32], ch: usize, ts: u64| {
            sink.lock().unwrap().push((ch, ts, s.len()));
        });

        let pool = SamplePool::new(4, 2);
        let dispatcher = Dispatcher::new(rx, callback, pool.clone(), StreamMetrics::new());

        for ts in [10u64, 20, 30] {
            tx.send(ChannelMessage::new(1, ts, vec![Complex32::new(0.0, 0.0); 2]))
                .unwrap();
        }
        drop(tx);

        assert_eq!(dispatcher.run(), 3);
        assert_eq!(*seen.lock().unwrap(), vec![(1, 10, 2), (1, 20, 2), (1, 30, 2)]);
        assert_eq!(pool.available(), 3, "buffers returned to the pool");
    }
}

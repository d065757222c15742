//! Жизненный цикл стриминга устройства.
//!
//! `start` запускает по одному потоку на каждый включённый канал (RX и TX
//! независимо) и поток-диспетчер для RX. `stop` поднимает сигналы всех
//! воркеров, дожидается их завершения, затем диспетчера, и только после
//! этого останавливает потоки на стороне железа.

use std::{sync::Arc, thread::JoinHandle, time::Instant};

use iqs_types::{Complex32, Direction, WireFormat};
use log::{debug, error, info, warn};

use crate::{
    ChannelConfig, ChannelHandle, DeviceInfo, Dispatcher, EventCallback, FaultTracker, Reporter,
    RxCallback, RxWorker, SamplePool, SdrDriver, SharedState, StopSignal, StreamConfig,
    StreamError, StreamEvent, StreamMetrics, StreamResult, Transport, TxCallback, TxWorker,
    WorkerContext, WorkerHandle, WorkerState,
};

/// SDR устройство с независимыми RX/TX каналами.
pub struct Device {
    driver: Box<dyn SdrDriver>,
    info: DeviceInfo,
    config: StreamConfig,
    rx: Vec<Option<ChannelHandle>>,
    tx: Vec<Option<ChannelHandle>>,
    rx_callback: Option<RxCallback>,
    tx_callback: Option<TxCallback>,
    event_callback: Option<EventCallback>,
    metrics: Arc<StreamMetrics>,
    session: Option<Session>,
}

/// Запущенная сессия стриминга.
struct Session {
    workers: Vec<WorkerHandle>,
    dispatcher: Option<JoinHandle<u64>>,
    started: Instant,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Device {
    /// Открывает устройство поверх драйвера.
    pub fn open(
        driver: Box<dyn SdrDriver>,
        config: StreamConfig,
    ) -> StreamResult<Self> {
        config.validate()?;

        let info = driver.info();
        let rx = (0..driver.channel_count(Direction::Rx)).map(|_| None).collect();
        let tx = (0..driver.channel_count(Direction::Tx)).map(|_| None).collect();

        info!("Opened {info}");

        Ok(Self {
            driver,
            info,
            config,
            rx,
            tx,
            rx_callback: None,
            tx_callback: None,
            event_callback: None,
            metrics: StreamMetrics::new(),
            session: None,
        })
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Метрики всех сессий устройства.
    pub fn metrics(&self) -> Arc<StreamMetrics> {
        self.metrics.clone()
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    /// Включает канал (или перенастраивает уже включённый).
    ///
    /// Конфигурация проверяется целиком до обращения к драйверу. Поток
    /// канала открывается при первом включении.
    pub fn enable_channel(
        &mut self,
        direction: Direction,
        index: usize,
        config: &ChannelConfig,
    ) -> StreamResult<()> {
        self.ensure_idle("enable a channel")?;
        self.check_index(direction, index)?;
        config.validate(direction)?;

        self.driver.apply(direction, index, config)?;

        let format = self.config.wire_format;
        let fifo_size = self.config.fifo_size;

        let slot = &mut self.channels_mut(direction)[index];
        if let Some(handle) = slot {
            if handle.has_transport() {
                handle.config = config.clone();
                info!("{direction} channel {index} reconfigured");
                return Ok(());
            }
        }

        let transport = self
            .driver
            .open_stream(direction, index, format, fifo_size)?;
        self.channels_mut(direction)[index] = Some(ChannelHandle::new(
            index,
            direction,
            format,
            config.clone(),
            transport,
        ));

        info!(
            "{direction} channel {index} enabled: antenna={} gain={:.2} lpf={} center={:.3} MHz ({format}, fifo {fifo_size})",
            config.antenna,
            config.gain_normalized,
            if config.lpf_enabled {
                format!("{:.0} Hz", config.lpf_hz)
            } else {
                "off".to_string()
            },
            config.center_freq_hz / 1e6,
        );

        Ok(())
    }

    /// Выключает канал и закрывает его поток.
    pub fn disable_channel(
        &mut self,
        direction: Direction,
        index: usize,
    ) -> StreamResult<()> {
        self.ensure_idle("disable a channel")?;
        self.check_index(direction, index)?;

        if self.channels_mut(direction)[index].take().is_some() {
            info!("{direction} channel {index} disabled");
        }

        Ok(())
    }

    pub fn is_enabled(
        &self,
        direction: Direction,
        index: usize,
    ) -> bool {
        self.channels(direction)
            .get(index)
            .is_some_and(|slot| slot.is_some())
    }

    /// Индексы включённых каналов.
    pub fn enabled_channels(
        &self,
        direction: Direction,
    ) -> Vec<usize> {
        self.channels(direction)
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|_| i))
            .collect()
    }

    pub fn set_rx_callback<F>(
        &mut self,
        callback: F,
    ) -> StreamResult<()>
    where
        F: Fn(&[Complex32], usize, u64) + Send + Sync + 'static,
    {
        self.ensure_idle("change the RX callback")?;
        self.rx_callback = Some(Arc::new(callback));
        Ok(())
    }

    pub fn set_tx_callback<F>(
        &mut self,
        callback: F,
    ) -> StreamResult<()>
    where
        F: Fn(&mut [Complex32], usize) + Send + Sync + 'static,
    {
        self.ensure_idle("change the TX callback")?;
        self.tx_callback = Some(Arc::new(callback));
        Ok(())
    }

    pub fn set_event_callback<F>(
        &mut self,
        callback: F,
    ) -> StreamResult<()>
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        self.ensure_idle("change the event callback")?;
        self.event_callback = Some(Arc::new(callback));
        Ok(())
    }

    /// Состояния воркеров текущей сессии.
    pub fn worker_states(&self) -> Vec<(Direction, usize, WorkerState)> {
        self.session
            .as_ref()
            .map(|s| {
                s.workers
                    .iter()
                    .map(|w| (w.direction, w.channel_index, w.state()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Запускает стриминг всех включённых каналов.
    ///
    /// Возвращается, когда все воркеры запущены. Ошибка активации потока
    /// на любом канале отменяет запуск целиком.
    pub fn start(&mut self) -> StreamResult<()> {
        if self.session.is_some() {
            return Err(StreamError::invalid_state("streaming already started"));
        }

        let rx_enabled = self.enabled_channels(Direction::Rx);
        let tx_enabled = self.enabled_channels(Direction::Tx);

        if rx_enabled.is_empty() && tx_enabled.is_empty() {
            return Err(StreamError::invalid_state("no channels enabled"));
        }

        let rx_callback = if rx_enabled.is_empty() {
            None
        } else {
            Some(self.rx_callback.clone().ok_or_else(|| {
                StreamError::invalid_state("RX channels enabled but no RX callback set")
            })?)
        };

        self.activate_all()?;

        let mut session = Session {
            workers: Vec::with_capacity(rx_enabled.len() + tx_enabled.len()),
            dispatcher: None,
            started: Instant::now(),
        };

        if let Err(e) = self.spawn_all(&mut session, rx_callback, &rx_enabled, &tx_enabled) {
            error!("Failed to start streaming: {e}");
            if let Err(join_err) = self.join_session(session) {
                warn!("Cleanup after failed start: {join_err}");
            }
            self.deactivate_all();
            return Err(e);
        }

        info!(
            "Streaming started: RX {:?}, TX {:?}, {} @ fifo {}",
            rx_enabled, tx_enabled, self.config.wire_format, self.config.fifo_size
        );

        self.session = Some(session);
        Ok(())
    }

    /// Останавливает стриминг. Возвращается, когда все воркеры завершены;
    /// после возврата callback не вызывается и транспорт не трогается.
    pub fn stop(&mut self) -> StreamResult<()> {
        let session = self
            .session
            .take()
            .ok_or_else(|| StreamError::invalid_state("streaming is not running"))?;

        let result = self.join_session(session);
        self.deactivate_all();
        result
    }

    fn activate_all(&mut self) -> StreamResult<()> {
        let mut activated: Vec<(Direction, usize)> = Vec::new();

        for direction in [Direction::Rx, Direction::Tx] {
            for index in self.enabled_channels(direction) {
                let result = self.channels_mut(direction)[index]
                    .as_mut()
                    .and_then(|h| h.transport_mut())
                    .map(|t| t.activate());

                match result {
                    Some(Ok(())) => activated.push((direction, index)),
                    Some(Err(source)) => {
                        self.deactivate(&activated);
                        return Err(StreamError::Transport {
                            direction,
                            channel: index,
                            source,
                        });
                    }
                    None => {
                        self.deactivate(&activated);
                        return Err(StreamError::invalid_state(format!(
                            "{direction} channel {index} has no stream, re-enable the channel"
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    /// Останавливает потоки всех каналов, которые сейчас у устройства.
    fn deactivate_all(&mut self) {
        let channels: Vec<(Direction, usize)> = [Direction::Rx, Direction::Tx]
            .into_iter()
            .flat_map(|d| self.enabled_channels(d).into_iter().map(move |i| (d, i)))
            .collect();

        self.deactivate(&channels);
    }

    fn deactivate(
        &mut self,
        channels: &[(Direction, usize)],
    ) {
        for &(direction, index) in channels {
            if let Some(t) = self.channels_mut(direction)[index]
                .as_mut()
                .and_then(|h| h.transport_mut())
            {
                if let Err(e) = t.deactivate() {
                    warn!("{direction} channel {index}: failed to deactivate stream: {e}");
                }
            }
        }
    }

    fn spawn_all(
        &mut self,
        session: &mut Session,
        rx_callback: Option<RxCallback>,
        rx_enabled: &[usize],
        tx_enabled: &[usize],
    ) -> StreamResult<()> {
        let timeout = self.config.transfer_timeout();
        let fifo_size = self.config.fifo_size;
        let escalation = self.config.escalation;

        if let Some(callback) = rx_callback {
            let (msg_tx, msg_rx) = crossbeam_channel::bounded(self.config.rx_queue_capacity);
            let pool = SamplePool::new(self.config.pool_slots, fifo_size);

            let dispatcher = Dispatcher::new(msg_rx, callback, pool.clone(), self.metrics.clone());
            session.dispatcher = Some(
                std::thread::Builder::new()
                    .name("iqs-dispatch".to_string())
                    .spawn(move || dispatcher.run())?,
            );

            for &index in rx_enabled {
                let ctx = self.context(Direction::Rx, index, fifo_size, timeout);
                let (transport, format) = self.lend(Direction::Rx, index)?;

                let worker = RxWorker::new(
                    ctx.clone(),
                    transport,
                    format,
                    msg_tx.clone(),
                    pool.clone(),
                    FaultTracker::new(escalation.max_consecutive_errors),
                );
                session
                    .workers
                    .push(WorkerHandle::spawn(Direction::Rx, &ctx, move || worker.run())?);
            }
            // у диспетчера остаются только отправители воркеров
        }

        for &index in tx_enabled {
            let ctx = self.context(Direction::Tx, index, fifo_size, timeout);
            let (transport, format) = self.lend(Direction::Tx, index)?;

            let worker = TxWorker::new(
                ctx.clone(),
                transport,
                format,
                self.tx_callback.clone(),
                FaultTracker::new(escalation.max_consecutive_underruns),
                FaultTracker::new(escalation.max_consecutive_errors),
            );
            session
                .workers
                .push(WorkerHandle::spawn(Direction::Tx, &ctx, move || worker.run())?);
        }

        Ok(())
    }

    fn context(
        &self,
        direction: Direction,
        index: usize,
        fifo_size: usize,
        timeout: std::time::Duration,
    ) -> WorkerContext {
        WorkerContext {
            channel_index: index,
            fifo_size,
            timeout,
            stop: StopSignal::new(),
            state: SharedState::new(),
            reporter: Reporter::new(
                direction,
                index,
                self.metrics.clone(),
                self.event_callback.clone(),
            ),
        }
    }

    fn lend(
        &mut self,
        direction: Direction,
        index: usize,
    ) -> StreamResult<(Box<dyn Transport>, WireFormat)> {
        let handle = self.channels_mut(direction)[index]
            .as_mut()
            .ok_or_else(|| StreamError::invalid_state(format!("{direction} channel {index} is not enabled")))?;

        Ok((handle.lend()?, handle.wire_format))
    }

    /// Сигнал всем, затем ожидание всех воркеров и диспетчера. Потоки
    /// вернувшихся воркеров снова принадлежат каналам.
    fn join_session(
        &mut self,
        session: Session,
    ) -> StreamResult<()> {
        let Session {
            workers,
            dispatcher,
            started,
        } = session;

        for w in &workers {
            w.signal();
        }

        let mut panics = Vec::new();

        for w in workers {
            let (direction, index) = (w.direction, w.channel_index);

            match w.join() {
                Ok(transport) => {
                    if let Some(handle) = self.channels_mut(direction)[index].as_mut() {
                        handle.restore(transport);
                    }
                }
                Err(msg) => {
                    error!("{direction} channel {index}: worker panicked: {msg}");
                    panics.push(format!("{direction} channel {index}: {msg}"));
                }
            }
        }

        if let Some(d) = dispatcher {
            match d.join() {
                Ok(delivered) => debug!("Dispatcher finished after {delivered} blocks"),
                Err(_) => {
                    error!("RX dispatcher panicked (RX callback failure)");
                    panics.push("RX dispatcher".to_string());
                }
            }
        }

        let summary = self.metrics.summary(&started);
        info!(
            "Streaming stopped after {:.1}s: RX {} blocks, TX {} blocks, {} errors, {} underruns",
            summary.duration_secs,
            summary.rx_blocks,
            summary.tx_blocks,
            summary.transport_errors,
            summary.underruns
        );

        if panics.is_empty() {
            Ok(())
        } else {
            Err(StreamError::WorkerPanicked(panics.join("; ")))
        }
    }

    fn ensure_idle(
        &self,
        what: &str,
    ) -> StreamResult<()> {
        if self.session.is_some() {
            return Err(StreamError::invalid_state(format!(
                "cannot {what} while streaming"
            )));
        }
        Ok(())
    }

    fn check_index(
        &self,
        direction: Direction,
        index: usize,
    ) -> StreamResult<()> {
        let count = self.channels(direction).len();

        if index >= count {
            return Err(StreamError::ChannelOutOfRange {
                direction,
                index,
                count,
            });
        }
        Ok(())
    }

    fn channels(
        &self,
        direction: Direction,
    ) -> &[Option<ChannelHandle>] {
        match direction {
            Direction::Rx => &self.rx,
            Direction::Tx => &self.tx,
        }
    }

    fn channels_mut(
        &mut self,
        direction: Direction,
    ) -> &mut Vec<Option<ChannelHandle>> {
        match direction {
            Direction::Rx => &mut self.rx,
            Direction::Tx => &mut self.tx,
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            warn!("Device dropped while streaming, stopping workers");
            if let Err(e) = self.join_session(session) {
                error!("Stop on drop failed: {e}");
            }
            self.deactivate_all();
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicU64, Ordering},
            Mutex,
        },
        time::Duration,
    };

    use super::*;
    use crate::{Antenna, ChannelConfig, RecvMeta, SimulatedDriver, TransportError, TransportResult};

    fn sim_config() -> StreamConfig {
        StreamConfig {
            fifo_size: 256,
            sample_rate_hz: 1_000_000.0,
            ..StreamConfig::default()
        }
    }

    fn sim_device() -> Device {
        Device::open(Box::new(SimulatedDriver::new(1_000_000.0)), sim_config()).unwrap()
    }

    #[test]
    fn test_start_without_channels_is_invalid() {
        let mut dev = sim_device();

        assert!(matches!(dev.start(), Err(StreamError::InvalidState(_))));
        assert!(!dev.is_running());
    }

    #[test]
    fn test_stop_when_idle_is_invalid() {
        let mut dev = sim_device();
        assert!(matches!(dev.stop(), Err(StreamError::InvalidState(_))));
    }

    #[test]
    fn test_rx_without_callback_is_invalid() {
        let mut dev = sim_device();
        dev.enable_channel(Direction::Rx, 0, &ChannelConfig::new(Direction::Rx, 100e6))
            .unwrap();

        assert!(matches!(dev.start(), Err(StreamError::InvalidState(_))));
    }

    #[test]
    fn test_enable_channel_checks_range_and_config() {
        let mut dev = sim_device();

        let err = dev
            .enable_channel(Direction::Rx, 2, &ChannelConfig::new(Direction::Rx, 100e6))
            .unwrap_err();
        assert!(matches!(
            err,
            StreamError::ChannelOutOfRange {
                index: 2,
                count: 2,
                ..
            }
        ));

        let bad = ChannelConfig {
            antenna: Antenna::LnaH,
            ..ChannelConfig::new(Direction::Tx, 100e6)
        };
        assert!(matches!(
            dev.enable_channel(Direction::Tx, 0, &bad),
            Err(StreamError::Config(_))
        ));
        assert!(!dev.is_enabled(Direction::Tx, 0));
    }

    #[test]
    fn test_enable_and_disable_channel() {
        let mut dev = sim_device();
        let config = ChannelConfig::new(Direction::Rx, 100e6);

        dev.enable_channel(Direction::Rx, 1, &config).unwrap();
        // повторное включение только перенастраивает
        dev.enable_channel(Direction::Rx, 1, &config).unwrap();

        assert_eq!(dev.enabled_channels(Direction::Rx), vec![1]);
        assert!(dev.enabled_channels(Direction::Tx).is_empty());

        dev.disable_channel(Direction::Rx, 1).unwrap();
        assert!(!dev.is_enabled(Direction::Rx, 1));
    }

    #[test]
    fn test_simulated_session_runs_and_stops_cleanly() {
        let mut dev = sim_device();
        dev.enable_channel(Direction::Rx, 0, &ChannelConfig::new(Direction::Rx, 100e6))
            .unwrap();
        dev.enable_channel(Direction::Tx, 1, &ChannelConfig::new(Direction::Tx, 100e6))
            .unwrap();

        let rx_calls = Arc::new(AtomicU64::new(0));
        let tx_calls = Arc::new(AtomicU64::new(0));

        let rx = rx_calls.clone();
        dev.set_rx_callback(move |samples, channel, _ts| {
            assert_eq!(channel, 0);
            assert_eq!(samples.len(), 256);
            rx.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        let tx = tx_calls.clone();
        dev.set_tx_callback(move |samples, channel| {
            assert_eq!(channel, 1);
            samples.fill(Complex32::new(0.25, -0.25));
            tx.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        for _ in 0..2 {
            dev.start().unwrap();
            assert!(dev.is_running());
            assert!(matches!(dev.start(), Err(StreamError::InvalidState(_))));
            assert!(matches!(
                dev.disable_channel(Direction::Rx, 0),
                Err(StreamError::InvalidState(_))
            ));
            assert_eq!(dev.worker_states().len(), 2);

            std::thread::sleep(Duration::from_millis(50));
            dev.stop().unwrap();
            assert!(dev.worker_states().is_empty());

            let rx_after = rx_calls.load(Ordering::SeqCst);
            let tx_after = tx_calls.load(Ordering::SeqCst);
            assert!(rx_after > 0);
            assert!(tx_after > 0);

            std::thread::sleep(Duration::from_millis(20));
            assert_eq!(rx_calls.load(Ordering::SeqCst), rx_after);
            assert_eq!(tx_calls.load(Ordering::SeqCst), tx_after);
        }

        let summary = dev.metrics().summary(&Instant::now());
        assert_eq!(summary.dispatched_blocks, rx_calls.load(Ordering::SeqCst));
        assert_eq!(summary.transport_errors, 0);
    }

    /// Драйвер, у которого активация TX потоков падает.
    struct FlakyDriver {
        active: Arc<Mutex<Vec<(Direction, usize)>>>,
    }

    struct FlakyTransport {
        direction: Direction,
        index: usize,
        active: Arc<Mutex<Vec<(Direction, usize)>>>,
    }

    impl Transport for FlakyTransport {
        fn activate(&mut self) -> TransportResult<()> {
            if self.direction == Direction::Tx {
                return Err(TransportError::new(-5, "fifo setup failed"));
            }
            self.active.lock().unwrap().push((self.direction, self.index));
            Ok(())
        }

        fn deactivate(&mut self) -> TransportResult<()> {
            let key = (self.direction, self.index);
            self.active.lock().unwrap().retain(|c| *c != key);
            Ok(())
        }

        fn receive(
            &mut self,
            _buf: &mut [u8],
            _max_samples: usize,
            timeout: Duration,
        ) -> TransportResult<RecvMeta> {
            std::thread::sleep(timeout);
            Ok(RecvMeta::default())
        }

        fn send(
            &mut self,
            _buf: &[u8],
            n_samples: usize,
            _timeout: Duration,
        ) -> TransportResult<usize> {
            Ok(n_samples)
        }
    }

    impl SdrDriver for FlakyDriver {
        fn info(&self) -> DeviceInfo {
            DeviceInfo {
                name: "Flaky".to_string(),
                serial: None,
                firmware_version: None,
                hardware_version: None,
                rx_channels: 1,
                tx_channels: 1,
            }
        }

        fn channel_count(
            &self,
            _direction: Direction,
        ) -> usize {
            1
        }

        fn apply(
            &mut self,
            _direction: Direction,
            _index: usize,
            _config: &ChannelConfig,
        ) -> StreamResult<()> {
            Ok(())
        }

        fn open_stream(
            &mut self,
            direction: Direction,
            index: usize,
            _format: WireFormat,
            _fifo_size: usize,
        ) -> StreamResult<Box<dyn Transport>> {
            Ok(Box::new(FlakyTransport {
                direction,
                index,
                active: self.active.clone(),
            }))
        }
    }

    #[test]
    fn test_activation_failure_rolls_back() {
        let active = Arc::new(Mutex::new(Vec::new()));
        let driver = FlakyDriver {
            active: active.clone(),
        };
        let mut dev = Device::open(Box::new(driver), sim_config()).unwrap();

        dev.enable_channel(Direction::Rx, 0, &ChannelConfig::new(Direction::Rx, 100e6))
            .unwrap();
        dev.enable_channel(Direction::Tx, 0, &ChannelConfig::new(Direction::Tx, 100e6))
            .unwrap();
        dev.set_rx_callback(|_, _, _| {}).unwrap();

        let err = dev.start().unwrap_err();
        assert!(matches!(
            err,
            StreamError::Transport {
                direction: Direction::Tx,
                channel: 0,
                ..
            }
        ));
        assert!(!dev.is_running());
        assert!(active.lock().unwrap().is_empty());
    }
}

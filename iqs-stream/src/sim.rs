// Имитация двухканального SDR: RX каналы отдают комплексную синусоиду в
// формате потока, TX каналы принимают всё. Обе стороны идут в темпе
// частоты дискретизации, так что воркеры видят почти настоящее железо.

use std::{
    collections::HashMap,
    f32::consts::PI,
    thread,
    time::{Duration, Instant},
};

use iqs_core::encode_to_slice;
use iqs_types::{Complex32, Direction, WireFormat};

use crate::{
    ChannelConfig, DeviceInfo, DeviceKind, RecvMeta, SdrDriver, StreamConfig, StreamError,
    StreamResult, Transport, TransportError, TransportResult,
};

/// Кол-во каналов в каждом направлении (A и B).
pub const SIM_CHANNELS: usize = 2;

/// Амплитуда тона RX.
pub const SIM_TONE_AMPLITUDE: f32 = 0.7;

/// Частота тона канала A, канал B в два раза выше.
pub const SIM_TONE_HZ: f32 = 10_000.0;

/// Коды ошибок имитации
const ERR_NOT_ACTIVE: i32 = -1;
const ERR_DIRECTION: i32 = -2;

/// Драйвер имитации.
pub struct SimulatedDriver {
    sample_rate_hz: f64,
    applied: HashMap<(Direction, usize), ChannelConfig>,
}

/// Поток одного канала имитации.
pub struct SimulatedTransport {
    direction: Direction,
    channel: usize,
    format: WireFormat,
    sample_rate_hz: f64,
    tone_hz: f32,
    active: bool,
    started: Instant,
    /// Выборок, прошедших через поток с момента активации
    position: u64,
    scratch: Vec<Complex32>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl SimulatedDriver {
    pub fn new(sample_rate_hz: f64) -> Self {
        Self {
            sample_rate_hz,
            applied: HashMap::new(),
        }
    }

    /// Последняя применённая к каналу конфигурация.
    pub fn applied(
        &self,
        direction: Direction,
        index: usize,
    ) -> Option<&ChannelConfig> {
        self.applied.get(&(direction, index))
    }
}

impl SdrDriver for SimulatedDriver {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            name: "Simulated SDR".to_string(),
            serial: Some("SIM-0001".to_string()),
            firmware_version: None,
            hardware_version: None,
            rx_channels: SIM_CHANNELS,
            tx_channels: SIM_CHANNELS,
        }
    }

    fn channel_count(
        &self,
        _direction: Direction,
    ) -> usize {
        SIM_CHANNELS
    }

    fn apply(
        &mut self,
        direction: Direction,
        index: usize,
        config: &ChannelConfig,
    ) -> StreamResult<()> {
        self.applied.insert((direction, index), config.clone());
        Ok(())
    }

    fn open_stream(
        &mut self,
        direction: Direction,
        index: usize,
        format: WireFormat,
        fifo_size: usize,
    ) -> StreamResult<Box<dyn Transport>> {
        Ok(Box::new(SimulatedTransport {
            direction,
            channel: index,
            format,
            sample_rate_hz: self.sample_rate_hz,
            tone_hz: SIM_TONE_HZ * (index + 1) as f32,
            active: false,
            started: Instant::now(),
            position: 0,
            scratch: Vec::with_capacity(fifo_size),
        }))
    }
}

impl SimulatedTransport {
    fn check(
        &self,
        direction: Direction,
    ) -> TransportResult<()> {
        if !self.active {
            return Err(TransportError::new(
                ERR_NOT_ACTIVE,
                format!("{} channel {}: stream is not active", self.direction, self.channel),
            ));
        }

        if self.direction != direction {
            return Err(TransportError::new(
                ERR_DIRECTION,
                format!(
                    "{} channel {}: {direction} transfer on a {} stream",
                    self.direction, self.channel, self.direction
                ),
            ));
        }

        Ok(())
    }

    /// Ждёт момента, когда `n` следующих выборок "прошли" через железо.
    ///
    /// Возвращает `false`, если ждать пришлось бы дольше `timeout`.
    fn pace(
        &self,
        n: usize,
        timeout: Duration,
    ) -> bool {
        let due = Duration::from_secs_f64((self.position + n as u64) as f64 / self.sample_rate_hz);
        let elapsed = self.started.elapsed();

        if due <= elapsed {
            return true;
        }

        let wait = due - elapsed;
        if wait > timeout {
            thread::sleep(timeout);
            return false;
        }

        thread::sleep(wait);
        true
    }
}

impl Transport for SimulatedTransport {
    fn activate(&mut self) -> TransportResult<()> {
        self.active = true;
        self.started = Instant::now();
        self.position = 0;
        Ok(())
    }

    fn deactivate(&mut self) -> TransportResult<()> {
        self.active = false;
        Ok(())
    }

    fn receive(
        &mut self,
        buf: &mut [u8],
        max_samples: usize,
        timeout: Duration,
    ) -> TransportResult<RecvMeta> {
        self.check(Direction::Rx)?;

        let n = max_samples.min(buf.len() / self.format.sample_size());
        if !self.pace(n, timeout) {
            return Ok(RecvMeta::default());
        }

        let step = 2.0 * PI * self.tone_hz / self.sample_rate_hz as f32;
        self.scratch.clear();
        self.scratch.extend((0..n as u64).map(|i| {
            // фаза по модулю периода, чтобы f32 не терял точность
            let k = (self.position + i) as f64 % (self.sample_rate_hz / self.tone_hz as f64);
            Complex32::from_polar(SIM_TONE_AMPLITUDE, step * k as f32)
        }));

        encode_to_slice(&self.scratch, self.format, buf);

        let timestamp = self.position;
        self.position += n as u64;

        Ok(RecvMeta {
            samples: n,
            timestamp,
        })
    }

    fn send(
        &mut self,
        buf: &[u8],
        n_samples: usize,
        timeout: Duration,
    ) -> TransportResult<usize> {
        self.check(Direction::Tx)?;

        let n = n_samples.min(buf.len() / self.format.sample_size());
        if !self.pace(n, timeout) {
            return Ok(0);
        }

        self.position += n as u64;
        Ok(n)
    }
}

/// Создаёт драйвер по конфигурации.
pub fn create_driver(config: &StreamConfig) -> StreamResult<Box<dyn SdrDriver>> {
    match config.device {
        DeviceKind::Sim => Ok(Box::new(SimulatedDriver::new(config.sample_rate_hz))),
        DeviceKind::Lime => Err(StreamError::DeviceNotFound(
            "LimeSDR support needs LimeSuite bindings, which this build does not include"
                .to_string(),
        )),
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

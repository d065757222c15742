use std::{path::Path, time::Duration};

use iqs_types::{Direction, WireFormat};
use serde::{Deserialize, Serialize};

use crate::{StreamError, StreamResult};

/// Размер FIFO блока по умолчанию (IQ пар за один вызов транспорта).
pub const DEFAULT_FIFO_SIZE: usize = 16_384;

/// Таймаут одного вызова транспорта по умолчанию (мс).
pub const DEFAULT_TRANSFER_TIMEOUT_MS: u64 = 100;

/// Тип SDR устройства (выбор при старте).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// Встроенный симулятор (не требует железа).
    #[serde(alias = "simulated")]
    Sim,
    /// LimeSDR (привязки к LimeSuite в эту сборку не входят).
    Lime,
}

/// Антенна / тракт канала.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Antenna {
    None,
    /// RX, высокие частоты
    LnaH,
    /// RX, низкие частоты
    LnaL,
    /// RX, широкополосный
    LnaW,
    /// TX, тракт 1
    Band1,
    /// TX, тракт 2
    Band2,
    /// Выбор драйвером по частоте
    Auto,
}

/// Настройки одного канала, применяемые одной проверяющей функцией.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub antenna: Antenna,
    /// Нормированное усиление 0.0..=1.0
    pub gain_normalized: f64,
    /// Полоса ФНЧ (Гц)
    pub lpf_hz: f64,
    pub lpf_enabled: bool,
    /// Несущая частота (Гц)
    pub center_freq_hz: f64,
}

/// Политика эскалации повторяющихся сбоев.
///
/// `None` отключает эскалацию: каждый сбой только логируется и считается.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationPolicy {
    /// Подряд идущих недоотправок TX до эскалации
    pub max_consecutive_underruns: Option<u32>,
    /// Подряд идущих ошибок транспорта до эскалации
    pub max_consecutive_errors: Option<u32>,
}

/// Конфигурация стриминга устройства.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Тип SDR устройства
    pub device: DeviceKind,
    /// Формат выборок на границе с транспортом
    pub wire_format: WireFormat,
    /// IQ пар за один вызов транспорта
    pub fifo_size: usize,
    /// Ограничение ожидания одного вызова транспорта (мс)
    pub transfer_timeout_ms: u64,
    /// Ёмкость очереди RX сообщений к диспетчеру (блоков)
    pub rx_queue_capacity: usize,
    /// Сколько буферов выборок держать для повторного использования
    pub pool_slots: usize,
    /// Частота дискретизации (Гц)
    pub sample_rate_hz: f64,
    pub escalation: EscalationPolicy,
    /// Интервал вывода статистики (секунды)
    pub stats_interval_secs: u64,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Antenna {
    /// Допустима ли антенна для направления канала.
    pub fn supports(
        &self,
        direction: Direction,
    ) -> bool {
        match self {
            Antenna::None | Antenna::Auto => true,
            Antenna::LnaH | Antenna::LnaL | Antenna::LnaW => direction == Direction::Rx,
            Antenna::Band1 | Antenna::Band2 => direction == Direction::Tx,
        }
    }

    /// Антенна по умолчанию для направления.
    pub fn default_for(direction: Direction) -> Self {
        match direction {
            Direction::Rx => Antenna::LnaW,
            Direction::Tx => Antenna::Band1,
        }
    }
}

impl ChannelConfig {
    pub fn new(
        direction: Direction,
        center_freq_hz: f64,
    ) -> Self {
        Self {
            antenna: Antenna::default_for(direction),
            gain_normalized: 0.5,
            lpf_hz: 0.0,
            lpf_enabled: false,
            center_freq_hz,
        }
    }

    /// Проверяет конфигурацию целиком для заданного направления.
    pub fn validate(
        &self,
        direction: Direction,
    ) -> StreamResult<()> {
        if !self.antenna.supports(direction) {
            return Err(StreamError::config(format!(
                "antenna {} is not available on {direction} channels",
                self.antenna
            )));
        }

        if !(0.0..=1.0).contains(&self.gain_normalized) {
            return Err(StreamError::config(format!(
                "normalized gain must be within 0..=1, got {}",
                self.gain_normalized
            )));
        }

        if self.lpf_enabled && !(self.lpf_hz.is_finite() && self.lpf_hz > 0.0) {
            return Err(StreamError::config(format!(
                "LPF enabled with invalid bandwidth {} Hz",
                self.lpf_hz
            )));
        }

        if !(self.center_freq_hz.is_finite() && self.center_freq_hz > 0.0) {
            return Err(StreamError::config(format!(
                "center frequency must be > 0, got {} Hz",
                self.center_freq_hz
            )));
        }

        Ok(())
    }
}

impl StreamConfig {
    /// Читает конфигурацию из JSON файла. Отсутствующие поля берутся по
    /// умолчанию.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> StreamResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: StreamConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_millis(self.transfer_timeout_ms)
    }

    pub fn validate(&self) -> StreamResult<()> {
        if self.fifo_size == 0 {
            return Err(StreamError::config("fifo_size must be > 0"));
        }

        if self.transfer_timeout_ms == 0 {
            return Err(StreamError::config("transfer_timeout_ms must be > 0"));
        }

        if self.rx_queue_capacity == 0 {
            return Err(StreamError::config("rx_queue_capacity must be > 0"));
        }

        if !(self.sample_rate_hz.is_finite() && self.sample_rate_hz > 0.0) {
            return Err(StreamError::config(format!(
                "sample rate must be > 0, got {} Hz",
                self.sample_rate_hz
            )));
        }

        if self.escalation.max_consecutive_underruns == Some(0)
            || self.escalation.max_consecutive_errors == Some(0)
        {
            return Err(StreamError::config(
                "escalation thresholds must be > 0 (use null to disable)",
            ));
        }

        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl std::fmt::Display for DeviceKind {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            DeviceKind::Sim => write!(f, "sim"),
            DeviceKind::Lime => write!(f, "lime"),
        }
    }
}

impl std::str::FromStr for DeviceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sim" | "simulated" => Ok(DeviceKind::Sim),
            "lime" | "limesdr" | "limesdr-mini" => Ok(DeviceKind::Lime),
            _ => Err(format!("Unknown device type: '{s}'. Use: sim, lime")),
        }
    }
}

impl std::fmt::Display for Antenna {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let name = match self {
            Antenna::None => "NONE",
            Antenna::LnaH => "LNAH",
            Antenna::LnaL => "LNAL",
            Antenna::LnaW => "LNAW",
            Antenna::Band1 => "BAND1",
            Antenna::Band2 => "BAND2",
            Antenna::Auto => "AUTO",
        };
        write!(f, "{name}")
    }
}

impl std::str::FromStr for Antenna {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "NONE" => Ok(Antenna::None),
            "LNAH" | "LNA_H" => Ok(Antenna::LnaH),
            "LNAL" | "LNA_L" => Ok(Antenna::LnaL),
            "LNAW" | "LNA_W" => Ok(Antenna::LnaW),
            "BAND1" => Ok(Antenna::Band1),
            "BAND2" => Ok(Antenna::Band2),
            "AUTO" => Ok(Antenna::Auto),
            _ => Err(format!(
                "Unknown antenna '{s}'. Use: LNAH, LNAL, LNAW, BAND1, BAND2, NONE, AUTO"
            )),
        }
    }
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            max_consecutive_underruns: Some(50),
            max_consecutive_errors: Some(10),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            device: DeviceKind::Sim,
            wire_format: WireFormat::Int16,
            fifo_size: DEFAULT_FIFO_SIZE,
            transfer_timeout_ms: DEFAULT_TRANSFER_TIMEOUT_MS,
            rx_queue_capacity: 64, // 64 * 16384 * 8 ~ 8 Мб на все RX каналы
            pool_slots: 16,
            sample_rate_hz: 10_000_000.0,
            escalation: EscalationPolicy::default(),
            stats_interval_secs: 5,
        }
    }
}

/// Парсит строку частоты в герцы.
///
/// Поддерживает суффиксы: `GHz`, `MHz`, `kHz`, `Hz` (регистронезависимо).
///
/// # Примеры
/// ```
/// use iqs_stream::config::parse_freq_hz;
/// assert_eq!(parse_freq_hz("106.3MHz").unwrap(), 106_300_000.0);
/// assert_eq!(parse_freq_hz("1.2GHz").unwrap(), 1_200_000_000.0);
/// assert_eq!(parse_freq_hz("2000000").unwrap(), 2_000_000.0);
/// ```
pub fn parse_freq_hz(s: &str) -> Result<f64, String> {
    let s = s.trim();
    let lower = s.to_lowercase();

    let (num_str, mult) = if let Some(v) = lower.strip_suffix("ghz") {
        (v.trim(), 1_000_000_000_f64)
    } else if let Some(v) = lower.strip_suffix("mhz") {
        (v.trim(), 1_000_000_f64)
    } else if let Some(v) = lower.strip_suffix("khz") {
        (v.trim(), 1_000_f64)
    } else if let Some(v) = lower.strip_suffix("hz") {
        (v.trim(), 1_f64)
    } else {
        (lower.as_str(), 1_f64)
    };

    let n: f64 = num_str
        .parse()
        .map_err(|e| format!("Invalid frequency value '{s}': {e}"))?;

    if !n.is_finite() || n < 0.0 {
        return Err(format!("Invalid frequency value '{s}'"));
    }

    Ok((n * mult).round())
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

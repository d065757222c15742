use std::{
    f32::consts::PI,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use clap::Parser;
use iqs_stream::{
    create_driver, parse_freq_hz, Antenna, ChannelConfig, Device, DeviceKind, StreamConfig,
    StreamEvent,
};
use iqs_types::{Complex32, Direction, WireFormat};
use log::{debug, error, info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "iqs-stream",
    version = env!("CARGO_PKG_VERSION"),
    about = "Stream IQ samples through RX/TX channels of an SDR device",
    long_about = None,
)]
struct Cli {
    /// SDR устройство: sim, lime
    #[arg(short, long)]
    device: Option<String>,
    /// RX каналы через запятую (0,1). Без --rx и --tx включается RX 0
    #[arg(long, value_delimiter = ',')]
    rx: Vec<usize>,
    /// TX каналы через запятую. TX передаёт тон
    #[arg(long, value_delimiter = ',')]
    tx: Vec<usize>,
    /// Формат выборок на линии: float32, int16, int12
    #[arg(long)]
    format: Option<String>,
    /// Несущая частота (106.3MHz, 2.45GHz, 100000000)
    #[arg(short = 'f', long, default_value = "100MHz")]
    freq: String,
    /// Частота дискретизации (10MHz, 2000000)
    #[arg(short = 'r', long)]
    rate: Option<String>,
    /// Нормированное усиление 0..1
    #[arg(short, long, default_value = "0.5")]
    gain: f64,
    /// Антенна RX: LNAH, LNAL, LNAW, NONE, AUTO
    #[arg(long, default_value = "LNAW")]
    antenna_rx: String,
    /// Антенна TX: BAND1, BAND2, NONE, AUTO
    #[arg(long, default_value = "BAND1")]
    antenna_tx: String,
    /// Полоса ФНЧ (5MHz). По умолчанию ФНЧ выключен
    #[arg(long)]
    lpf: Option<String>,
    /// IQ пар за один вызов транспорта
    #[arg(long)]
    fifo_size: Option<usize>,
    /// Ограничение работы (секунды). По умолчанию: до Ctrl+C
    #[arg(long)]
    duration: Option<u64>,
    /// JSON конфигурация потока, флаги выше её перекрывают
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Тихий режим (только ошибки)
    #[arg(short, long)]
    quiet: bool,
}

/// Выходит с кодом 1, если `result` содержит ошибку.
fn or_exit<T, E: std::fmt::Display>(
    result: Result<T, E>,
    what: &str,
) -> T {
    match result {
        Ok(v) => v,
        Err(e) => {
            error!("{what}: {e}");
            std::process::exit(1);
        }
    }
}

fn stream_config(cli: &Cli) -> StreamConfig {
    let mut config = match &cli.config {
        Some(path) => or_exit(StreamConfig::from_json_file(path), "--config"),
        None => StreamConfig::default(),
    };

    if let Some(device) = &cli.device {
        config.device = or_exit(device.parse::<DeviceKind>(), "--device");
    }
    if let Some(format) = &cli.format {
        config.wire_format = or_exit(format.parse::<WireFormat>(), "--format");
    }
    if let Some(rate) = &cli.rate {
        config.sample_rate_hz = or_exit(parse_freq_hz(rate), "--rate");
    }
    if let Some(fifo_size) = cli.fifo_size {
        config.fifo_size = fifo_size;
    }

    or_exit(config.validate(), "configuration");
    config
}

fn channel_config(
    cli: &Cli,
    direction: Direction,
) -> ChannelConfig {
    let center_freq_hz = or_exit(parse_freq_hz(&cli.freq), "--freq");
    let antenna = match direction {
        Direction::Rx => or_exit(cli.antenna_rx.parse::<Antenna>(), "--antenna-rx"),
        Direction::Tx => or_exit(cli.antenna_tx.parse::<Antenna>(), "--antenna-tx"),
    };
    let lpf_hz = cli
        .lpf
        .as_deref()
        .map(|s| or_exit(parse_freq_hz(s), "--lpf"));

    ChannelConfig {
        antenna,
        gain_normalized: cli.gain,
        lpf_hz: lpf_hz.unwrap_or(0.0),
        lpf_enabled: lpf_hz.is_some(),
        center_freq_hz,
    }
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.quiet { "error" } else { "info" };

    env_logger::Builder::new()
        .filter_level(level.parse().unwrap_or(log::LevelFilter::Info))
        .parse_default_env()
        .format_target(false)
        .format_timestamp_millis()
        .init();

    let config = stream_config(&cli);
    let driver = or_exit(create_driver(&config), "Failed to open device");
    let mut device = or_exit(Device::open(driver, config.clone()), "Failed to open device");

    let rx_config = channel_config(&cli, Direction::Rx);
    let tx_config = channel_config(&cli, Direction::Tx);

    let rx_channels = if cli.rx.is_empty() && cli.tx.is_empty() {
        vec![0]
    } else {
        cli.rx.clone()
    };

    for &ch in &rx_channels {
        or_exit(
            device.enable_channel(Direction::Rx, ch, &rx_config),
            "Failed to enable RX channel",
        );
    }
    for &ch in &cli.tx {
        or_exit(
            device.enable_channel(Direction::Tx, ch, &tx_config),
            "Failed to enable TX channel",
        );
    }

    // Приём: счётчики выборок по каналам
    let received: Arc<Vec<AtomicU64>> = Arc::new(
        (0..device.info().rx_channels)
            .map(|_| AtomicU64::new(0))
            .collect(),
    );
    let rx_counts = received.clone();
    or_exit(
        device.set_rx_callback(move |samples, channel, timestamp| {
            debug!(
                "Received {} samples on channel {channel} (ts {timestamp})",
                samples.len()
            );
            if let Some(c) = rx_counts.get(channel) {
                c.fetch_add(samples.len() as u64, Ordering::Relaxed);
            }
        }),
        "RX callback",
    );

    // Передача: непрерывный тон, фаза своя на каждом канале
    let sample_rate_hz = config.sample_rate_hz;
    let positions: Arc<Vec<AtomicU64>> = Arc::new(
        (0..device.info().tx_channels)
            .map(|_| AtomicU64::new(0))
            .collect(),
    );
    or_exit(
        device.set_tx_callback(move |samples, channel| {
            let Some(pos) = positions.get(channel) else {
                return;
            };
            let start = pos.fetch_add(samples.len() as u64, Ordering::Relaxed);
            let step = 2.0 * PI * 5_000.0 / sample_rate_hz as f32;
            let period = sample_rate_hz / 5_000.0;

            for (i, s) in samples.iter_mut().enumerate() {
                let k = (start + i as u64) as f64 % period;
                *s = Complex32::from_polar(0.5, step * k as f32);
            }
        }),
        "TX callback",
    );

    let stop_flag = Arc::new(AtomicBool::new(false));

    // Эскалация ошибок останавливает стриминг
    let stop_escalated = stop_flag.clone();
    or_exit(
        device.set_event_callback(move |event| {
            if let StreamEvent::Escalated { .. } = event {
                stop_escalated.store(true, Ordering::SeqCst);
            }
        }),
        "event callback",
    );

    let stop_ctrlc = stop_flag.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        if stop_ctrlc.swap(true, Ordering::SeqCst) {
            // Второй Ctrl+C: принудительный выход
            warn!("Force exit");
            std::process::exit(130);
        }
        warn!("Ctrl+C received, stopping channels...");
    }) {
        warn!("Failed to set Ctrl+C handler: {e}");
    }

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  Device        : {}", device.info());
    info!("  RX channels   : {:?}", rx_channels);
    info!("  TX channels   : {:?}", cli.tx);
    info!("  Center freq   : {:.3} MHz", rx_config.center_freq_hz / 1e6);
    info!("  Sample rate   : {:.3} Msps", config.sample_rate_hz / 1e6);
    info!(
        "  Wire format   : {} ({} B/sample)",
        config.wire_format,
        config.wire_format.sample_size()
    );
    info!("  FIFO size     : {}", config.fifo_size);
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    or_exit(device.start(), "Failed to start streaming");

    let session_start = Instant::now();
    let deadline = cli.duration.map(Duration::from_secs);
    let stats_interval = Duration::from_secs(config.stats_interval_secs.max(1));
    let mut last_stats = Instant::now();
    let metrics = device.metrics();

    while !stop_flag.load(Ordering::SeqCst) {
        if deadline.is_some_and(|d| session_start.elapsed() >= d) {
            break;
        }

        thread::sleep(Duration::from_millis(100));

        if last_stats.elapsed() >= stats_interval {
            last_stats = Instant::now();
            for ch in &rx_channels {
                if let Some(c) = received.get(*ch) {
                    info!(
                        "RX channel {ch}: {} samples received",
                        c.load(Ordering::Relaxed)
                    );
                }
            }
            info!(
                "RX {:.3} Msps, TX {:.3} Msps, {} underruns, {} errors",
                metrics.rx_msps(&session_start),
                metrics.tx_msps(&session_start),
                metrics.underruns.load(Ordering::Relaxed),
                metrics.transport_errors.load(Ordering::Relaxed),
            );
        }
    }

    if let Err(e) = device.stop() {
        error!("Stop failed: {e}");
        std::process::exit(1);
    }

    // --- Итоговая статистика ---
    let summary = metrics.summary(&session_start);
    info!("\n{summary}");

    if summary.escalations > 0 {
        warn!(
            "⚠ {} escalations occurred. Check the device connection and sample rate.",
            summary.escalations
        );
        std::process::exit(1);
    }

    info!("✓ Streaming complete");
}

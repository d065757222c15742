use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};

/// Метрики стриминга, обновляемые lock-free из всех воркеров.
#[derive(Debug, Default)]
pub struct StreamMetrics {
    pub rx_blocks: AtomicU64,
    pub rx_samples: AtomicU64,
    pub tx_blocks: AtomicU64,
    pub tx_samples: AtomicU64,
    /// Блоков, переданных в пользовательский RX callback
    pub dispatched_blocks: AtomicU64,
    pub transport_errors: AtomicU64,
    pub malformed_blocks: AtomicU64,
    pub underruns: AtomicU64,
    /// Выборок, не принятых транспортом при недоотправке
    pub underrun_samples: AtomicU64,
    /// Неполных чтений RX
    pub overruns: AtomicU64,
    /// Выборок, пропущенных железом (по разрыву меток времени)
    pub gap_samples: AtomicU64,
    pub escalations: AtomicU64,
    /// Сколько раз RX воркер ждал свободного места в очереди
    pub delivery_stalls: AtomicU64,
}

/// Snapshot метрик для отображения / тестирования.
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub duration_secs: f64,
    pub rx_blocks: u64,
    pub rx_samples: u64,
    pub tx_blocks: u64,
    pub tx_samples: u64,
    pub dispatched_blocks: u64,
    pub transport_errors: u64,
    pub malformed_blocks: u64,
    pub underruns: u64,
    pub underrun_samples: u64,
    pub overruns: u64,
    pub gap_samples: u64,
    pub escalations: u64,
    pub delivery_stalls: u64,
    pub rx_msps: f64,
    pub tx_msps: f64,
}

impl StreamMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[inline]
    pub(crate) fn add(
        counter: &AtomicU64,
        v: u64,
    ) {
        counter.fetch_add(v, Ordering::Relaxed);
    }

    fn rate_msps(
        samples: u64,
        elapsed: &Instant,
    ) -> f64 {
        let secs = elapsed.elapsed().as_secs_f64();

        if secs < 1e-9 {
            return 0.0;
        }

        samples as f64 / secs / 1_000_000.0
    }

    /// Скорость приёма (млн выборок/с) по всем RX каналам.
    pub fn rx_msps(
        &self,
        elapsed: &Instant,
    ) -> f64 {
        Self::rate_msps(self.rx_samples.load(Ordering::Relaxed), elapsed)
    }

    /// Скорость передачи (млн выборок/с) по всем TX каналам.
    pub fn tx_msps(
        &self,
        elapsed: &Instant,
    ) -> f64 {
        Self::rate_msps(self.tx_samples.load(Ordering::Relaxed), elapsed)
    }

    /// Итоговая сводка для вывода в конце сессии.
    pub fn summary(
        &self,
        elapsed: &Instant,
    ) -> MetricsSummary {
        MetricsSummary {
            duration_secs: elapsed.elapsed().as_secs_f64(),
            rx_blocks: self.rx_blocks.load(Ordering::Relaxed),
            rx_samples: self.rx_samples.load(Ordering::Relaxed),
            tx_blocks: self.tx_blocks.load(Ordering::Relaxed),
            tx_samples: self.tx_samples.load(Ordering::Relaxed),
            dispatched_blocks: self.dispatched_blocks.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            malformed_blocks: self.malformed_blocks.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            underrun_samples: self.underrun_samples.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            gap_samples: self.gap_samples.load(Ordering::Relaxed),
            escalations: self.escalations.load(Ordering::Relaxed),
            delivery_stalls: self.delivery_stalls.load(Ordering::Relaxed),
            rx_msps: self.rx_msps(elapsed),
            tx_msps: self.tx_msps(elapsed),
        }
    }
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        writeln!(f, "  Duration      : {:.1}s", self.duration_secs)?;
        writeln!(
            f,
            "  RX            : {} blocks, {} samples ({:.3} Msps)",
            self.rx_blocks, self.rx_samples, self.rx_msps
        )?;
        writeln!(f, "  Dispatched    : {} blocks", self.dispatched_blocks)?;
        writeln!(
            f,
            "  TX            : {} blocks, {} samples ({:.3} Msps)",
            self.tx_blocks, self.tx_samples, self.tx_msps
        )?;
        writeln!(f, "  Errors        : {}", self.transport_errors)?;
        writeln!(f, "  Malformed     : {}", self.malformed_blocks)?;
        writeln!(
            f,
            "  Underruns     : {} ({} samples lost)",
            self.underruns, self.underrun_samples
        )?;
        writeln!(f, "  Short reads   : {}", self.overruns)?;
        writeln!(f, "  Gap samples   : {}", self.gap_samples)?;
        writeln!(f, "  Stalls        : {}", self.delivery_stalls)?;
        writeln!(f, "  Escalations   : {}", self.escalations)?;
        write!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")
    }
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use super::*;

    #[test]
    fn test_initial_metrics_zero() {
        let metrics = StreamMetrics::new();
        let start = Instant::now();
        let summary = metrics.summary(&start);

        assert_eq!(summary.rx_blocks, 0);
        assert_eq!(summary.tx_samples, 0);
        assert_eq!(summary.transport_errors, 0);
        assert_eq!(summary.underruns, 0);
        assert_eq!(summary.escalations, 0);
        assert_eq!(summary.rx_msps, 0.0);
        assert_eq!(summary.tx_msps, 0.0);
    }

    #[test]
    fn test_throughput() {
        let metrics = StreamMetrics::new();

        metrics.rx_samples.store(20_000_000, Ordering::Relaxed);
        metrics.tx_samples.store(10_000_000, Ordering::Relaxed);

        let start = Instant::now() - Duration::from_secs(2);
        let summary = metrics.summary(&start);

        // 20M / 2s = 10 Msps, 10M / 2s = 5 Msps
        assert!((summary.rx_msps - 10.0).abs() < 0.1);
        assert!((summary.tx_msps - 5.0).abs() < 0.1);
    }

    #[test]
    fn test_summary_display_lists_counters() {
        let metrics = StreamMetrics::new();
        metrics.underruns.store(3, Ordering::Relaxed);
        metrics.underrun_samples.store(300, Ordering::Relaxed);

        let text = metrics.summary(&Instant::now()).to_string();
        assert!(text.contains("Underruns     : 3 (300 samples lost)"));
    }

    #[test]
    fn test_multithreaded_updates() {
        let metrics = StreamMetrics::new();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let m = metrics.clone();
                thread::spawn(move || {
                    for _ in 0..1_000 {
                        StreamMetrics::add(&m.rx_blocks, 1);
                        StreamMetrics::add(&m.rx_samples, 16_384);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(metrics.rx_blocks.load(Ordering::Relaxed), 4_000);
        assert_eq!(
            metrics.rx_samples.load(Ordering::Relaxed),
            4_000 * 16_384
        );
    }
}

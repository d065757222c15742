use std::sync::{
    atomic::{AtomicBool, AtomicU8, Ordering},
    Arc,
};

/// Одноразовый сигнал остановки воркера.
///
/// Воркер проверяет его на границе итерации, между вызовами транспорта.
/// Вызов транспорта, который уже идёт, не прерывается, поэтому задержка
/// остановки ограничена таймаутом вызова.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
}

/// Состояние воркера.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    /// Поток создан, к железу ещё не обращался
    Spawned = 0,
    Running = 1,
    /// Сигнал получен, выходим из цикла
    Stopping = 2,
    /// Поток отдал транспорт и больше ничего не выдаёт
    Terminated = 3,
}

/// Состояние воркера, видимое из других потоков.
#[derive(Debug, Clone)]
pub struct SharedState {
    inner: Arc<AtomicU8>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Поднимает сигнал. Возвращает `true` только для первого вызова.
    pub fn signal(&self) -> bool {
        !self.flag.swap(true, Ordering::AcqRel)
    }

    pub fn is_signaled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

impl WorkerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => WorkerState::Spawned,
            1 => WorkerState::Running,
            2 => WorkerState::Stopping,
            _ => WorkerState::Terminated,
        }
    }
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(AtomicU8::new(WorkerState::Spawned as u8)),
        }
    }

    pub fn get(&self) -> WorkerState {
        WorkerState::from_u8(self.inner.load(Ordering::Acquire))
    }

    pub fn set(
        &self,
        state: WorkerState,
    ) {
        self.inner.store(state as u8, Ordering::Release);
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            WorkerState::Spawned => write!(f, "spawned"),
            WorkerState::Running => write!(f, "running"),
            WorkerState::Stopping => write!(f, "stopping"),
            WorkerState::Terminated => write!(f, "terminated"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_signal_single_use() {
        let stop = StopSignal::new();
        let observer = stop.clone();

        assert!(!observer.is_signaled());
        assert!(stop.signal());
        assert!(!stop.signal(), "second signal is a no-op");
        assert!(observer.is_signaled());
    }

    #[test]
    fn test_stop_signal_across_threads() {
        let stop = StopSignal::new();
        let worker_stop = stop.clone();

        let handle = std::thread::spawn(move || {
            let mut iterations = 0u64;
            while !worker_stop.is_signaled() {
                iterations += 1;
                std::thread::sleep(std::time::Duration::from_millis(1));
            }
            iterations
        });

        std::thread::sleep(std::time::Duration::from_millis(20));
        stop.signal();
        assert!(handle.join().unwrap() > 0);
    }

    #[test]
    fn test_shared_state_transitions() {
        let state = SharedState::new();
        let view = state.clone();
        assert_eq!(view.get(), WorkerState::Spawned);

        for s in [
            WorkerState::Running,
            WorkerState::Stopping,
            WorkerState::Terminated,
        ] {
            state.set(s);
            assert_eq!(view.get(), s);
        }
        assert_eq!(view.get().to_string(), "terminated");
    }
}

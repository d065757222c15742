use std::{thread::JoinHandle, time::Duration};

use iqs_types::Direction;

use crate::{Reporter, SharedState, StopSignal, Transport, WorkerState};

/// Общие параметры RX и TX воркера.
#[derive(Clone)]
pub struct WorkerContext {
    pub channel_index: usize,
    /// IQ пар за один вызов транспорта
    pub fifo_size: usize,
    /// Ограничение ожидания одного вызова транспорта
    pub timeout: Duration,
    pub stop: StopSignal,
    pub state: SharedState,
    pub reporter: Reporter,
}

/// Запущенный поток воркера со стороны устройства.
pub struct WorkerHandle {
    pub direction: Direction,
    pub channel_index: usize,
    stop: StopSignal,
    state: SharedState,
    join: JoinHandle<Box<dyn Transport>>,
}

impl WorkerHandle {
    /// Запускает `body` в именованном потоке `iqs-rx-<n>` / `iqs-tx-<n>`.
    ///
    /// `body` возвращает транспорт канала, когда воркер завершился.
    pub fn spawn<F>(
        direction: Direction,
        ctx: &WorkerContext,
        body: F,
    ) -> std::io::Result<Self>
    where
        F: FnOnce() -> Box<dyn Transport> + Send + 'static,
    {
        let name = format!(
            "iqs-{}-{}",
            direction.to_string().to_lowercase(),
            ctx.channel_index
        );
        let join = std::thread::Builder::new().name(name).spawn(body)?;

        Ok(Self {
            direction,
            channel_index: ctx.channel_index,
            stop: ctx.stop.clone(),
            state: ctx.state.clone(),
            join,
        })
    }

    pub fn signal(&self) -> bool {
        self.stop.signal()
    }

    pub fn state(&self) -> WorkerState {
        self.state.get()
    }

    /// Дожидается завершения и забирает транспорт.
    ///
    /// При панике возвращает её текст; транспорт в этом случае потерян.
    pub fn join(self) -> Result<Box<dyn Transport>, String> {
        self.join.join().map_err(|payload| {
            if let Some(s) = payload.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            }
        })
    }
}

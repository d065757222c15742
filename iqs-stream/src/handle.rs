use iqs_types::{Direction, WireFormat};

use crate::{ChannelConfig, StreamError, StreamResult, Transport};

/// Канал, включённый на устройстве.
///
/// Владелец: [`crate::Device`]. На время сессии поток отдаётся воркеру и
/// возвращается через `join`, так что воркер не может пережить handle.
pub struct ChannelHandle {
    pub channel_index: usize,
    pub direction: Direction,
    pub wire_format: WireFormat,
    pub config: ChannelConfig,
    transport: Option<Box<dyn Transport>>,
}

impl ChannelHandle {
    pub fn new(
        channel_index: usize,
        direction: Direction,
        wire_format: WireFormat,
        config: ChannelConfig,
        transport: Box<dyn Transport>,
    ) -> Self {
        Self {
            channel_index,
            direction,
            wire_format,
            config,
            transport: Some(transport),
        }
    }

    /// Отдаёт поток воркеру.
    pub fn lend(&mut self) -> StreamResult<Box<dyn Transport>> {
        self.transport.take().ok_or_else(|| {
            StreamError::invalid_state(format!(
                "{} channel {} has no stream (lost after a worker failure, re-enable the channel)",
                self.direction, self.channel_index
            ))
        })
    }

    /// Принимает поток обратно после завершения воркера.
    pub fn restore(
        &mut self,
        transport: Box<dyn Transport>,
    ) {
        self.transport = Some(transport);
    }

    /// Поток доступен устройству (не выдан воркеру и не потерян).
    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    pub fn transport_mut(&mut self) -> Option<&mut (dyn Transport + 'static)> {
        self.transport.as_deref_mut()
    }
}

impl std::fmt::Debug for ChannelHandle {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("channel_index", &self.channel_index)
            .field("direction", &self.direction)
            .field("wire_format", &self.wire_format)
            .field("config", &self.config)
            .field("has_transport", &self.transport.is_some())
            .finish()
    }
}

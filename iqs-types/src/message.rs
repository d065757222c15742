use num_complex::Complex32;

/// Индекс канала A.
pub const CHANNEL_A: usize = 0;

/// Индекс канала B.
pub const CHANNEL_B: usize = 1;

/// Блок принятых выборок одного RX канала.
///
/// Создаётся RX воркером ровно один раз на каждое успешное чтение с `n > 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMessage {
    /// Индекс канала на устройстве
    pub channel_index: usize,
    /// Счётчик выборок железа на начало блока
    pub timestamp: u64,
    /// Нормированные выборки
    pub samples: Vec<Complex32>,
}

impl ChannelMessage {
    pub fn new(
        channel_index: usize,
        timestamp: u64,
        samples: Vec<Complex32>,
    ) -> Self {
        Self {
            channel_index,
            timestamp,
            samples,
        }
    }

    /// Кол-во IQ пар в блоке
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Ожидаемая метка времени следующего блока без пропусков.
    ///
    /// Счётчик железа 64-битный и при переполнении начинается с нуля.
    pub fn next_timestamp(&self) -> u64 {
        self.timestamp.wrapping_add(self.samples.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_timestamp() {
        let msg = ChannelMessage::new(CHANNEL_B, 1000, vec![Complex32::new(0.0, 0.0); 16]);
        assert_eq!(msg.next_timestamp(), 1016);
        assert_eq!(msg.len(), 16);
    }

    #[test]
    fn test_next_timestamp_wraps_at_counter_end() {
        let msg = ChannelMessage::new(CHANNEL_A, u64::MAX - 2, vec![Complex32::new(0.0, 0.0); 8]);
        assert_eq!(msg.next_timestamp(), 5);
    }
}

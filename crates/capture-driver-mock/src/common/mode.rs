//! Producer modes for the mock frame source.
//!
//! - **Manual**: frames are completed only on request, for deterministic tests
//! - **FreeRunning**: a producer thread completes frames at the camera rate

/// How the mock source produces frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerMode {
    /// Frames are completed through [`MockProducer`](crate::MockProducer).
    Manual {
        /// Frames completed synchronously inside `start()`, before the consumer
        /// gets a chance to run.
        preload: u32,
    },
    /// A background thread completes one frame per camera period.
    FreeRunning,
}

impl Default for ProducerMode {
    fn default() -> Self {
        ProducerMode::Manual { preload: 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mode() {
        assert_eq!(ProducerMode::default(), ProducerMode::Manual { preload: 0 });
    }
}

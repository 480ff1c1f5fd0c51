use crate::frame::MAX_PAYLOAD_LEN;

/// Configuration options for a WebSocket connection.
///
/// `Options` follows a consuming builder style:
///
/// ```rust
/// use wstext::Options;
///
/// let options = Options::default()
///     .with_max_payload_read(16 * 1024)
///     .with_backpressure_boundary(64 * 1024);
/// ```
#[derive(Clone, Debug, Default)]
pub struct Options {
    /// Maximum allowed payload size for incoming frames, in bytes.
    ///
    /// A frame announcing a larger payload closes the connection before any of its payload is
    /// buffered. Values above [`MAX_PAYLOAD_LEN`] are clamped to it since larger frames cannot
    /// be represented without the 64-bit length form.
    ///
    /// Default: [`MAX_PAYLOAD_LEN`] (65535 bytes)
    pub max_payload_read: Option<usize>,

    /// Number of buffered outbound bytes after which the connection flushes to the transport
    /// before accepting more frames.
    ///
    /// Default: the `tokio-util` framed writer default (128 KiB)
    pub backpressure_boundary: Option<usize>,
}

impl Options {
    /// Sets the maximum allowed payload size for incoming frames.
    ///
    /// # Parameters
    /// - `size`: The maximum payload size in bytes, at most [`MAX_PAYLOAD_LEN`].
    pub fn with_max_payload_read(self, size: usize) -> Self {
        Self {
            max_payload_read: Some(size),
            ..self
        }
    }

    /// Sets the outbound buffer size that triggers a flush.
    pub fn with_backpressure_boundary(self, boundary: usize) -> Self {
        Self {
            backpressure_boundary: Some(boundary),
            ..self
        }
    }

    /// The effective incoming payload limit.
    pub(crate) fn payload_limit(&self) -> usize {
        self.max_payload_read
            .unwrap_or(MAX_PAYLOAD_LEN)
            .min(MAX_PAYLOAD_LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limit() {
        assert_eq!(Options::default().payload_limit(), MAX_PAYLOAD_LEN);
    }

    #[test]
    fn test_limit_is_clamped() {
        let options = Options::default().with_max_payload_read(1 << 20);
        assert_eq!(options.payload_limit(), MAX_PAYLOAD_LEN);

        let options = Options::default().with_max_payload_read(512);
        assert_eq!(options.payload_limit(), 512);
    }

    #[test]
    fn test_builder_keeps_other_fields() {
        let options = Options::default()
            .with_backpressure_boundary(4096)
            .with_max_payload_read(10);

        assert_eq!(options.backpressure_boundary, Some(4096));
        assert_eq!(options.max_payload_read, Some(10));
    }
}

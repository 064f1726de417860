//! Record metadata types.

use std::sync::Arc;

/// Delivery coordinates of a record.
///
/// Filled in by the source from the feed message. Sinks only read it for
/// logging; the acknowledge capability carries everything needed to commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    /// Topic the message was consumed from.
    ///
    /// Shared so every record of a claim points at the same allocation.
    pub topic: Option<Arc<str>>,

    /// Partition within the topic.
    pub partition: i32,

    /// Offset within the partition.
    pub offset: i64,

    /// Monotonic sequence number assigned by the source.
    pub sequence: u64,
}

impl Metadata {
    /// Create new metadata with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create metadata with a sequence number.
    pub fn with_sequence(sequence: u64) -> Self {
        Self {
            sequence,
            ..Default::default()
        }
    }

    /// Set the topic, partition and offset.
    pub fn with_position(mut self, topic: Arc<str>, partition: i32, offset: i64) -> Self {
        self.topic = Some(topic);
        self.partition = partition;
        self.offset = offset;
        self
    }

    /// Reset every field, dropping the topic reference.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_builder() {
        let meta = Metadata::with_sequence(42).with_position(Arc::from("cpu"), 3, 1001);

        assert_eq!(meta.sequence, 42);
        assert_eq!(meta.topic.as_deref(), Some("cpu"));
        assert_eq!(meta.partition, 3);
        assert_eq!(meta.offset, 1001);
    }

    #[test]
    fn test_metadata_clear() {
        let mut meta = Metadata::with_sequence(7).with_position(Arc::from("mem"), 1, 2);
        meta.clear();
        assert_eq!(meta, Metadata::default());
    }
}

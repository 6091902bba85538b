use crate::Record;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// The overview line of an article.
///
/// Persisted as a MessagePack array with the fields in declaration order:
/// subject, from, date, message-id, references, byte size, line count.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overview {
    pub subject: Bytes,
    pub from: Bytes,
    pub date: Bytes,
    pub message_id: Bytes,
    pub references: Bytes,
    pub bytes: i64,
    pub lines: i64,
}

impl Record for Overview {}

/// Live article count and number range of a group.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct GroupStats {
    pub number: u64,
    pub low: u64,
    pub high: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overview_is_a_seven_element_array() {
        let ov = Overview {
            subject: Bytes::from_static(b"s"),
            from: Bytes::from_static(b"f"),
            date: Bytes::from_static(b"d"),
            message_id: Bytes::from_static(b"<m@x>"),
            references: Bytes::new(),
            bytes: 120,
            lines: 3,
        };
        let raw = ov.encode().unwrap();
        assert_eq!(raw[0], 0x97);
        // bin8 subject
        assert_eq!(&raw[1..4], &[0xc4, 1, b's']);
        assert_eq!(&raw[raw.len() - 2..], &[120, 3]);
        assert_eq!(Overview::decode(&raw).unwrap(), ov);
    }
}

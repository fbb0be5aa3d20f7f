//! Command Codec
//!
//! Reduces a joystick snapshot to a decimal command string and encodes it
//! into the fixed 8-byte wire frame the peripheral expects.
//!
//! The pipeline is total: malformed or missing input degrades to zeroed
//! fields instead of erroring, so bad upstream data can never stall the
//! relay loop.

use std::collections::BTreeMap;

/// Snapshot entries consumed per update, by ascending index.
pub const MAX_SNAPSHOT_FIELDS: usize = 6;

/// Decimal characters that make up one wire field.
const FIELD_WIDTH: usize = 4;

/// Characters of the command string consumed by the encoder.
const COMMAND_WIDTH: usize = FIELD_WIDTH * 4;

/// Size of the encoded frame in bytes.
pub const FRAME_LEN: usize = 8;

/// One full snapshot from the command source: index -> value, ordered by
/// index. Each snapshot replaces the previous one entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandUpdate {
    values: BTreeMap<u32, i64>,
}

impl CommandUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an update from string-keyed source entries.
    ///
    /// Keys that do not parse as non-negative integers are dropped.
    pub fn from_entries<K, I>(entries: I) -> Self
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, i64)>,
    {
        let values = entries
            .into_iter()
            .filter_map(|(key, value)| key.as_ref().parse::<u32>().ok().map(|i| (i, value)))
            .collect();
        Self { values }
    }

    pub fn insert(&mut self, index: u32, value: i64) {
        self.values.insert(index, value);
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Concatenated decimal representations of the first
    /// [`MAX_SNAPSHOT_FIELDS`] entries, by ascending index.
    pub fn digit_string(&self) -> String {
        self.values
            .values()
            .take(MAX_SNAPSHOT_FIELDS)
            .map(|v| v.to_string())
            .collect()
    }
}

/// The encoded command: four signed 16-bit fields in wire order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandFrame {
    pub throttle: i16,
    pub yaw: i16,
    pub pitch: i16,
    pub roll: i16,
}

impl CommandFrame {
    /// Reduce a snapshot to its command string and encode it.
    pub fn from_update(update: &CommandUpdate) -> Self {
        Self::from_digits(&update.digit_string())
    }

    /// Encode a decimal command string.
    ///
    /// The first [`COMMAND_WIDTH`] characters are split into
    /// [`FIELD_WIDTH`]-character groups in field order; each group is parsed
    /// as a decimal integer and clamped into the `i16` range. A missing or
    /// unparseable group yields 0.
    pub fn from_digits(digits: &str) -> Self {
        let reduced = &digits[..digits.len().min(COMMAND_WIDTH)];

        let mut fields = [0i16; 4];
        for (field, group) in fields.iter_mut().zip(reduced.as_bytes().chunks(FIELD_WIDTH)) {
            *field = parse_field(group);
        }

        let [throttle, yaw, pitch, roll] = fields;
        Self {
            throttle,
            yaw,
            pitch,
            roll,
        }
    }

    /// Serialize to the wire format: 8 bytes, little-endian, two bytes per
    /// field in order [throttle, yaw, pitch, roll].
    pub fn to_bytes(&self) -> [u8; FRAME_LEN] {
        let mut buf = [0u8; FRAME_LEN];
        let fields = [self.throttle, self.yaw, self.pitch, self.roll];
        for (chunk, field) in buf.chunks_exact_mut(2).zip(fields) {
            chunk.copy_from_slice(&field.to_le_bytes());
        }
        buf
    }
}

fn parse_field(group: &[u8]) -> i16 {
    std::str::from_utf8(group)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .map(|v| v.clamp(i64::from(i16::MIN), i64::from(i16::MAX)) as i16)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_is_always_eight_bytes() {
        assert_eq!(CommandFrame::from_digits("").to_bytes().len(), FRAME_LEN);
        assert_eq!(
            CommandFrame::from_update(&CommandUpdate::new())
                .to_bytes()
                .len(),
            FRAME_LEN
        );
    }

    #[test]
    fn test_missing_fields_default_to_zero() {
        let mut update = CommandUpdate::new();
        update.insert(0, 12);
        let frame = CommandFrame::from_update(&update);
        assert_eq!(frame.throttle, 12);
        assert_eq!(frame.yaw, 0);
        assert_eq!(frame.pitch, 0);
        assert_eq!(frame.roll, 0);
    }

    #[test]
    fn test_reducer_concatenates_by_ascending_index() {
        let mut update = CommandUpdate::new();
        update.insert(3, -5);
        update.insert(0, 12);
        update.insert(2, 300);
        update.insert(1, 7);
        assert_eq!(update.digit_string(), "127300-5");

        // "1273" parses, "00-5" does not and degrades to zero
        let frame = CommandFrame::from_update(&update);
        assert_eq!(frame.throttle, 1273);
        assert_eq!(frame.yaw, 0);
        assert_eq!(frame.pitch, 0);
        assert_eq!(frame.roll, 0);
        assert_eq!(frame.to_bytes(), [0xF9, 0x04, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_command_string_truncated_to_sixteen_chars() {
        let mut update = CommandUpdate::new();
        for (index, value) in [9999, 8888, 7777, 6666, 5555].into_iter().enumerate() {
            update.insert(index as u32, value);
        }
        assert_eq!(
            CommandFrame::from_update(&update),
            CommandFrame {
                throttle: 9999,
                yaw: 8888,
                pitch: 7777,
                roll: 6666,
            }
        );
    }

    #[test]
    fn test_at_most_six_entries_consumed() {
        let mut update = CommandUpdate::new();
        for index in 0..10u32 {
            update.insert(index, 1);
        }
        // first six single-digit entries only
        assert_eq!(update.digit_string(), "111111");
    }

    #[test]
    fn test_non_integer_keys_dropped() {
        let update = CommandUpdate::from_entries([
            ("axes", 99),
            ("0", 12),
            ("-2", 44),
            ("1", 7),
            ("buttons", 1),
        ]);
        assert_eq!(update.len(), 2);
        assert_eq!(update.digit_string(), "127");
    }

    #[test]
    fn test_field_values_clamped_not_wrapped() {
        assert_eq!(parse_field(b"9999"), 9999);
        assert_eq!(parse_field(b"-999"), -999);
        // wider groups stay clamped rather than wrapping
        assert_eq!(parse_field(b"99999"), i16::MAX);
        assert_eq!(parse_field(b"-99999"), i16::MIN);
    }

    #[test]
    fn test_typical_joystick_snapshot() {
        // throttle, yaw, pitch, roll plus the fixed camera and mode values
        let update = CommandUpdate::from_entries([
            ("0", 127),
            ("1", 130),
            ("2", 128),
            ("3", 125),
            ("4", 100),
            ("5", 0),
        ]);
        assert_eq!(update.digit_string(), "1271301281251000");
        let frame = CommandFrame::from_update(&update);
        assert_eq!(
            frame,
            CommandFrame {
                throttle: 1271,
                yaw: 3012,
                pitch: 8125,
                roll: 1000,
            }
        );
        let bytes = frame.to_bytes();
        assert_eq!(&bytes[0..2], &1271i16.to_le_bytes());
        assert_eq!(&bytes[6..8], &1000i16.to_le_bytes());
    }
}

//! Field synthesizers: solver assignments to concrete wire payloads.
//!
//! One synthesizer per constraint type. Each walks the constraint's
//! translation table in declared order, so payload field order is the
//! table order, never an incidental map order.

pub mod intent;
pub mod location;
pub mod sms;

/// Well-known semantic field keys shared between the observation path and
/// the synthesizers.
pub mod fields {
    /// Previous-fix latitude reported by a location query.
    pub const PREV_LATITUDE: &str = "prevLatitude";
    /// Previous-fix longitude reported by a location query.
    pub const PREV_LONGITUDE: &str = "prevLongitude";
    /// Latitude of the injected fix.
    pub const LATITUDE: &str = "latitude";
    /// Longitude of the injected fix.
    pub const LONGITUDE: &str = "longitude";
    /// Scalar displacement between previous and injected fix, meters.
    pub const DISPLACEMENT: &str = "displacement";
    /// Wall time of an injected event, epoch milliseconds.
    pub const TIME: &str = "time";
    /// Alarm firing time reported by an alarm query.
    pub const WHEN: &str = "when";
    /// Device time observed before synthesis, epoch milliseconds.
    pub const SYSTEM_PREV_TIME: &str = "systemPrevTime";
    /// Reserved variable carrying an MMddyyyy-formatted current date.
    pub const DATE_FORMAT: &str = "DateFormat(MMddyyyy)(<CurrentDate>)";

    /// Keys that describe observed state; they feed solves and are never
    /// emitted into a payload.
    #[must_use]
    pub fn is_observation_key(key: &str) -> bool {
        matches!(key, PREV_LATITUDE | PREV_LONGITUDE | SYSTEM_PREV_TIME)
    }
}

/// Ordered `(field, value)` pairs ready for wire encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConcreteInput {
    pairs: Vec<(String, String)>,
}

impl ConcreteInput {
    /// Empty payload.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field pair.
    pub fn push(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((field.into(), value.into()));
    }

    /// Removes every pair with this field name.
    pub fn remove(&mut self, field: &str) {
        self.pairs.retain(|(name, _)| name != field);
    }

    /// Iterates pairs in declared order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Returns true if the payload carries no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Renders the payload as space-separated `field<sep>value` tokens.
    #[must_use]
    pub fn render(&self, sep: char) -> String {
        self.pairs
            .iter()
            .map(|(n, v)| format!("{n}{sep}{v}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

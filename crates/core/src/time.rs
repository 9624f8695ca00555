//! Stream timestamps and time ranges over event history.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The timestamp of an event within a stream of events.
///
/// The total order is (instant, stream id): events from different streams
/// that share an instant sort deterministically by the stream id string,
/// which makes merge-sorting heterogeneous histories stable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamTimestamp {
    stream_id: String,
    instant: DateTime<Utc>,
}

impl StreamTimestamp {
    /// The current timestamp within the default (empty) stream.
    pub fn now() -> Self {
        Self::of("", Utc::now())
    }

    /// The current timestamp within the specified stream.
    pub fn now_in(stream_id: impl Into<String>) -> Self {
        Self::of(stream_id, Utc::now())
    }

    /// The timestamp at the given instant within the default (empty) stream.
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self::of("", instant)
    }

    pub fn of(stream_id: impl Into<String>, instant: DateTime<Utc>) -> Self {
        Self {
            stream_id: stream_id.into(),
            instant,
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn instant(&self) -> DateTime<Utc> {
        self.instant
    }

    /// This timestamp, but within a named substream of its stream.
    ///
    /// Lets one causal moment emit into multiple distinguishable streams
    /// (e.g. an aggregate and a related aggregate it affects) without the
    /// identities colliding.
    pub fn sub_stream(&self, substream_name: &str) -> Self {
        Self {
            stream_id: format!("{}:{}", self.stream_id, substream_name),
            instant: self.instant,
        }
    }

    /// This timestamp, moved into the future by the given milliseconds.
    pub fn plus_millis(&self, millis: i64) -> Self {
        Self {
            stream_id: self.stream_id.clone(),
            instant: self.instant + Duration::milliseconds(millis),
        }
    }

    /// This timestamp, moved into the past by the given milliseconds.
    pub fn minus_millis(&self, millis: i64) -> Self {
        self.plus_millis(-millis)
    }

    pub fn is_before(&self, other: &StreamTimestamp) -> bool {
        self < other
    }

    pub fn is_after(&self, other: &StreamTimestamp) -> bool {
        self > other
    }
}

impl PartialOrd for StreamTimestamp {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StreamTimestamp {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        self.instant
            .cmp(&other.instant)
            .then_with(|| self.stream_id.cmp(&other.stream_id))
    }
}

impl core::fmt::Display for StreamTimestamp {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.instant, self.stream_id)
    }
}

/// The upper or lower bound of a [`TimeRange`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRangeBound {
    instant: DateTime<Utc>,
    inclusive: bool,
}

impl TimeRangeBound {
    pub fn inclusive(instant: DateTime<Utc>) -> Self {
        Self {
            instant,
            inclusive: true,
        }
    }

    pub fn exclusive(instant: DateTime<Utc>) -> Self {
        Self {
            instant,
            inclusive: false,
        }
    }

    pub fn instant(&self) -> DateTime<Utc> {
        self.instant
    }

    pub fn is_inclusive(&self) -> bool {
        self.inclusive
    }

    /// Is the supplied instant within the lower bound represented by this
    /// bound?
    pub fn contains_lower(&self, instant: DateTime<Utc>) -> bool {
        instant > self.instant || (instant == self.instant && self.inclusive)
    }

    /// Is the supplied instant within the upper bound represented by this
    /// bound?
    pub fn contains_upper(&self, instant: DateTime<Utc>) -> bool {
        instant < self.instant || (instant == self.instant && self.inclusive)
    }
}

/// A range of instants, used to scope history queries.
///
/// Either bound may be absent; a fully unbounded range accepts everything.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeRange {
    lower: Option<TimeRangeBound>,
    upper: Option<TimeRangeBound>,
}

/// Captures the upper bound of a time range whose lower bound is already
/// known.
#[derive(Debug, Copy, Clone)]
pub struct TimeRangeFrom {
    lower: Option<TimeRangeBound>,
}

impl TimeRangeFrom {
    pub fn to_inclusive(self, upper: DateTime<Utc>) -> TimeRange {
        self.to(Some(TimeRangeBound::inclusive(upper)))
    }

    pub fn to_exclusive(self, upper: DateTime<Utc>) -> TimeRange {
        self.to(Some(TimeRangeBound::exclusive(upper)))
    }

    pub fn to_unbounded(self) -> TimeRange {
        self.to(None)
    }

    pub fn to(self, upper: Option<TimeRangeBound>) -> TimeRange {
        TimeRange {
            lower: self.lower,
            upper,
        }
    }
}

impl TimeRange {
    /// The range accepting every instant.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn from_inclusive(lower: DateTime<Utc>) -> TimeRangeFrom {
        Self::from_bound(Some(TimeRangeBound::inclusive(lower)))
    }

    pub fn from_exclusive(lower: DateTime<Utc>) -> TimeRangeFrom {
        Self::from_bound(Some(TimeRangeBound::exclusive(lower)))
    }

    pub fn from_unbounded() -> TimeRangeFrom {
        Self::from_bound(None)
    }

    /// Start building a range from an explicit (possibly absent) lower
    /// bound.
    pub fn from_bound(lower: Option<TimeRangeBound>) -> TimeRangeFrom {
        TimeRangeFrom { lower }
    }

    /// Test whether the range contains the given instant: the conjunction
    /// of both bound tests.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.lower.is_none_or(|lower| lower.contains_lower(instant))
            && self.upper.is_none_or(|upper| upper.contains_upper(instant))
    }

    pub fn is_unbounded(&self) -> bool {
        self.lower.is_none() && self.upper.is_none()
    }

    pub fn lower_bound(&self) -> Option<TimeRangeBound> {
        self.lower
    }

    pub fn upper_bound(&self) -> Option<TimeRangeBound> {
        self.upper
    }
}

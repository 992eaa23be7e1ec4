//! Adaptive time bucketing for the activity histogram.
//!
//! The bucket width follows the age of the oldest event:
//!
//! | span          | width | buckets            |
//! |---------------|-------|--------------------|
//! | up to 4 hours | 1 h   | ceil(span / width) |
//! | up to 1 day   | 4 h   | ceil(span / width) |
//! | up to 7 days  | 1 day | ceil(span / width) |
//! | longer        | 1 day | 7                  |
//!
//! The grid is aligned to multiples of the width since the epoch so that
//! repeated reads over a stable window keep the same boundaries.

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

pub const HOUR_MS: i64 = 3_600_000;
pub const DAY_MS: i64 = 24 * HOUR_MS;

/// Span assumed when there are no events.
const EMPTY_SPAN_MS: i64 = HOUR_MS;

/// Bucket width and count for a histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketConfig {
    pub bucket_size_ms: i64,
    pub num_buckets: usize,
}

/// Choose the bucket layout for events spanning `span_ms`.
pub fn choose_bucket_config(span_ms: i64) -> BucketConfig {
    let span_ms = span_ms.max(1);
    let fitted = |bucket_size_ms: i64| BucketConfig {
        bucket_size_ms,
        num_buckets: (span_ms.div_euclid(bucket_size_ms)
            + i64::from(span_ms.rem_euclid(bucket_size_ms) != 0))
        .max(1) as usize,
    };

    if span_ms <= 4 * HOUR_MS {
        fitted(HOUR_MS)
    } else if span_ms <= DAY_MS {
        fitted(4 * HOUR_MS)
    } else if span_ms <= 7 * DAY_MS {
        fitted(DAY_MS)
    } else {
        BucketConfig {
            bucket_size_ms: DAY_MS,
            num_buckets: 7,
        }
    }
}

/// Errors while building a histogram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketError {
    /// A bucket boundary cannot be represented as a calendar time
    TimestampOutOfRange(i64),
    /// Arithmetic on the supplied timestamps overflowed
    Overflow,
}

impl std::fmt::Display for BucketError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BucketError::TimestampOutOfRange(ts) => write!(f, "Timestamp out of range: {ts}"),
            BucketError::Overflow => write!(f, "Timestamp arithmetic overflowed"),
        }
    }
}

impl std::error::Error for BucketError {}

/// A fixed-length histogram with one display label per bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Histogram {
    pub bucket_size_ms: i64,
    pub buckets: Vec<u64>,
    pub labels: Vec<String>,
    pub aligned_start: i64,
}

impl Histogram {
    pub fn total(&self) -> u64 {
        self.buckets.iter().sum()
    }

    pub fn max(&self) -> u64 {
        self.buckets.iter().copied().max().unwrap_or(0)
    }

    /// Mean count per bucket.
    pub fn average_per_bucket(&self) -> f64 {
        if self.buckets.is_empty() {
            0.0
        } else {
            self.total() as f64 / self.buckets.len() as f64
        }
    }

    /// Unit string for the average, e.g. `per 4h` or `per day`.
    pub fn unit(&self) -> String {
        if self.bucket_size_ms < DAY_MS {
            format!("per {}h", self.bucket_size_ms / HOUR_MS)
        } else {
            "per day".to_string()
        }
    }
}

/// Builds histograms, labelling buckets in a fixed time zone.
#[derive(Debug, Clone, Copy)]
pub struct TimeBucketer {
    timezone: Tz,
}

impl TimeBucketer {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Bucket event timestamps relative to `now_ms`.
    ///
    /// Events before the aligned start land in the first bucket and events
    /// past the nominal end land in the last one, so every event is counted
    /// exactly once.
    pub fn bucket<I>(&self, timestamps: I, now_ms: i64) -> Result<Histogram, BucketError>
    where
        I: IntoIterator<Item = i64>,
    {
        let timestamps: Vec<i64> = timestamps.into_iter().collect();

        let start_ms = match timestamps.iter().min() {
            Some(&min) => min,
            None => now_ms.checked_sub(EMPTY_SPAN_MS).ok_or(BucketError::Overflow)?,
        };
        let span_ms = now_ms.checked_sub(start_ms).ok_or(BucketError::Overflow)?;
        let config = choose_bucket_config(span_ms);
        let width = config.bucket_size_ms;

        let aligned_start = start_ms.div_euclid(width) * width;
        let last = config.num_buckets as i64 - 1;

        let mut buckets = vec![0u64; config.num_buckets];
        for ts in &timestamps {
            let offset = ts.checked_sub(aligned_start).ok_or(BucketError::Overflow)?;
            let idx = offset.div_euclid(width).clamp(0, last);
            buckets[idx as usize] += 1;
        }

        let labels = (0..config.num_buckets as i64)
            .map(|i| {
                let bucket_start = i
                    .checked_mul(width)
                    .and_then(|o| aligned_start.checked_add(o))
                    .ok_or(BucketError::Overflow)?;
                self.label(bucket_start, width)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Histogram {
            bucket_size_ms: width,
            buckets,
            labels,
            aligned_start,
        })
    }

    /// Clock time for sub-day widths, calendar date otherwise.
    fn label(&self, bucket_start_ms: i64, width_ms: i64) -> Result<String, BucketError> {
        let utc: DateTime<Utc> = Utc
            .timestamp_millis_opt(bucket_start_ms)
            .single()
            .ok_or(BucketError::TimestampOutOfRange(bucket_start_ms))?;
        let local = utc.with_timezone(&self.timezone);

        Ok(if width_ms < DAY_MS {
            local.format("%H:%M").to_string()
        } else {
            local.format("%b %-d").to_string()
        })
    }
}

impl Default for TimeBucketer {
    fn default() -> Self {
        Self::new(Tz::UTC)
    }
}

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Index labelling a model's observations, extendable for forecasting.
///
/// Three kinds are supported: calendar dates (extended at the last observed
/// day spacing), plain integers (extended at the last observed integer step),
/// and sequential positions (always extended by one).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[non_exhaustive]
pub enum ObservationIndex {
    Date(Vec<NaiveDate>),
    Int(Vec<i64>),
    Sequential(Vec<i64>),
}

impl ObservationIndex {
    /// Sequential index `0..len`, the default when a model has no explicit
    /// observation labels.
    pub fn sequential(len: usize) -> Self {
        Self::Sequential((0..len as i64).collect())
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Date(v) => v.len(),
            Self::Int(v) | Self::Sequential(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Extend the index for an `h`-step forecast: drop the first `max_lag`
    /// entries, then append `h` new entries spaced like the last observed
    /// spacing of the truncated index.
    pub fn shift_dates(&self, h: usize, max_lag: usize) -> ObservationIndex {
        match self {
            Self::Date(v) => {
                let mut out: Vec<NaiveDate> = v.iter().skip(max_lag).copied().collect();
                for _ in 0..h {
                    let step = match out.len() {
                        0 => break,
                        1 => Duration::days(1),
                        n => out[n - 1] - out[n - 2],
                    };
                    out.push(out[out.len() - 1] + step);
                }
                Self::Date(out)
            }
            Self::Int(v) => {
                let mut out: Vec<i64> = v.iter().skip(max_lag).copied().collect();
                for _ in 0..h {
                    let step = match out.len() {
                        0 => break,
                        1 => 1,
                        n => out[n - 1] - out[n - 2],
                    };
                    out.push(out[out.len() - 1] + step);
                }
                Self::Int(out)
            }
            Self::Sequential(v) => {
                let mut out: Vec<i64> = v.iter().skip(max_lag).copied().collect();
                for _ in 0..h {
                    let last = out.last().copied().unwrap_or(-1);
                    out.push(last + 1);
                }
                Self::Sequential(out)
            }
        }
    }
}

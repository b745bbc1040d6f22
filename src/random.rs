//! Weighted random selection over listings.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::error::{Error, Result};
use crate::repo::lazy::LazyItem;

/// How items are weighted when picking one at random.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RandomMethod {
    /// Every item equally likely.
    Uniform,
    /// Proportional to bookmark count plus one.
    BookmarkProportion,
    /// Proportional to an increasing function of the item's age.
    TimedeltaProportion,
}

impl RandomMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uniform => "uniform",
            Self::BookmarkProportion => "bookmark_proportion",
            Self::TimedeltaProportion => "timedelta_proportion",
        }
    }
}

impl fmt::Display for RandomMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RandomMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "uniform" => Ok(Self::Uniform),
            "bookmark_proportion" => Ok(Self::BookmarkProportion),
            "timedelta_proportion" => Ok(Self::TimedeltaProportion),
            _ => Err(format!(
                "'{s}' is not one of uniform, bookmark_proportion, timedelta_proportion"
            )),
        }
    }
}

/// Maps an item's age to a selection weight.
///
/// Implementations must return a finite, non-negative weight that does not
/// decrease as age grows.
pub trait AgeCurve: Send + Sync + fmt::Debug {
    fn weight(&self, age: chrono::Duration) -> f64;
}

/// `1 + ln(1 + days)`: older items are favoured, with diminishing effect.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAgeCurve;

impl AgeCurve for LogAgeCurve {
    fn weight(&self, age: chrono::Duration) -> f64 {
        let days = (age.num_seconds() as f64 / 86_400.0).max(0.0);
        1.0 + days.ln_1p()
    }
}

/// Picks items from a listing according to a [`RandomMethod`].
#[derive(Debug, Clone)]
pub struct RandomSelector {
    curve: Arc<dyn AgeCurve>,
}

impl Default for RandomSelector {
    fn default() -> Self {
        Self::new(Arc::new(LogAgeCurve))
    }
}

impl RandomSelector {
    #[must_use]
    pub fn new(curve: Arc<dyn AgeCurve>) -> Self {
        Self { curve }
    }

    /// Weight of `item` under `method`, measured at `now`.
    ///
    /// An item without content weighs like one with no bookmarks created at
    /// `now`.
    #[must_use]
    pub fn weight(&self, item: &LazyItem, method: RandomMethod, now: DateTime<Utc>) -> f64 {
        match method {
            RandomMethod::Uniform => 1.0,
            RandomMethod::BookmarkProportion => {
                let bookmarks = item.loaded_content().map_or(0, |i| i.total_bookmarks);
                bookmarks as f64 + 1.0
            }
            RandomMethod::TimedeltaProportion => {
                let age = item
                    .loaded_content()
                    .map_or_else(chrono::Duration::zero, |i| {
                        now.signed_duration_since(i.create_date)
                    });
                self.curve.weight(age)
            }
        }
    }

    /// Draw one item. The input is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Empty`] when `items` is empty.
    pub fn select<'a, R: Rng + ?Sized>(
        &self,
        items: &'a [LazyItem],
        method: RandomMethod,
        rng: &mut R,
    ) -> Result<&'a LazyItem> {
        if items.is_empty() {
            return Err(Error::Empty);
        }
        if method == RandomMethod::Uniform {
            return Ok(&items[rng.gen_range(0..items.len())]);
        }

        let now = Utc::now();
        let weights: Vec<f64> = items
            .iter()
            .map(|item| self.weight(item, method, now))
            .collect();
        let total: f64 = weights.iter().sum();
        if !(total.is_finite() && total > 0.0) {
            return Ok(&items[rng.gen_range(0..items.len())]);
        }

        let target = rng.gen::<f64>() * total;
        let mut cumulative = 0.0;
        for (item, weight) in items.iter().zip(&weights) {
            cumulative += weight;
            if target < cumulative {
                return Ok(item);
            }
        }
        // Rounding can leave target at the very top of the range.
        Ok(&items[items.len() - 1])
    }

    /// Draw `count` items independently, with replacement.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Empty`] when `items` is empty.
    pub fn select_many<'a, R: Rng + ?Sized>(
        &self,
        items: &'a [LazyItem],
        method: RandomMethod,
        count: usize,
        rng: &mut R,
    ) -> Result<Vec<&'a LazyItem>> {
        (0..count)
            .map(|_| self.select(items, method, rng))
            .collect()
    }
}

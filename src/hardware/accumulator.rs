// Thread-safe running sum of relative pulse counts for one drive side
//
// Bus callbacks call `accumulate` on every counter message; the control loop
// calls `drain_average` once per tick. The lock is only held for the counter
// update itself.

use parking_lot::Mutex;

#[derive(Debug, Default)]
struct Tally {
    sum: i64,
    count: i32,
}

/// Averages asynchronously arriving pulse counts over one control tick
#[derive(Debug, Default)]
pub struct VelocityAccumulator {
    tally: Mutex<Tally>,
}

impl VelocityAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one pulse-count sample
    pub fn accumulate(&self, delta_count: i32) {
        let mut tally = self.tally.lock();
        tally.sum += i64::from(delta_count);
        tally.count += 1;
    }

    /// Take the average of every sample since the last drain and reset.
    ///
    /// Returns `None` when no samples arrived; callers hold their previous
    /// value in that case.
    pub fn drain_average(&self) -> Option<f64> {
        let Tally { sum, count } = std::mem::take(&mut *self.tally.lock());
        if count == 0 {
            None
        } else {
            Some(sum as f64 / f64::from(count))
        }
    }
}

//! Signal smoothing for RSSI and read-interval history
//!
//! RSSI arrives in tenths of a dBm. dBm is logarithmic, so samples are
//! averaged in the linear power domain (milliwatts) and converted back.

/// Smallest usable window: a challenging antenna needs this many samples
/// before its mean can displace the incumbent location
pub const MIN_SIGNAL_WINDOW: usize = 3;

/// Convert a dBm value to milliwatts
#[inline]
pub fn to_milliwatts(dbm: f64) -> f64 {
    10f64.powf(dbm / 10.0)
}

/// Convert milliwatts to dBm
#[inline]
pub fn to_dbm(mw: f64) -> f64 {
    10.0 * mw.log10()
}

/// Convert a raw RSSI reading (tenths of a dBm) to dBm
#[inline]
pub fn rssi_to_dbm(rssi_tenths: i32) -> f64 {
    f64::from(rssi_tenths) / 10.0
}

/// Fixed-window running-mean accumulator
///
/// Once full, each insert overwrites the oldest slot.
#[derive(Debug, Clone)]
pub struct CircularBuffer {
    values: Vec<f64>,
    counter: usize,
}

impl CircularBuffer {
    /// Create a buffer holding at most `window_size` samples (must be >= 1)
    pub fn new(window_size: usize) -> Self {
        debug_assert!(window_size >= 1, "window_size must be at least 1");
        Self { values: vec![0.0; window_size.max(1)], counter: 0 }
    }

    #[inline]
    pub fn add_value(&mut self, value: f64) {
        let window = self.values.len();
        self.values[self.counter % window] = value;
        self.counter += 1;
    }

    /// Number of effective samples: `min(counter, window_size)`
    #[inline]
    pub fn count(&self) -> usize {
        self.counter.min(self.values.len())
    }

    #[inline]
    pub fn window_size(&self) -> usize {
        self.values.len()
    }

    /// Arithmetic mean of the effective samples, 0.0 when empty
    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            return 0.0;
        }
        self.values[..count].iter().sum::<f64>() / count as f64
    }
}

/// Smoothed signal history for one tag at one antenna alias
#[derive(Debug, Clone)]
pub struct SignalStats {
    /// Epoch ms of the most recent read at this antenna
    pub last_read: u64,
    rssi_mw: CircularBuffer,
    intervals: CircularBuffer,
}

impl SignalStats {
    pub fn new(window_size: usize) -> Self {
        Self {
            last_read: 0,
            rssi_mw: CircularBuffer::new(window_size),
            intervals: CircularBuffer::new(window_size),
        }
    }

    /// Record a read: RSSI goes into the milliwatt buffer, and the gap since
    /// the previous read at this antenna (if any) into the interval buffer.
    pub fn update(&mut self, rssi_tenths: i32, timestamp: u64) {
        if self.rssi_mw.counter > 0 {
            let interval = timestamp.saturating_sub(self.last_read);
            self.intervals.add_value(interval as f64);
        }
        self.rssi_mw.add_value(to_milliwatts(rssi_to_dbm(rssi_tenths)));
        self.last_read = timestamp;
    }

    /// Number of RSSI samples currently in the window
    #[inline]
    pub fn sample_count(&self) -> usize {
        self.rssi_mw.count()
    }

    /// Mean RSSI in dBm, averaged in the power domain
    pub fn mean_dbm(&self) -> f64 {
        to_dbm(self.rssi_mw.mean())
    }

    /// Mean gap between reads at this antenna (ms), 0.0 before the second read
    pub fn mean_interval_ms(&self) -> f64 {
        self.intervals.mean()
    }

    #[inline]
    pub fn interval_count(&self) -> usize {
        self.intervals.count()
    }
}

use std::sync::atomic::{AtomicU64, Ordering};

#[repr(usize)]
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum Ticker {
    FlushWriteBytes = 0,
    MemtablePayloadBytesAtFlush,
    MemtableGarbageBytesAtFlush,
    TickerMax,
}

#[repr(usize)]
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum Histogram {
    FlushTimeMicros = 0,
    HistogramMax,
}

#[derive(Default)]
struct HistogramStat {
    count: AtomicU64,
    sum: AtomicU64,
    max: AtomicU64,
}

/// Process-wide counters shared by every job. All methods may be called
/// without any lock held.
pub struct Statistics {
    tickers: Vec<AtomicU64>,
    histograms: Vec<HistogramStat>,
}

impl Default for Statistics {
    fn default() -> Self {
        Self {
            tickers: (0..Ticker::TickerMax as usize)
                .map(|_| AtomicU64::new(0))
                .collect(),
            histograms: (0..Histogram::HistogramMax as usize)
                .map(|_| HistogramStat::default())
                .collect(),
        }
    }
}

impl Statistics {
    pub fn record_tick(&self, t: Ticker, value: u64) {
        self.tickers[t as usize].fetch_add(value, Ordering::Relaxed);
    }

    pub fn get_ticker(&self, t: Ticker) -> u64 {
        self.tickers[t as usize].load(Ordering::Relaxed)
    }

    pub fn record_time(&self, h: Histogram, micros: u64) {
        let stat = &self.histograms[h as usize];
        stat.count.fetch_add(1, Ordering::Relaxed);
        stat.sum.fetch_add(micros, Ordering::Relaxed);
        stat.max.fetch_max(micros, Ordering::Relaxed);
    }

    /// (count, sum, max) of the recorded times.
    pub fn get_histogram(&self, h: Histogram) -> (u64, u64, u64) {
        let stat = &self.histograms[h as usize];
        (
            stat.count.load(Ordering::Relaxed),
            stat.sum.load(Ordering::Relaxed),
            stat.max.load(Ordering::Relaxed),
        )
    }
}

// IO counters are process-wide; jobs snapshot deltas around their I/O phase
// instead of reading absolute values.
static IO_BYTES_WRITTEN: AtomicU64 = AtomicU64::new(0);
static IO_WRITE_NANOS: AtomicU64 = AtomicU64::new(0);
static IO_FSYNC_NANOS: AtomicU64 = AtomicU64::new(0);

#[derive(Default, Clone, Copy, Debug, Eq, PartialEq)]
pub struct IoStatsSnapshot {
    pub bytes_written: u64,
    pub write_nanos: u64,
    pub fsync_nanos: u64,
}

pub fn io_stats_snapshot() -> IoStatsSnapshot {
    IoStatsSnapshot {
        bytes_written: IO_BYTES_WRITTEN.load(Ordering::Relaxed),
        write_nanos: IO_WRITE_NANOS.load(Ordering::Relaxed),
        fsync_nanos: IO_FSYNC_NANOS.load(Ordering::Relaxed),
    }
}

pub fn io_stats_delta(before: &IoStatsSnapshot) -> IoStatsSnapshot {
    let now = io_stats_snapshot();
    IoStatsSnapshot {
        bytes_written: now.bytes_written - before.bytes_written,
        write_nanos: now.write_nanos - before.write_nanos,
        fsync_nanos: now.fsync_nanos - before.fsync_nanos,
    }
}

pub fn io_stats_add_bytes_written(n: u64) {
    IO_BYTES_WRITTEN.fetch_add(n, Ordering::Relaxed);
}

pub fn io_stats_add_write_nanos(n: u64) {
    IO_WRITE_NANOS.fetch_add(n, Ordering::Relaxed);
}

pub fn io_stats_add_fsync_nanos(n: u64) {
    IO_FSYNC_NANOS.fetch_add(n, Ordering::Relaxed);
}

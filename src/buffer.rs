//! Bounded series buffer shared by the ingestion task and the refresh cycle
//!
//! Every tick appends one slot to the shared timestamp series and to every
//! symbol's price series inside a single critical section. The symbol that
//! ticked gets `Some(price)`, the others get `None`, so all sequences stay
//! index-aligned and equally long at every observation point.

use crate::{
    data::{SymbolId, Tick},
    error::ConfigError,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Default number of slots retained per series
pub const DEFAULT_CAPACITY: usize = 300;

/// Fixed-capacity, arrival-ordered series with FIFO eviction
#[derive(Debug)]
pub struct SeriesBuffer {
    capacity: usize,
    timestamps: VecDeque<DateTime<Utc>>,
    prices: [VecDeque<Option<f64>>; 2],
    total_appended: u64,
    evicted: u64,
}

impl SeriesBuffer {
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::invalid("buffer_capacity", "must be greater than 0"));
        }

        Ok(Self {
            capacity,
            timestamps: VecDeque::with_capacity(capacity),
            prices: [
                VecDeque::with_capacity(capacity),
                VecDeque::with_capacity(capacity),
            ],
            total_appended: 0,
            evicted: 0,
        })
    }

    /// Append a tick, evicting the oldest slot when full
    pub fn append(&mut self, tick: Tick) {
        if self.timestamps.len() == self.capacity {
            self.timestamps.pop_front();
            for series in self.prices.iter_mut() {
                series.pop_front();
            }
            self.evicted += 1;
        }

        self.timestamps.push_back(tick.timestamp);
        for id in SymbolId::ALL {
            let value = (id == tick.symbol).then_some(tick.price);
            self.prices[id.index()].push_back(value);
        }
        self.total_appended += 1;
    }

    /// Ordered copy of the current contents
    pub fn snapshot(&self) -> SeriesSnapshot {
        SeriesSnapshot {
            timestamps: self.timestamps.iter().copied().collect(),
            prices: [
                self.prices[0].iter().copied().collect(),
                self.prices[1].iter().copied().collect(),
            ],
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            len: self.len(),
            capacity: self.capacity,
            total_appended: self.total_appended,
            evicted: self.evicted,
        }
    }
}

/// Counters describing buffer usage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferStats {
    pub len: usize,
    pub capacity: usize,
    pub total_appended: u64,
    pub evicted: u64,
}

/// Cloneable handle to the process-wide buffer.
///
/// Appends and snapshots each take the same lock once, so a snapshot never
/// observes a half-applied tick.
#[derive(Debug, Clone)]
pub struct SeriesHandle {
    inner: Arc<Mutex<SeriesBuffer>>,
}

impl SeriesHandle {
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        Ok(Self {
            inner: Arc::new(Mutex::new(SeriesBuffer::new(capacity)?)),
        })
    }

    pub fn append(&self, tick: Tick) {
        self.inner.lock().append(tick);
    }

    pub fn snapshot(&self) -> SeriesSnapshot {
        self.inner.lock().snapshot()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity()
    }

    pub fn stats(&self) -> BufferStats {
        self.inner.lock().stats()
    }
}

/// Immutable copy of the buffer taken at one instant
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesSnapshot {
    timestamps: Vec<DateTime<Utc>>,
    prices: [Vec<Option<f64>>; 2],
}

impl SeriesSnapshot {
    /// Build a snapshot as if `ticks` had been appended to an unbounded buffer
    pub fn from_ticks(ticks: &[Tick]) -> Self {
        let mut snapshot = Self::default();
        for tick in ticks {
            snapshot.timestamps.push(tick.timestamp);
            for id in SymbolId::ALL {
                let value = (id == tick.symbol).then_some(tick.price);
                snapshot.prices[id.index()].push(value);
            }
        }
        snapshot
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn prices(&self, symbol: SymbolId) -> &[Option<f64>] {
        &self.prices[symbol.index()]
    }

    /// Observed `(timestamp, price)` pairs for one symbol, in arrival order
    pub fn observations(&self, symbol: SymbolId) -> impl Iterator<Item = (DateTime<Utc>, f64)> + '_ {
        self.timestamps
            .iter()
            .zip(self.prices(symbol))
            .filter_map(|(ts, price)| price.map(|p| (*ts, p)))
    }
}

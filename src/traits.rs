//! Abstractions over the fitted models to enable testing.
//!
//! The orchestrator only needs a per-sqm price from whichever model it
//! selects; putting a trait at that seam lets tests verify the rejection
//! paths with a counting stub instead of a trained pipeline.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::ml::features::PropertyRecord;
use crate::ml::model::FittedPipeline;

/// Trait for anything that can price a property per square meter.
pub trait SqmPricer {
    /// Raw (pre-adjustment) per-sqm price for one record.
    fn price_per_sqm(&self, record: &PropertyRecord) -> f64;
}

impl SqmPricer for FittedPipeline {
    fn price_per_sqm(&self, record: &PropertyRecord) -> f64 {
        self.predict_one(record)
    }
}

impl<T: SqmPricer + ?Sized> SqmPricer for &T {
    fn price_per_sqm(&self, record: &PropertyRecord) -> f64 {
        (**self).price_per_sqm(record)
    }
}

/// Mock pricer returning a fixed value and counting invocations.
#[derive(Debug, Default)]
pub struct MockPricer {
    value: f64,
    calls: AtomicUsize,
}

impl MockPricer {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            calls: AtomicUsize::new(0),
        }
    }

    /// How many times the model was consulted.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SqmPricer for MockPricer {
    fn price_per_sqm(&self, _record: &PropertyRecord) -> f64 {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.value
    }
}

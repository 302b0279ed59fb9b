//! Keyed tumbling/sliding window slice stores (§4.5): the partial-aggregate
//! algebra operators declare, the per-key ordered [`SliceStore`] each worker
//! thread owns, and the watermark-driven [`WindowOperator`] that ties the two
//! together with slice assignment for tumbling and sliding windows.

mod aggregate;
mod combiner;
mod definition;
mod error;
mod keyed_store;
mod operator;
mod slice_store;

pub use aggregate::{AvgAggregator, CountAggregator, MaxAggregator, MinAggregator, SumAggregator};
pub use combiner::PartialAggregateCombiner;
pub use definition::WindowDefinition;
pub use error::WindowError;
pub use keyed_store::KeyedSliceStore;
pub use operator::{PartialWindowResult, WindowOperator, WindowResult};
pub use slice_store::SliceStore;

/// The partial aggregate algebra a window operator is built over (§4.5):
/// an identity element, a per-record lift, and an associative, commutative
/// combine. `Partial` must be cheap to clone since it lives in a
/// [`SliceStore`]'s parallel vector and is folded repeatedly on window close.
pub trait Aggregator: Send + Sync + 'static {
    type Partial: Clone + Send + Sync;

    fn identity(&self) -> Self::Partial;

    fn lift(&self, record: &tidal_types::Record) -> Self::Partial;

    fn combine(&self, a: &Self::Partial, b: &Self::Partial) -> Self::Partial;

    fn finalize(&self, partial: &Self::Partial) -> tidal_types::Value;
}

//! Velocity cube assembly.
//!
//! Turns a list of ITS_LIVE image-pair granules into one append-only
//! `mid_date × y × x` cube:
//!
//! ```text
//! GranuleSearch ──► GranuleIndex (dedupe) ──► BatchScheduler
//!                                                 │  LayerFetcher × workers
//!                                                 │  (decode + SpatialFilter)
//!                                                 ▼
//!                     CubeStore ◄── BatchTable ◄── CubeAccumulator
//! ```
//!
//! Batches run one after another; only one batch of layers is held in memory
//! at a time.

pub mod accumulator;
pub mod builder;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod granule_index;
pub mod grid;
pub mod layer;
pub mod report;
pub mod scheduler;
pub mod schema;
pub mod search;
pub mod skip;
pub mod spatial_filter;

pub use accumulator::{CubeAccumulator, CubeState};
pub use builder::CubeBuilder;
pub use config::CubeConfig;
pub use error::{CubeError, Result};
pub use fetcher::{GranuleLayerFetcher, LayerFetcher, LayerOutcome};
pub use granule_index::{GranuleIndex, GranuleRef, ResolvedGranules};
pub use grid::{CubeGrid, Placement};
pub use layer::Layer;
pub use report::RunSummary;
pub use scheduler::{Batch, BatchScheduler};
pub use search::{GranuleSearch, ItsLiveSearchClient, LocalDirectorySource, SearchConfig, SearchQuery};
pub use skip::{SkipReason, SkipRegistry};
pub use spatial_filter::{Filtered, Rejected, SpatialFilter};

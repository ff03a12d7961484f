//! Data point records and the directory store they are loaded from

pub mod store;
pub mod types;

pub use store::{validate_shape, DataPointStore, LoadedRecord};
pub use types::{DataPoint, ShapePolicy, TestSet};

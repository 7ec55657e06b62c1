pub mod background;
pub mod data;
pub mod errors;
pub mod explanation;
pub mod schema;

pub use background::BackgroundSet;
pub use data::*; // Re-export common data types
pub use errors::*;
pub use explanation::{FeatureImportance, FeatureImportanceRecord, FeatureScore};
pub use schema::{ActiveFeatures, FeatureDescriptor, FeatureKind, FeatureSchema, FeatureValue};

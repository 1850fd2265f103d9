//! @ai:module:intent Benchmark catalog model and manifest loading
//! @ai:module:layer domain
//! @ai:module:public_api Suite, Domain, Benchmark, ConfigEntry, ConfigValue, Reference, ManifestLoader

pub mod loader;
pub mod model;

pub use loader::{ManifestLoader, ManifestLoaderTrait};
pub use model::{
    Benchmark, ConfigEntry, ConfigValue, Constants, Domain, Reference, ReferenceSource, Spec,
    Suite, TestCase,
};

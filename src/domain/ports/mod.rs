mod clock;
mod registry_store;

pub use clock::Clock;
pub use registry_store::{RegistryStore, StoreError};

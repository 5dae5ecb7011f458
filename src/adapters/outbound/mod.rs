mod json_file_registry_store;
mod memory_registry_store;

pub use json_file_registry_store::JsonFileRegistryStore;
pub use memory_registry_store::InMemoryRegistryStore;

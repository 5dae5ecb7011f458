//! Domain Layer
//!
//! Gateway entities, value objects and the outbound ports the
//! infrastructure implements.

pub mod entities;
pub mod ports;
pub mod value_objects;

pub use entities::{RegistrySnapshot, ServiceAddress, ServiceRegistration};
pub use value_objects::{CallOutcome, RouteTable, SourceStatus};

//! Vitrine Core - Entity Types
//!
//! Records, snapshots, identifiers, settings and the error taxonomy shared by
//! the storage and engine crates. No tree or cache behavior lives here.

mod config;
mod entities;
mod enums;
mod error;
mod identity;
mod metadata;
mod snapshot;

pub use config::*;
pub use entities::*;
pub use enums::*;
pub use error::*;
pub use identity::*;
pub use metadata::*;
pub use snapshot::*;

//! Entity mapping: metadata resolution, value conversion, association
//! loading and row-to-entity construction.

pub(crate) mod association;
pub(crate) mod builder;
pub mod converter;
pub mod resolver;

pub use converter::{ConverterRegistry, TypeConverter};
pub use resolver::{EntityMapping, metadata_of, resolve};

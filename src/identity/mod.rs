//! Hierarchical identifiers
//!
//! Every key in the mesh (WUPs, functions, units of work, parcels, nodes)
//! is an [`Identifier`]: an ordered list of `name=value` components rendered
//! as a dotted qualified string, e.g.
//!
//! ```text
//! deployment=mesh.site=site-a.pod=pod-7.node=parcel-node
//! ```
//!
//! The qualified form is lossless: separators appearing inside values are
//! percent-escaped, so `Identifier::parse(&id.render())` always yields `id`.

mod identifier;

pub use identifier::{Component, Identifier, COMPONENT_SEPARATOR, NAME_VALUE_SEPARATOR};

//! Relationship compilation and network resolution.
//!
//! Arcs are stored as fragments; this module turns them into flattened [Relationship] records
//! and resolves which relationship wins when several assert the same thing.
//!
//! ## Equivalence and the active relationship
//!
//! Two relationships are equivalent when they share an [EquivalenceKey]: source index, target
//! index, link role, arcrole and the arc's [semantic_key]. Within an [EquivalentRelationships]
//! group:
//!
//! 1. The member with the highest `priority` wins. Among equal priorities the earliest inserted
//!    member wins, so loaders must insert in document, then arc, then endpoint pair order.
//! 2. If the winner has `use="prohibited"` the group has no active relationship.
//!
//! A [Network] holds the groups for one (link role, arcrole) pair and orders active
//! relationships by `order`. [Networks] indexes networks by arcrole then link role.
//! [RelationshipStorer] materializes relationships in the store and sweeps losers.

mod collection;
mod network;
mod relationship;
mod storer;

pub use collection::Networks;
pub use network::{EquivalentRelationships, Network};
pub use relationship::{
    semantic_key, Endpoint, EquivalenceKey, Relationship, RelationshipCompiler,
};
pub use storer::{RelationshipStorer, StoreReport};

//! Core graph data structures

mod edge;
mod entity;

pub use edge::{GraphEdge, RelationshipType, UnknownRelationshipType};
pub use entity::Entity;

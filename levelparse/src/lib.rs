//! Rebuilds level scenes (collision, visual geometry and object placement) from the
//! C sources a decompiled project generates for its levels.

pub mod collision;
mod error;
pub mod geo_layout;
pub mod level;
pub mod macro_objects;
pub mod model;
pub mod objects;
pub mod scene;
pub mod source;
pub mod special_objects;

pub use collision::{CollisionMesh, CollisionTriangle, Vertex3i};
pub use error::ExtractError;
pub use geo_layout::{GeoLayout, TransformNode};
pub use level::{LevelCategory, LevelMetadata, ProjectLayout};
pub use model::{ModelTriangle, ModelVertex, SubMesh, VisualMesh};
pub use objects::PlacedObject;
pub use scene::{AreaScene, compose_area, compose_level};

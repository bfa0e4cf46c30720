use itertools::Itertools;
use serde::{Deserialize, Serialize};
use shared::{find_calls, parse_uint_literal, units::parse_i32_literal};
use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};

use crate::{
    ExtractError,
    source::{field, read_source, sorted_subdirs},
};

pub const DEFAULT_SURFACE: &str = "SURFACE_DEFAULT";
pub const COLLISION_FILE: &str = "collision.inc.c";

const COL_VERTEX: &str = "COL_VERTEX";
const COL_TRI_INIT: &str = "COL_TRI_INIT";
const COL_TRI: &str = "COL_TRI";
const COL_TRI_SPECIAL: &str = "COL_TRI_SPECIAL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vertex3i {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Vertex3i {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for Vertex3i {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollisionTriangle {
    pub indices: [u32; 3],
    pub surface: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollisionMesh {
    pub area_name: String,
    pub level_name: String,
    pub vertices: Vec<Vertex3i>,
    pub triangles: Vec<CollisionTriangle>,
}

impl CollisionMesh {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }
}

impl fmt::Display for CollisionMesh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {}: {} vertices, {} triangles",
            self.level_name,
            self.area_name,
            self.vertex_count(),
            self.triangle_count()
        )
    }
}

/// A `COL_TRI_INIT` header: the next `count` triangles use `surface`.
struct SurfaceRun<'a> {
    surface: &'a str,
    count: u32,
}

pub fn parse_collision(
    text: &str,
    area_name: &str,
    level_name: &str,
) -> Result<CollisionMesh, ExtractError> {
    let mut vertices = Vec::new();
    for call in find_calls(text, COL_VERTEX) {
        let (Some(x), Some(y), Some(z)) = (
            field("collision vertex", call.arg(0), parse_i32_literal)?,
            field("collision vertex", call.arg(1), parse_i32_literal)?,
            field("collision vertex", call.arg(2), parse_i32_literal)?,
        ) else {
            continue;
        };
        if call.args.len() == 3 {
            vertices.push(Vertex3i::new(x, y, z));
        }
    }

    let mut runs = Vec::new();
    for call in find_calls(text, COL_TRI_INIT).filter(|call| call.args.len() == 2) {
        let Some(count) = field("surface run", call.arg(1), parse_uint_literal)? else {
            continue;
        };
        runs.push(SurfaceRun {
            surface: call.arg(0).unwrap_or(DEFAULT_SURFACE),
            count,
        });
    }

    let tri_calls = find_calls(text, COL_TRI)
        .filter(|call| call.args.len() == 3)
        .merge_by(
            find_calls(text, COL_TRI_SPECIAL).filter(|call| call.args.len() == 4),
            |a, b| a.offset < b.offset,
        );

    let mut run_index = 0;
    let mut consumed = 0;
    let mut triangles = Vec::new();
    for call in tri_calls {
        let (Some(a), Some(b), Some(c)) = (
            field("collision triangle", call.arg(0), parse_uint_literal)?,
            field("collision triangle", call.arg(1), parse_uint_literal)?,
            field("collision triangle", call.arg(2), parse_uint_literal)?,
        ) else {
            continue;
        };

        // runs switch purely by count, never by where the header sits in the text
        while run_index + 1 < runs.len() && consumed >= runs[run_index].count {
            run_index += 1;
            consumed = 0;
        }
        consumed += 1;

        let surface = runs
            .get(run_index)
            .map(|run| run.surface)
            .unwrap_or(DEFAULT_SURFACE);

        if [a, b, c].iter().any(|index| *index as usize >= vertices.len()) {
            log::warn!(
                "dropping collision triangle ({a}, {b}, {c}) in {area_name}: only {} vertices",
                vertices.len()
            );
            continue;
        }

        triangles.push(CollisionTriangle {
            indices: [a, b, c],
            surface: surface.to_owned(),
        });
    }

    Ok(CollisionMesh {
        area_name: area_name.to_owned(),
        level_name: level_name.to_owned(),
        vertices,
        triangles,
    })
}

/// Parses a collision file, failures are logged and give no mesh.
pub fn load_collision(path: &Path, area_name: &str, level_name: &str) -> Option<CollisionMesh> {
    let mesh = read_source(path)
        .and_then(|text| parse_collision(&text, area_name, level_name))
        .inspect_err(|err| log::warn!("failed parsing collision {}: {err}", path.display()))
        .ok()?;

    log::info!("parsed collision: {mesh}");
    Some(mesh)
}

/// Maps `Area <n>` to `areas/<n>/collision.inc.c` for every area that has one.
pub fn find_collision_files(level_dir: &Path) -> BTreeMap<String, PathBuf> {
    sorted_subdirs(&level_dir.join("areas"))
        .into_iter()
        .filter_map(|area_dir| {
            let file = area_dir.join(COLLISION_FILE);
            let number = area_dir.file_name()?.to_string_lossy().into_owned();
            file.is_file().then(|| (format!("Area {number}"), file))
        })
        .collect()
}

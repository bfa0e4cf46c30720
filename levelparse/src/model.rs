use bevy::math::{Mat4, Vec3};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use shared::{
    find_array_decls, find_calls,
    macros::top_level_groups,
    parse_int_literal, parse_uint_literal,
    units::{LiteralError, parse_i32_literal},
};
use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    path::{Path, PathBuf},
};

use crate::{
    ExtractError,
    collision::Vertex3i,
    source::{field, read_source, sorted_subdirs},
};

pub const MODEL_FILE: &str = "model.inc.c";

const VERTEX_TYPE: &str = "Vtx";
const DISPLAY_LIST_TYPE: &str = "Gfx";
const SP_VERTEX: &str = "gsSPVertex";
const SP_2_TRIANGLES: &str = "gsSP2Triangles";
const SP_1_TRIANGLE: &str = "gsSP1Triangle";
const DP_SET_TEXTURE_IMAGE: &str = "gsDPSetTextureImage";
const DP_LOAD_TEXTURE_BLOCK: &str = "gsDPLoadTextureBlock";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModelVertex {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub s: i32,
    pub t: i32,
    /// signed bytes stored raw
    pub normal: [u8; 3],
    pub alpha: u8,
}

impl ModelVertex {
    pub fn position(&self) -> Vertex3i {
        Vertex3i::new(self.x, self.y, self.z)
    }

    pub fn normalized_normal(&self) -> Vec3 {
        let [x, y, z] = self.normal.map(|byte| byte as i8 as f32 / 127.0);
        Vec3::new(x, y, z)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelTriangle {
    pub indices: [u32; 3],
    pub texture: Option<String>,
}

impl ModelTriangle {
    pub fn offset_by(&self, offset: u32) -> Self {
        Self {
            indices: self.indices.map(|index| index + offset),
            texture: self.texture.clone(),
        }
    }
}

/// One sub-area model, kept apart so a viewer can toggle it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubMesh {
    pub source_file: PathBuf,
    pub ordinal: u32,
    pub vertices: Vec<ModelVertex>,
    /// indices into this sub mesh's own `vertices`
    pub triangles: Vec<ModelTriangle>,
    pub visible: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisualMesh {
    pub area_name: String,
    pub level_name: String,
    pub vertices: Vec<ModelVertex>,
    pub triangles: Vec<ModelTriangle>,
    pub sub_meshes: Vec<SubMesh>,
    pub main_display_list_name: Option<String>,
    pub display_list_names: Vec<String>,
}

impl VisualMesh {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn sub_mesh_mut(&mut self, ordinal: u32) -> Option<&mut SubMesh> {
        self.sub_meshes
            .iter_mut()
            .find(|sub_mesh| sub_mesh.ordinal == ordinal)
    }

    fn record_display_list(&mut self, name: &str) {
        if self.main_display_list_name.is_none() {
            self.main_display_list_name = Some(name.to_owned());
        }
        if !self.display_list_names.iter().any(|known| known == name) {
            self.display_list_names.push(name.to_owned());
        }
    }
}

impl fmt::Display for VisualMesh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} ({} vertices, {} triangles)",
            self.level_name,
            self.area_name,
            self.vertex_count(),
            self.triangle_count()
        )
    }
}

/// Transforms positions in place, truncating back to integer units.
pub fn apply_transform(vertices: &mut [ModelVertex], transform: &Mat4) {
    for vertex in vertices.iter_mut() {
        let moved = transform.transform_point3(Vec3::new(
            vertex.x as f32,
            vertex.y as f32,
            vertex.z as f32,
        ));
        vertex.x = moved.x as i32;
        vertex.y = moved.y as i32;
        vertex.z = moved.z as i32;
    }
}

fn byte_literal(literal: &str) -> Result<u8, LiteralError> {
    let value = parse_int_literal(literal)?;
    u8::try_from(value).map_err(|_| LiteralError::OutOfRange(literal.trim().to_owned()))
}

/// `{{{x, y, z}, flag, {s, t}, {nx, ny, nz, a}}}` with the outer braces already stripped
fn parse_vertex_record(record: &str) -> Result<Option<ModelVertex>, ExtractError> {
    let tokens = record
        .split(|c: char| c == '{' || c == '}' || c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .collect::<Vec<_>>();
    let &[x, y, z, flag, s, t, nx, ny, nz, alpha] = tokens.as_slice() else {
        return Ok(None);
    };

    const KIND: &str = "vertex record";
    if field(KIND, Some(flag), parse_int_literal)?.is_none() {
        return Ok(None);
    }
    let (Some(x), Some(y), Some(z), Some(s), Some(t)) = (
        field(KIND, Some(x), parse_i32_literal)?,
        field(KIND, Some(y), parse_i32_literal)?,
        field(KIND, Some(z), parse_i32_literal)?,
        field(KIND, Some(s), parse_i32_literal)?,
        field(KIND, Some(t), parse_i32_literal)?,
    ) else {
        return Ok(None);
    };
    let (Some(nx), Some(ny), Some(nz), Some(alpha)) = (
        field(KIND, Some(nx), byte_literal)?,
        field(KIND, Some(ny), byte_literal)?,
        field(KIND, Some(nz), byte_literal)?,
        field(KIND, Some(alpha), byte_literal)?,
    ) else {
        return Ok(None);
    };

    Ok(Some(ModelVertex {
        x,
        y,
        z,
        s,
        t,
        normal: [nx, ny, nz],
        alpha,
    }))
}

/// Every non empty `static const Vtx name[]` array keyed by name.
pub fn parse_vertex_buffers(text: &str) -> Result<HashMap<String, Vec<ModelVertex>>, ExtractError> {
    let mut buffers = HashMap::new();
    for decl in find_array_decls(text, VERTEX_TYPE, true) {
        let mut vertices = Vec::new();
        for record in top_level_groups(decl.body) {
            if let Some(vertex) = parse_vertex_record(record)? {
                vertices.push(vertex);
            }
        }

        if !vertices.is_empty() {
            log::debug!("  {}: {} vertices", decl.name, vertices.len());
            buffers.insert(decl.name.to_owned(), vertices);
        }
    }
    Ok(buffers)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command<'a> {
    Load { buffer: &'a str, count: usize },
    Triangles(Vec<[u32; 3]>),
    Texture(&'a str),
}

fn triangle_at(
    call: &shared::MacroCall,
    start: usize,
) -> Result<Option<[u32; 3]>, ExtractError> {
    let (Some(a), Some(b), Some(c)) = (
        field("display list triangle", call.arg(start), parse_uint_literal)?,
        field("display list triangle", call.arg(start + 1), parse_uint_literal)?,
        field("display list triangle", call.arg(start + 2), parse_uint_literal)?,
    ) else {
        return Ok(None);
    };
    Ok(Some([a, b, c]))
}

/// All recognized commands of one display list body ordered by position.
fn display_list_commands(body: &str) -> Result<Vec<Command<'_>>, ExtractError> {
    let mut commands = Vec::new();

    for call in find_calls(body, SP_VERTEX).filter(|call| call.args.len() == 3) {
        let (Some(buffer), Some(count), Some(_dest)) = (
            call.arg(0),
            field("vertex load", call.arg(1), parse_uint_literal)?,
            field("vertex load", call.arg(2), parse_uint_literal)?,
        ) else {
            continue;
        };
        commands.push((
            call.offset,
            Command::Load {
                buffer,
                count: count as usize,
            },
        ));
    }

    for call in find_calls(body, SP_2_TRIANGLES).filter(|call| call.args.len() == 8) {
        if let (Some(first), Some(second)) = (triangle_at(&call, 0)?, triangle_at(&call, 4)?) {
            commands.push((call.offset, Command::Triangles(vec![first, second])));
        }
    }

    for call in find_calls(body, SP_1_TRIANGLE).filter(|call| call.args.len() == 4) {
        if let Some(triangle) = triangle_at(&call, 0)? {
            commands.push((call.offset, Command::Triangles(vec![triangle])));
        }
    }

    for call in find_calls(body, DP_SET_TEXTURE_IMAGE).filter(|call| call.args.len() == 4) {
        if let Some(texture) = call.arg(3) {
            commands.push((call.offset, Command::Texture(texture)));
        }
    }

    for call in find_calls(body, DP_LOAD_TEXTURE_BLOCK) {
        if let Some(texture) = call.arg(0) {
            commands.push((call.offset, Command::Texture(texture)));
        }
    }

    Ok(commands
        .into_iter()
        .sorted_by_key(|(offset, _)| *offset)
        .map(|(_, command)| command)
        .collect())
}

/// Replays one display list, appending loaded vertices and resolved triangles to `mesh`.
fn replay_display_list(
    commands: Vec<Command>,
    buffers: &HashMap<String, Vec<ModelVertex>>,
    mesh: &mut VisualMesh,
) {
    // vertex count of the mesh right before the active load
    let mut base = None::<u32>;
    let mut texture = None::<&str>;

    for command in commands {
        match command {
            Command::Load { buffer, count } => match buffers.get(buffer) {
                Some(vertices) => {
                    base = Some(mesh.vertices.len() as u32);
                    // every load appends, reloading a buffer duplicates its vertices
                    mesh.vertices.extend(vertices.iter().take(count));
                }
                None => {
                    log::warn!("display list loads unknown vertex buffer {buffer}");
                    base = None;
                }
            },
            Command::Triangles(triangles) => {
                let Some(base) = base else {
                    continue;
                };
                for local in triangles {
                    let [Some(a), Some(b), Some(c)] = local.map(|index| base.checked_add(index))
                    else {
                        log::warn!("dropping triangle {local:?}: past the loaded vertices");
                        continue;
                    };
                    let indices = [a, b, c];
                    if indices
                        .iter()
                        .any(|index| *index as usize >= mesh.vertices.len())
                    {
                        log::warn!("dropping triangle {local:?}: past the loaded vertices");
                        continue;
                    }
                    mesh.triangles.push(ModelTriangle {
                        indices,
                        texture: texture.map(str::to_owned),
                    });
                }
            }
            Command::Texture(name) => texture = Some(name),
        }
    }
}

pub fn parse_model(
    text: &str,
    area_name: &str,
    level_name: &str,
) -> Result<VisualMesh, ExtractError> {
    let buffers = parse_vertex_buffers(text)?;
    log::debug!("found {} vertex arrays", buffers.len());

    let mut mesh = VisualMesh {
        area_name: area_name.to_owned(),
        level_name: level_name.to_owned(),
        ..VisualMesh::default()
    };

    for decl in find_array_decls(text, DISPLAY_LIST_TYPE, false) {
        mesh.record_display_list(decl.name);
        replay_display_list(display_list_commands(decl.body)?, &buffers, &mut mesh);
    }

    Ok(mesh)
}

pub fn load_model(path: &Path, area_name: &str, level_name: &str) -> Option<VisualMesh> {
    let mesh = read_source(path)
        .and_then(|text| parse_model(&text, area_name, level_name))
        .inspect_err(|err| log::warn!("failed parsing model {}: {err}", path.display()))
        .ok()?;

    log::info!("parsed visual mesh: {mesh}");
    Some(mesh)
}

/// Sorted `<sub>/model.inc.c` files of one area directory.
pub fn model_files_in(area_dir: &Path) -> Vec<PathBuf> {
    sorted_subdirs(area_dir)
        .into_iter()
        .map(|sub_dir| sub_dir.join(MODEL_FILE))
        .filter(|file| file.is_file())
        .collect()
}

/// Maps `Area <n>` to its sub-area model files (`areas/<n>/<sub>/model.inc.c`).
pub fn find_model_files(level_dir: &Path) -> BTreeMap<String, Vec<PathBuf>> {
    sorted_subdirs(&level_dir.join("areas"))
        .into_iter()
        .filter_map(|area_dir| {
            let number = area_dir.file_name()?.to_string_lossy().into_owned();
            let files = model_files_in(&area_dir);
            if files.is_empty() {
                return None;
            }
            log::info!("found {} model file(s) for Area {number}", files.len());
            Some((format!("Area {number}"), files))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MODEL: &str = r#"
// 0x07002000 - 0x07002030
static const Vtx bob_seg7_vertex_07002000[] = {
    {{{  -100,      0,   -100}, 0, {     0,      0}, {0x00, 0x7f, 0x00, 0xff}}},
    {{{   100,      0,   -100}, 0, {   990,      0}, {0x00, 0x7f, 0x00, 0xff}}},
    {{{   100,      0,    100}, 0, {   990,    990}, {0x81, 0x00, 0x7f, 0x80}}},
};

static const Vtx bob_seg7_vertex_07002030[] = {
    {{{     0,    200,      0}, 0, {     0,      0}, {0x00, 0x7f, 0x00, 0xff}}},
    {{{    50,    200,      0}, 0, {     0,      0}, {0x00, 0x7f, 0x00, 0xff}}},
    {{{     0,    200,     50}, 0, {     0,      0}, {0x00, 0x7f, 0x00, 0xff}}},
    {{{    50,    200,     50}, 0, {     0,      0}, {0x00, 0x7f, 0x00, 0xff}}},
};

static const Gfx bob_seg7_dl_07002100[] = {
    gsSP1Triangle( 0,  1,  2, 0x0),
    gsDPSetTextureImage(G_IM_FMT_RGBA, G_IM_SIZ_16b, 1, bob_seg7_texture_grass),
    gsSPVertex(bob_seg7_vertex_07002000, 3, 0),
    gsSP1Triangle( 0,  1,  2, 0x0),
    gsSPVertex(bob_seg7_vertex_07002000, 3, 0),
    gsSP1Triangle( 0,  1,  2, 0x0),
    gsSPEndDisplayList(),
};

const Gfx bob_seg7_dl_07002200[] = {
    gsSPDisplayList(bob_seg7_dl_07002100),
    gsSPVertex(bob_seg7_vertex_07002030, 4, 0),
    gsSP2Triangles( 0,  1,  2, 0x0,  1,  3,  2, 0x0),
    gsSPEndDisplayList(),
};
"#;

    #[test]
    fn test_vertex_buffers() {
        let buffers = parse_vertex_buffers(MODEL).unwrap();
        assert_eq!(buffers.len(), 2);
        let first = &buffers["bob_seg7_vertex_07002000"];
        assert_eq!(first.len(), 3);
        assert_eq!(first[1].x, 100);
        assert_eq!(first[1].s, 990);
        assert_eq!(first[2].normal, [0x81, 0x00, 0x7f]);
        assert_eq!(first[2].alpha, 0x80);
    }

    #[test]
    fn test_normals_are_signed() {
        let buffers = parse_vertex_buffers(MODEL).unwrap();
        let normal = buffers["bob_seg7_vertex_07002000"][2].normalized_normal();
        assert!((normal.x + 1.0).abs() < 1e-6);
        assert!(normal.y.abs() < 1e-6);
        assert!((normal.z - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_reloading_duplicates_vertices() {
        let mesh = parse_model(MODEL, "Area 1", "Bob").unwrap();
        // 3 + 3 from the two loads of the first buffer, 4 from the second
        assert_eq!(mesh.vertex_count(), 10);
        assert_eq!(mesh.triangles[0].indices, [0, 1, 2]);
        assert_eq!(mesh.triangles[1].indices, [3, 4, 5]);
        assert_eq!(mesh.triangles[2].indices, [6, 7, 8]);
        assert_eq!(mesh.triangles[3].indices, [7, 9, 8]);
        assert_eq!(mesh.triangle_count(), 4);
    }

    #[test]
    fn test_triangles_before_load_are_ignored() {
        let text = r#"
static const Vtx buf_a[] = {
    {{{0, 0, 0}, 0, {0, 0}, {0x00, 0x00, 0x00, 0xff}}},
    {{{1, 0, 0}, 0, {0, 0}, {0x00, 0x00, 0x00, 0xff}}},
    {{{0, 1, 0}, 0, {0, 0}, {0x00, 0x00, 0x00, 0xff}}},
};
const Gfx dl[] = {
    gsSP1Triangle(0, 1, 2, 0x0),
    gsSPEndDisplayList(),
};
"#;
        let mesh = parse_model(text, "Area 1", "Test").unwrap();
        assert!(mesh.vertices.is_empty());
        assert!(mesh.triangles.is_empty());
        assert_eq!(mesh.main_display_list_name.as_deref(), Some("dl"));
    }

    #[test]
    fn test_texture_follows_triangles_within_a_list() {
        let mesh = parse_model(MODEL, "Area 1", "Bob").unwrap();
        assert_eq!(mesh.triangles[0].texture.as_deref(), Some("bob_seg7_texture_grass"));
        assert_eq!(mesh.triangles[1].texture.as_deref(), Some("bob_seg7_texture_grass"));
        assert_eq!(mesh.triangles[2].texture, None);
    }

    #[test]
    fn test_display_list_names() {
        let mesh = parse_model(MODEL, "Area 1", "Bob").unwrap();
        assert_eq!(
            mesh.display_list_names,
            vec!["bob_seg7_dl_07002100", "bob_seg7_dl_07002200"]
        );
        assert_eq!(mesh.main_display_list_name.as_deref(), Some("bob_seg7_dl_07002100"));
    }

    #[test]
    fn test_partial_load_uses_length_before_load() {
        let text = r#"
static const Vtx buf_a[] = {
    {{{0, 0, 0}, 0, {0, 0}, {0x00, 0x00, 0x00, 0xff}}},
    {{{1, 0, 0}, 0, {0, 0}, {0x00, 0x00, 0x00, 0xff}}},
    {{{0, 1, 0}, 0, {0, 0}, {0x00, 0x00, 0x00, 0xff}}},
    {{{1, 1, 0}, 0, {0, 0}, {0x00, 0x00, 0x00, 0xff}}},
};
const Gfx dl[] = {
    gsSPVertex(buf_a, 3, 0),
    gsSPVertex(buf_a, 3, 0),
    gsSP1Triangle(0, 1, 2, 0x0),
};
"#;
        let mesh = parse_model(text, "Area 1", "Test").unwrap();
        assert_eq!(mesh.vertex_count(), 6);
        assert_eq!(mesh.triangles[0].indices, [3, 4, 5]);
    }

    #[test]
    fn test_huge_local_index_is_dropped() {
        let text = r#"
static const Vtx buf_a[] = {
    {{{0, 0, 0}, 0, {0, 0}, {0x00, 0x00, 0x00, 0xff}}},
    {{{1, 0, 0}, 0, {0, 0}, {0x00, 0x00, 0x00, 0xff}}},
    {{{0, 1, 0}, 0, {0, 0}, {0x00, 0x00, 0x00, 0xff}}},
};
const Gfx dl[] = {
    gsSPVertex(buf_a, 3, 0),
    gsSPVertex(buf_a, 3, 0),
    gsSP1Triangle(4294967295, 0, 1, 0x0),
    gsSP1Triangle(0, 1, 2, 0x0),
};
"#;
        let mesh = parse_model(text, "Area 1", "Test").unwrap();
        assert_eq!(mesh.vertex_count(), 6);
        assert_eq!(mesh.triangle_count(), 1);
        assert_eq!(mesh.triangles[0].indices, [3, 4, 5]);
    }

    #[test]
    fn test_unknown_buffer_clears_current_load() {
        let text = r#"
static const Vtx buf_a[] = {
    {{{0, 0, 0}, 0, {0, 0}, {0x00, 0x00, 0x00, 0xff}}},
    {{{1, 0, 0}, 0, {0, 0}, {0x00, 0x00, 0x00, 0xff}}},
    {{{0, 1, 0}, 0, {0, 0}, {0x00, 0x00, 0x00, 0xff}}},
};
const Gfx dl[] = {
    gsSPVertex(buf_a, 3, 0),
    gsSPVertex(missing_buf, 3, 0),
    gsSP1Triangle(0, 1, 2, 0x0),
};
"#;
        let mesh = parse_model(text, "Area 1", "Test").unwrap();
        assert_eq!(mesh.vertex_count(), 3);
        assert!(mesh.triangles.is_empty());
    }

    #[test]
    fn test_malformed_byte_abandons_file() {
        let text = "static const Vtx v[] = { {{{0, 0, 0}, 0, {0, 0}, {0x100, 0, 0, 0}}} };";
        assert!(matches!(
            parse_model(text, "Area 1", "Test"),
            Err(ExtractError::MalformedEntry { .. })
        ));
    }

    #[test]
    fn test_apply_transform_truncates() {
        let mut vertices = vec![ModelVertex {
            x: 3,
            y: -3,
            z: 1,
            ..ModelVertex::default()
        }];
        apply_transform(&mut vertices, &Mat4::from_scale(Vec3::splat(0.5)));
        assert_eq!(vertices[0].position(), Vertex3i::new(1, -1, 0));
    }

    #[test]
    fn test_find_model_files() {
        let dir = TempDir::new().unwrap();
        for sub in ["areas/1/2", "areas/1/1", "areas/1/10", "areas/2/1"] {
            std::fs::create_dir_all(dir.path().join(sub)).unwrap();
        }
        for sub in ["areas/1/2", "areas/1/1", "areas/1/10"] {
            std::fs::write(dir.path().join(sub).join(MODEL_FILE), MODEL).unwrap();
        }

        let files = find_model_files(dir.path());
        assert_eq!(files.len(), 1);
        assert_eq!(
            files["Area 1"],
            vec![
                dir.path().join("areas/1/1").join(MODEL_FILE),
                dir.path().join("areas/1/2").join(MODEL_FILE),
                dir.path().join("areas/1/10").join(MODEL_FILE),
            ]
        );
    }
}

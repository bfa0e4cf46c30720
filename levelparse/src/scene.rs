use bevy::math::Mat4;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
};

use crate::{
    ExtractError,
    collision::{COLLISION_FILE, CollisionMesh, parse_collision},
    geo_layout::{GEO_LAYOUT_FILE, find_geo_layout_for, load_geo_layout},
    level::{LevelMetadata, ProjectLayout},
    macro_objects::{
        MACRO_PRESETS_FILE, find_macro_list_file, load_macro_objects, load_macro_presets,
    },
    model::{SubMesh, VisualMesh, apply_transform, load_model, model_files_in},
    objects::{PlacedObject, load_macro_list_name, load_model_mapping, load_script_objects},
    source::read_source,
    special_objects::{
        SPECIAL_PRESETS_FILE, SpecialObject, SpecialPresetTable, load_special_presets,
        parse_special_objects, special_placed_objects,
    },
};

/// Everything reconstructed for one area.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AreaScene {
    pub level_name: String,
    pub area_name: String,
    pub collision: Option<CollisionMesh>,
    pub visual: Option<VisualMesh>,
    pub objects: Vec<PlacedObject>,
}

impl fmt::Display for AreaScene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}:", self.level_name, self.area_name)?;
        match &self.collision {
            Some(mesh) => write!(
                f,
                " collision {} vertices, {} triangles;",
                mesh.vertex_count(),
                mesh.triangle_count()
            )?,
            None => write!(f, " no collision;")?,
        }
        match &self.visual {
            Some(mesh) => write!(
                f,
                " visual {} vertices, {} triangles;",
                mesh.vertex_count(),
                mesh.triangle_count()
            )?,
            None => write!(f, " no visual mesh;")?,
        }
        write!(f, " {} objects", self.objects.len())
    }
}

/// Ordinal of a sub model file: the last numeric path segment, else its position.
pub fn sub_model_ordinal(path: &Path, position: u32) -> u32 {
    path.components()
        .rev()
        .find_map(|part| part.as_os_str().to_str()?.parse::<u32>().ok())
        .unwrap_or(position)
}

/// Picks the transform for a sub model: by display list name first, then by ordinal.
pub fn resolve_transform<'a>(
    mesh: &VisualMesh,
    ordinal: u32,
    transforms: &'a HashMap<String, Mat4>,
) -> Option<(&'a str, &'a Mat4)> {
    mesh.display_list_names
        .iter()
        .find_map(|name| transforms.get_key_value(name.as_str()))
        .or_else(|| transforms.get_key_value(format!("SubModel_{ordinal}").as_str()))
        .map(|(key, transform)| (key.as_str(), transform))
}

/// Parses every sub model in parallel and merges them in file order.
pub fn compose_visual_mesh(
    files: &[PathBuf],
    area_name: &str,
    level_name: &str,
    transforms: &HashMap<String, Mat4>,
) -> Option<VisualMesh> {
    let parsed = files
        .par_iter()
        .filter_map(|path| Some((path, load_model(path, area_name, level_name)?)))
        .collect::<Vec<_>>();
    if parsed.is_empty() {
        return None;
    }

    let mut merged = VisualMesh {
        area_name: area_name.to_owned(),
        level_name: level_name.to_owned(),
        ..VisualMesh::default()
    };

    for (position, (path, mut mesh)) in (1..).zip(parsed) {
        let ordinal = sub_model_ordinal(path, position);
        if let Some((key, transform)) = resolve_transform(&mesh, ordinal, transforms) {
            log::debug!("transforming sub model {ordinal} with {key}");
            apply_transform(&mut mesh.vertices, transform);
        }

        let offset = merged.vertices.len() as u32;
        merged.vertices.extend_from_slice(&mesh.vertices);
        merged
            .triangles
            .extend(mesh.triangles.iter().map(|tri| tri.offset_by(offset)));
        for name in &mesh.display_list_names {
            if merged.main_display_list_name.is_none() {
                merged.main_display_list_name = Some(name.clone());
            }
            if !merged.display_list_names.contains(name) {
                merged.display_list_names.push(name.clone());
            }
        }

        merged.sub_meshes.push(SubMesh {
            source_file: path.clone(),
            ordinal,
            vertices: mesh.vertices,
            triangles: mesh.triangles,
            visible: true,
        });
    }

    log::info!("merged visual mesh: {merged}");
    Some(merged)
}

/// Follows preset, model and layout to the display list a special object places.
pub fn resolve_special_geometry(
    special: &SpecialObject,
    presets: &SpecialPresetTable,
    model_to_layout: &HashMap<String, String>,
    area_dir: &Path,
) -> Result<String, ExtractError> {
    use ExtractError::AmbiguousResolution;

    let model = presets
        .get(&special.preset)
        .ok_or_else(|| AmbiguousResolution(format!("special preset {}", special.preset)))?;
    let layout_name = model_to_layout
        .get(model)
        .ok_or_else(|| AmbiguousResolution(format!("geometry layout of {model}")))?;
    let path = find_geo_layout_for(area_dir, layout_name)
        .ok_or_else(|| AmbiguousResolution(format!("file declaring {layout_name}")))?;
    let layout = load_geo_layout(&path).ok_or_else(|| {
        AmbiguousResolution(format!("layout {layout_name} in {}", path.display()))
    })?;

    layout
        .primary_display_list_name()
        .map(str::to_owned)
        .ok_or_else(|| AmbiguousResolution(format!("display list drawn by {layout_name}")))
}

/// Places the geometry of special objects whose model is loaded from a layout under `area_dir`.
pub fn special_geometry_transforms(
    specials: &[SpecialObject],
    presets: &SpecialPresetTable,
    model_to_layout: &HashMap<String, String>,
    area_dir: &Path,
) -> HashMap<String, Mat4> {
    let mut transforms = HashMap::new();

    for special in specials.iter().filter(|special| special.places_geometry()) {
        match resolve_special_geometry(special, presets, model_to_layout, area_dir) {
            Ok(name) => {
                log::debug!(
                    "placing special object {} geometry {name} at ({}, {}, {})",
                    special.preset,
                    special.x,
                    special.y,
                    special.z
                );
                transforms.insert(name, special.placement_transform());
            }
            Err(err) => log::debug!("skipping special object {}: {err}", special.preset),
        }
    }

    transforms
}

/// Script objects, then the level's macro list, then the special objects.
pub fn compose_objects(
    project: &ProjectLayout,
    level: &LevelMetadata,
    specials: &[SpecialObject],
    special_presets: &SpecialPresetTable,
) -> Vec<PlacedObject> {
    let script = level.script_path();
    let mut objects = load_script_objects(&script);

    if let Some(list_name) = load_macro_list_name(&script) {
        match find_macro_list_file(&level.level_path, &list_name) {
            Some(list_file) => {
                let presets = project
                    .include_file(MACRO_PRESETS_FILE, &level.level_path)
                    .map(|path| load_macro_presets(&path))
                    .unwrap_or_default();
                objects.extend(load_macro_objects(&list_file, &presets));
            }
            None => log::warn!("macro list {list_name} not found in {}", level.short_name),
        }
    }

    objects.extend(special_placed_objects(specials, special_presets));
    objects
}

/// Reconstructs one area of a level.
pub fn compose_area(
    project: &ProjectLayout,
    level: &LevelMetadata,
    area_number: &str,
) -> AreaScene {
    let area_name = format!("Area {area_number}");
    let area_dir = level.area_dir(area_number);
    log::info!("composing {} {area_name}", level.short_name);

    let collision_text = read_source(&area_dir.join(COLLISION_FILE))
        .inspect_err(|err| log::warn!("no collision for {area_name}: {err}"))
        .ok();
    let collision = collision_text.as_deref().and_then(|text| {
        parse_collision(text, &area_name, &level.full_name)
            .inspect_err(|err| log::warn!("failed parsing collision of {area_name}: {err}"))
            .ok()
    });
    let specials = collision_text
        .as_deref()
        .map(parse_special_objects)
        .transpose()
        .inspect_err(|err| log::warn!("failed parsing special objects of {area_name}: {err}"))
        .ok()
        .flatten()
        .unwrap_or_default();

    let special_presets = project
        .include_file(SPECIAL_PRESETS_FILE, &level.level_path)
        .map(|path| load_special_presets(&path))
        .unwrap_or_default();

    let mut transforms = load_geo_layout(&area_dir.join(GEO_LAYOUT_FILE))
        .map(|layout| layout.transformations())
        .unwrap_or_default();
    let model_to_layout = load_model_mapping(&level.script_path());
    transforms.extend(special_geometry_transforms(
        &specials,
        &special_presets,
        &model_to_layout,
        &area_dir,
    ));

    let visual = compose_visual_mesh(
        &model_files_in(&area_dir),
        &area_name,
        &level.full_name,
        &transforms,
    );
    let objects = compose_objects(project, level, &specials, &special_presets);

    AreaScene {
        level_name: level.full_name.clone(),
        area_name,
        collision,
        visual,
        objects,
    }
}

/// Every area of a level, composed in parallel.
pub fn compose_level(project: &ProjectLayout, level: &LevelMetadata) -> Vec<AreaScene> {
    level
        .area_numbers()
        .par_iter()
        .map(|area_number| compose_area(project, level, area_number))
        .collect()
}

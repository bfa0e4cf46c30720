use bevy::math::{Mat4, Vec3};
use shared::{
    MacroCall, angle_to_degrees, find_calls, scale_to_float, units::parse_i32_literal,
};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use crate::{
    ExtractError,
    source::{field, find_files_named, read_source},
};

pub const GEO_LAYOUT_FILE: &str = "geo.inc.c";

const GEO_TRANSLATE: &str = "GEO_TRANSLATE";
const GEO_TRANSLATE_WITH_DL: &str = "GEO_TRANSLATE_WITH_DL";
const GEO_ROTATE: &str = "GEO_ROTATE";
const GEO_ROTATE_WITH_DL: &str = "GEO_ROTATE_WITH_DL";
const GEO_SCALE: &str = "GEO_SCALE";
const GEO_SCALE_WITH_DL: &str = "GEO_SCALE_WITH_DL";
const GEO_TRANSLATE_ROTATE: &str = "GEO_TRANSLATE_ROTATE";
const GEO_TRANSLATE_ROTATE_WITH_DL: &str = "GEO_TRANSLATE_ROTATE_WITH_DL";
const GEO_DISPLAY_LIST: &str = "GEO_DISPLAY_LIST";
/// commands kept for inspection only, their effect depends on runtime code
const OPAQUE_COMMANDS: [&str; 2] = ["GEO_SWITCH_CASE", "GEO_ASM"];

/// One flat layout command. Rotations are in degrees.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformNode {
    Translate {
        translation: Vec3,
        display_list: Option<String>,
    },
    Rotate {
        rotation: Vec3,
        display_list: Option<String>,
    },
    TranslateRotate {
        translation: Vec3,
        rotation: Vec3,
        display_list: Option<String>,
    },
    Scale {
        scale: f32,
        display_list: Option<String>,
    },
    DisplayListRef {
        display_list: String,
    },
    Other {
        command: String,
    },
}

impl TransformNode {
    pub fn display_list(&self) -> Option<&str> {
        match self {
            TransformNode::Translate { display_list, .. }
            | TransformNode::Rotate { display_list, .. }
            | TransformNode::TranslateRotate { display_list, .. }
            | TransformNode::Scale { display_list, .. } => display_list.as_deref(),
            TransformNode::DisplayListRef { display_list } => Some(display_list),
            TransformNode::Other { .. } => None,
        }
    }

    pub fn translation(&self) -> Vec3 {
        match self {
            TransformNode::Translate { translation, .. }
            | TransformNode::TranslateRotate { translation, .. } => *translation,
            _ => Vec3::ZERO,
        }
    }

    pub fn rotation(&self) -> Vec3 {
        match self {
            TransformNode::Rotate { rotation, .. }
            | TransformNode::TranslateRotate { rotation, .. } => *rotation,
            _ => Vec3::ZERO,
        }
    }

    pub fn scale(&self) -> f32 {
        match self {
            TransformNode::Scale { scale, .. } => *scale,
            _ => 1.0,
        }
    }

    pub fn matrix(&self) -> Mat4 {
        compose_transform(self.scale(), self.rotation(), self.translation())
    }
}

/// Scale first, then rotate around X, Y and Z, then translate.
pub fn compose_transform(scale: f32, rotation_degrees: Vec3, translation: Vec3) -> Mat4 {
    Mat4::from_translation(translation)
        * Mat4::from_rotation_z(rotation_degrees.z.to_radians())
        * Mat4::from_rotation_y(rotation_degrees.y.to_radians())
        * Mat4::from_rotation_x(rotation_degrees.x.to_radians())
        * Mat4::from_scale(Vec3::splat(scale))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoLayout {
    pub nodes: Vec<TransformNode>,
}

impl GeoLayout {
    /// Any display list this layout draws, for pieces that only draw one thing.
    pub fn primary_display_list_name(&self) -> Option<&str> {
        let plain = self.nodes.iter().find_map(|node| match node {
            TransformNode::DisplayListRef { display_list } => Some(display_list.as_str()),
            _ => None,
        });
        plain
            .or_else(|| self.first_bound(|node| matches!(node, TransformNode::Translate { .. })))
            .or_else(|| self.first_bound(|node| matches!(node, TransformNode::Rotate { .. })))
            .or_else(|| self.first_bound(|node| matches!(node, TransformNode::Scale { .. })))
            .or_else(|| {
                self.first_bound(|node| matches!(node, TransformNode::TranslateRotate { .. }))
            })
    }

    fn first_bound(&self, kind: impl Fn(&TransformNode) -> bool) -> Option<&str> {
        self.nodes
            .iter()
            .filter(|node| kind(*node))
            .find_map(TransformNode::display_list)
    }

    pub fn transformations(&self) -> HashMap<String, Mat4> {
        extract_transformations(&self.nodes)
    }
}

/// Every node bound to a display list contributes its matrix, later bindings win.
pub fn extract_transformations(nodes: &[TransformNode]) -> HashMap<String, Mat4> {
    let mut transforms = HashMap::new();
    for node in nodes {
        if let Some(name) = node.display_list() {
            log::debug!(
                "transform for {name}: T:{} R:{} S:{}",
                node.translation(),
                node.rotation(),
                node.scale()
            );
            transforms.insert(name.to_owned(), node.matrix());
        }
    }
    transforms
}

fn translation_at(call: &MacroCall, start: usize) -> Result<Option<Vec3>, ExtractError> {
    let (Some(x), Some(y), Some(z)) = (
        field("layout translation", call.arg(start), parse_i32_literal)?,
        field("layout translation", call.arg(start + 1), parse_i32_literal)?,
        field("layout translation", call.arg(start + 2), parse_i32_literal)?,
    ) else {
        return Ok(None);
    };
    Ok(Some(Vec3::new(x as f32, y as f32, z as f32)))
}

fn rotation_at(call: &MacroCall, start: usize) -> Result<Option<Vec3>, ExtractError> {
    let (Some(x), Some(y), Some(z)) = (
        field("layout rotation", call.arg(start), angle_to_degrees)?,
        field("layout rotation", call.arg(start + 1), angle_to_degrees)?,
        field("layout rotation", call.arg(start + 2), angle_to_degrees)?,
    ) else {
        return Ok(None);
    };
    Ok(Some(Vec3::new(x, y, z)))
}

fn identifier_at(call: &MacroCall, index: usize) -> Option<String> {
    call.arg(index)
        .filter(|name| {
            !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
        .map(str::to_owned)
}

fn calls<'a>(text: &'a str, name: &'a str, arity: usize) -> impl Iterator<Item = MacroCall<'a>> {
    find_calls(text, name).filter(move |call| call.args.len() == arity)
}

/// Collects layout commands grouped by kind, each group in textual order.
pub fn parse_geo_layout(text: &str) -> Result<GeoLayout, ExtractError> {
    let mut nodes = Vec::new();

    for call in calls(text, GEO_TRANSLATE, 4) {
        if let Some(translation) = translation_at(&call, 1)? {
            nodes.push(TransformNode::Translate {
                translation,
                display_list: None,
            });
        }
    }

    for call in calls(text, GEO_TRANSLATE_WITH_DL, 5) {
        if let (Some(translation), Some(display_list)) =
            (translation_at(&call, 1)?, identifier_at(&call, 4))
        {
            nodes.push(TransformNode::Translate {
                translation,
                display_list: Some(display_list),
            });
        }
    }

    for call in calls(text, GEO_ROTATE, 4) {
        if let Some(rotation) = rotation_at(&call, 1)? {
            nodes.push(TransformNode::Rotate {
                rotation,
                display_list: None,
            });
        }
    }

    for call in calls(text, GEO_ROTATE_WITH_DL, 5) {
        if let (Some(rotation), Some(display_list)) =
            (rotation_at(&call, 1)?, identifier_at(&call, 4))
        {
            nodes.push(TransformNode::Rotate {
                rotation,
                display_list: Some(display_list),
            });
        }
    }

    for call in calls(text, GEO_SCALE, 2) {
        if let Some(scale) = field("layout scale", call.arg(1), scale_to_float)? {
            nodes.push(TransformNode::Scale {
                scale,
                display_list: None,
            });
        }
    }

    for call in calls(text, GEO_SCALE_WITH_DL, 3) {
        if let (Some(scale), Some(display_list)) = (
            field("layout scale", call.arg(1), scale_to_float)?,
            identifier_at(&call, 2),
        ) {
            nodes.push(TransformNode::Scale {
                scale,
                display_list: Some(display_list),
            });
        }
    }

    for call in calls(text, GEO_TRANSLATE_ROTATE, 7) {
        if let (Some(translation), Some(rotation)) =
            (translation_at(&call, 1)?, rotation_at(&call, 4)?)
        {
            nodes.push(TransformNode::TranslateRotate {
                translation,
                rotation,
                display_list: None,
            });
        }
    }

    for call in calls(text, GEO_TRANSLATE_ROTATE_WITH_DL, 8) {
        if let (Some(translation), Some(rotation), Some(display_list)) = (
            translation_at(&call, 1)?,
            rotation_at(&call, 4)?,
            identifier_at(&call, 7),
        ) {
            nodes.push(TransformNode::TranslateRotate {
                translation,
                rotation,
                display_list: Some(display_list),
            });
        }
    }

    for call in calls(text, GEO_DISPLAY_LIST, 2) {
        if let Some(display_list) = identifier_at(&call, 1) {
            nodes.push(TransformNode::DisplayListRef { display_list });
        }
    }

    for command in OPAQUE_COMMANDS {
        nodes.extend(find_calls(text, command).map(|_| TransformNode::Other {
            command: command.to_owned(),
        }));
    }

    Ok(GeoLayout { nodes })
}

pub fn load_geo_layout(path: &Path) -> Option<GeoLayout> {
    let layout = read_source(path)
        .and_then(|text| parse_geo_layout(&text))
        .inspect_err(|err| log::warn!("failed parsing geo layout {}: {err}", path.display()))
        .ok()?;

    log::debug!("{} layout nodes in {}", layout.nodes.len(), path.display());
    Some(layout)
}

/// First `geo.inc.c` under `dir` (sorted, recursive) whose text mentions `layout_name`.
pub fn find_geo_layout_for(dir: &Path, layout_name: &str) -> Option<PathBuf> {
    find_files_named(dir, GEO_LAYOUT_FILE)
        .into_iter()
        .find(|path| {
            read_source(path)
                .map(|text| text.contains(layout_name))
                .unwrap_or(false)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const LAYOUT: &str = r#"
const GeoLayout bob_geo_000488[] = {
    GEO_NODE_SCREEN_AREA(10, SCREEN_WIDTH/2, SCREEN_HEIGHT/2, SCREEN_WIDTH/2, SCREEN_HEIGHT/2),
    GEO_OPEN_NODE(),
        GEO_TRANSLATE_WITH_DL(LAYER_OPAQUE, 100, -20, 300, bob_dl_bridge),
        GEO_ROTATE(LAYER_OPAQUE, 0, 0x4000, 0),
        GEO_ROTATE_WITH_DL(LAYER_OPAQUE, 0, 0x4000, 0, bob_dl_gate),
        GEO_SCALE_WITH_DL(LAYER_OPAQUE, 0x8000, bob_dl_small),
        GEO_TRANSLATE_ROTATE_WITH_DL(LAYER_ALPHA, 10, 0, 0, 0, 0x4000, 0, bob_dl_tree),
        GEO_DISPLAY_LIST(LAYER_OPAQUE, bob_dl_ground),
        GEO_ASM(0, geo_movtex_pause_control),
    GEO_CLOSE_NODE(),
    GEO_END(),
};
"#;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).abs().max_element() < 1e-3
    }

    #[test]
    fn test_nodes_grouped_by_kind() {
        let layout = parse_geo_layout(LAYOUT).unwrap();
        assert_eq!(layout.nodes.len(), 7);
        assert!(matches!(
            &layout.nodes[0],
            TransformNode::Translate { display_list: Some(name), .. } if name == "bob_dl_bridge"
        ));
        assert!(matches!(
            &layout.nodes[1],
            TransformNode::Rotate { display_list: None, .. }
        ));
        assert!(matches!(
            &layout.nodes[5],
            TransformNode::DisplayListRef { display_list } if display_list == "bob_dl_ground"
        ));
        assert!(matches!(
            &layout.nodes[6],
            TransformNode::Other { command } if command == "GEO_ASM"
        ));
        assert!(approx(layout.nodes[1].rotation(), Vec3::new(0.0, 90.0, 0.0)));
        assert!((layout.nodes[3].scale() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_primary_display_list_priority() {
        let layout = parse_geo_layout(LAYOUT).unwrap();
        assert_eq!(layout.primary_display_list_name(), Some("bob_dl_ground"));

        let without_plain = parse_geo_layout(
            "GEO_SCALE_WITH_DL(1, 0x10000, dl_scaled) GEO_ROTATE_WITH_DL(1, 0, 0, 0, dl_rot)",
        )
        .unwrap();
        assert_eq!(without_plain.primary_display_list_name(), Some("dl_rot"));

        let empty = parse_geo_layout("GEO_TRANSLATE(1, 0, 0, 0)").unwrap();
        assert_eq!(empty.primary_display_list_name(), None);
    }

    #[test]
    fn test_extract_transformations() {
        let layout = parse_geo_layout(LAYOUT).unwrap();
        let transforms = layout.transformations();
        assert_eq!(transforms.len(), 5);

        let bridge = transforms["bob_dl_bridge"];
        assert!(approx(
            bridge.transform_point3(Vec3::new(1.0, 2.0, 3.0)),
            Vec3::new(101.0, -18.0, 303.0)
        ));

        // rotation happens before translation
        let tree = transforms["bob_dl_tree"];
        assert!(approx(
            tree.transform_point3(Vec3::X),
            Vec3::new(10.0, 0.0, -1.0)
        ));

        let small = transforms["bob_dl_small"];
        assert!(approx(
            small.transform_point3(Vec3::new(4.0, 8.0, -2.0)),
            Vec3::new(2.0, 4.0, -1.0)
        ));
    }

    #[test]
    fn test_later_binding_wins() {
        let layout = parse_geo_layout(
            "GEO_TRANSLATE_WITH_DL(1, 5, 0, 0, dl_same) GEO_SCALE_WITH_DL(1, 0x20000, dl_same)",
        )
        .unwrap();
        let transforms = layout.transformations();
        assert_eq!(transforms.len(), 1);
        assert!(approx(
            transforms["dl_same"].transform_point3(Vec3::ONE),
            Vec3::splat(2.0)
        ));
    }

    #[test]
    fn test_compose_order() {
        let matrix = compose_transform(2.0, Vec3::new(0.0, 0.0, 90.0), Vec3::new(0.0, 0.0, 5.0));
        // scaled to (2, 0, 0), turned onto +Y, then moved
        assert!(approx(
            matrix.transform_point3(Vec3::X),
            Vec3::new(0.0, 2.0, 5.0)
        ));
    }

    #[test]
    fn test_find_geo_layout_for() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("a")).unwrap();
        std::fs::create_dir_all(dir.path().join("b")).unwrap();
        std::fs::write(dir.path().join("a").join(GEO_LAYOUT_FILE), "const GeoLayout other[] = {};")
            .unwrap();
        std::fs::write(dir.path().join("b").join(GEO_LAYOUT_FILE), LAYOUT).unwrap();

        assert_eq!(
            find_geo_layout_for(dir.path(), "bob_geo_000488"),
            Some(dir.path().join("b").join(GEO_LAYOUT_FILE))
        );
        assert_eq!(find_geo_layout_for(dir.path(), "nothing_here"), None);
    }
}

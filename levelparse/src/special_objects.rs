use bevy::math::{Mat4, Quat, Vec3};
use itertools::Itertools;
use shared::{
    MacroCall, find_calls, macros::split_args, parse_int_literal,
    units::{ANGLE_UNITS_PER_TURN, LEGACY_YAW_UNITS_PER_TURN, parse_i32_literal, yaw_to_degrees},
};
use std::{collections::HashMap, path::Path};

use crate::{
    ExtractError,
    objects::{PlacedObject, param_or_zero},
    source::{field, read_source},
};

pub const SPECIAL_PRESETS_FILE: &str = "special_presets.inc.c";
pub const SPECIAL_BEHAVIOR: &str = "(Special Object)";

const SPECIAL_OBJECT: &str = "SPECIAL_OBJECT";
const SPECIAL_OBJECT_WITH_YAW: &str = "SPECIAL_OBJECT_WITH_YAW";
const SPECIAL_OBJECT_WITH_YAW_AND_PARAM: &str = "SPECIAL_OBJECT_WITH_YAW_AND_PARAM";

/// Special preset name to model id.
pub type SpecialPresetTable = HashMap<String, String>;

/// One special object as written in a collision file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialObject {
    pub preset: String,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub yaw: Option<i32>,
    pub param: Option<u32>,
}

impl SpecialObject {
    /// The form the level geometry is placed with, everything but the param carrying one.
    pub fn places_geometry(&self) -> bool {
        self.param.is_none()
    }

    /// Object list entry, the yaw is read as 1/256 turns.
    pub fn to_placed(&self, presets: &SpecialPresetTable) -> Option<PlacedObject> {
        let model = presets.get(&self.preset)?;
        let ry = yaw_to_degrees(self.yaw.unwrap_or(0) as f32, LEGACY_YAW_UNITS_PER_TURN) as i32;

        Some(PlacedObject {
            model: model.clone(),
            x: self.x,
            y: self.y,
            z: self.z,
            ry,
            params: self.param.unwrap_or(0),
            behavior: SPECIAL_BEHAVIOR.to_owned(),
            ..PlacedObject::default()
        })
    }

    /// Placement of the preset's geometry, the yaw is read in full angle units.
    pub fn placement_transform(&self) -> Mat4 {
        let degrees = yaw_to_degrees(self.yaw.unwrap_or(0) as f32, ANGLE_UNITS_PER_TURN);
        Mat4::from_translation(Vec3::new(self.x as f32, self.y as f32, self.z as f32))
            * Mat4::from_quat(Quat::from_rotation_y(degrees.to_radians()))
    }
}

/// Parses `{ name, SPTYPE_..., literal, MODEL_ID, ... }` rows, the first row of a name wins.
pub fn parse_special_presets(text: &str) -> SpecialPresetTable {
    let mut presets = SpecialPresetTable::new();

    for (open, _) in text.match_indices('{') {
        let Some(end) = text[open + 1..].find(['{', '}']) else {
            break;
        };
        let args = split_args(&text[open + 1..open + 1 + end]);
        let [name, kind, literal, model, ..] = args.as_slice() else {
            continue;
        };
        if !kind.value.starts_with("SPTYPE_") || parse_int_literal(literal.value).is_err() {
            continue;
        }
        if name.value.is_empty() || model.value.is_empty() {
            continue;
        }

        presets
            .entry(name.value.to_owned())
            .or_insert_with(|| model.value.to_owned());
    }

    presets
}

pub fn load_special_presets(path: &Path) -> SpecialPresetTable {
    let Some(presets) = read_source(path)
        .inspect_err(|err| log::warn!("special presets unavailable: {err}"))
        .ok()
        .map(|text| parse_special_presets(&text))
    else {
        return SpecialPresetTable::new();
    };

    log::info!(
        "parsed {} special object presets from {}",
        presets.len(),
        path.display()
    );
    presets
}

fn parse_special_object(call: &MacroCall) -> Result<Option<SpecialObject>, ExtractError> {
    const KIND: &str = "special object";
    let Some(preset) = call.arg(0) else {
        return Ok(None);
    };
    let (Some(x), Some(y), Some(z)) = (
        field(KIND, call.arg(1), parse_i32_literal)?,
        field(KIND, call.arg(2), parse_i32_literal)?,
        field(KIND, call.arg(3), parse_i32_literal)?,
    ) else {
        return Ok(None);
    };

    let yaw = match call.arg(4) {
        Some(literal) => match field(KIND, Some(literal), parse_i32_literal)? {
            Some(yaw) => Some(yaw),
            None => return Ok(None),
        },
        None => None,
    };
    let param = (call.args.len() == 6).then(|| param_or_zero(call.arg(5)));

    Ok(Some(SpecialObject {
        preset: preset.to_owned(),
        x,
        y,
        z,
        yaw,
        param,
    }))
}

/// Special objects of a collision file in the order they are written.
pub fn parse_special_objects(text: &str) -> Result<Vec<SpecialObject>, ExtractError> {
    let plain = [Some("preset"), Some("pos"), None, None];
    let with_yaw = [Some("preset"), Some("pos"), None, None, Some("yaw")];
    let with_param = [
        Some("preset"),
        Some("pos"),
        None,
        None,
        Some("yaw"),
        Some("bhvParam2"),
    ];

    let calls = find_calls(text, SPECIAL_OBJECT)
        .filter(|call| call.has_shape(&plain))
        .merge_by(
            find_calls(text, SPECIAL_OBJECT_WITH_YAW).filter(|call| call.has_shape(&with_yaw)),
            |a, b| a.offset < b.offset,
        )
        .merge_by(
            find_calls(text, SPECIAL_OBJECT_WITH_YAW_AND_PARAM)
                .filter(|call| call.has_shape(&with_param)),
            |a, b| a.offset < b.offset,
        );

    let mut objects = Vec::new();
    for call in calls {
        objects.extend(parse_special_object(&call)?);
    }
    Ok(objects)
}

/// Special objects as placed objects, entries with an unknown preset are dropped.
pub fn special_placed_objects(
    specials: &[SpecialObject],
    presets: &SpecialPresetTable,
) -> Vec<PlacedObject> {
    specials
        .iter()
        .filter_map(|special| {
            let placed = special.to_placed(presets);
            if placed.is_none() {
                log::debug!("dropping special object with unknown preset {}", special.preset);
            }
            placed
        })
        .collect()
}

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use shared::{MacroCall, find_calls, parse_uint_literal, units::parse_i32_literal};
use std::{collections::HashMap, fmt, path::Path};

use crate::{
    ExtractError,
    source::{field, read_source},
};

pub const SCRIPT_FILE: &str = "script.c";
pub const MARIO_MODEL: &str = "MODEL_MARIO";
pub const MARIO_BEHAVIOR: &str = "bhvMario";

const OBJECT: &str = "OBJECT";
const OBJECT_WITH_ACTS: &str = "OBJECT_WITH_ACTS";
const MARIO_POS: &str = "MARIO_POS";
const MACRO_OBJECTS: &str = "MACRO_OBJECTS";
const LOAD_MODEL_FROM_GEO: &str = "LOAD_MODEL_FROM_GEO";

/// An object placed in a level, whatever encoding it came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedObject {
    pub model: String,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    /// degrees
    pub rx: i32,
    pub ry: i32,
    pub rz: i32,
    pub params: u32,
    pub behavior: String,
}

impl fmt::Display for PlacedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] at ({}, {}, {}) ry {} params {:#010x}",
            self.model, self.behavior, self.x, self.y, self.z, self.ry, self.params
        )
    }
}

/// Behavior parameters written as anything but a plain literal count as zero.
pub(crate) fn param_or_zero(literal: Option<&str>) -> u32 {
    literal
        .and_then(|literal| parse_uint_literal(literal).ok())
        .unwrap_or_default()
}

fn parse_object(call: &MacroCall) -> Result<Option<PlacedObject>, ExtractError> {
    const KIND: &str = "script object";
    let (Some(model), Some(behavior)) = (call.arg(0), call.arg(8)) else {
        return Ok(None);
    };
    let (Some(x), Some(y), Some(z), Some(rx), Some(ry), Some(rz)) = (
        field(KIND, call.arg(1), parse_i32_literal)?,
        field(KIND, call.arg(2), parse_i32_literal)?,
        field(KIND, call.arg(3), parse_i32_literal)?,
        field(KIND, call.arg(4), parse_i32_literal)?,
        field(KIND, call.arg(5), parse_i32_literal)?,
        field(KIND, call.arg(6), parse_i32_literal)?,
    ) else {
        return Ok(None);
    };

    Ok(Some(PlacedObject {
        model: model.to_owned(),
        x,
        y,
        z,
        rx,
        ry,
        rz,
        params: param_or_zero(call.arg(7)),
        behavior: behavior.to_owned(),
    }))
}

/// `MARIO_POS(area, yaw, x, y, z)` as a synthetic object.
fn parse_mario_pos(call: &MacroCall) -> Result<Option<PlacedObject>, ExtractError> {
    const KIND: &str = "mario position";
    let (Some(yaw), Some(x), Some(y), Some(z)) = (
        field(KIND, call.arg(1), parse_i32_literal)?,
        field(KIND, call.arg(2), parse_i32_literal)?,
        field(KIND, call.arg(3), parse_i32_literal)?,
        field(KIND, call.arg(4), parse_i32_literal)?,
    ) else {
        return Ok(None);
    };

    Ok(Some(PlacedObject {
        model: MARIO_MODEL.to_owned(),
        x,
        y,
        z,
        ry: yaw,
        behavior: MARIO_BEHAVIOR.to_owned(),
        ..PlacedObject::default()
    }))
}

/// Statically placed objects of a level script, the start position last.
pub fn parse_script_objects(text: &str) -> Result<Vec<PlacedObject>, ExtractError> {
    let object_calls = find_calls(text, OBJECT)
        .filter(|call| call.args.len() == 9)
        .merge_by(
            find_calls(text, OBJECT_WITH_ACTS).filter(|call| call.args.len() == 10),
            |a, b| a.offset < b.offset,
        );

    let mut objects = Vec::new();
    for call in object_calls {
        objects.extend(parse_object(&call)?);
    }
    for call in find_calls(text, MARIO_POS).filter(|call| call.args.len() == 5) {
        objects.extend(parse_mario_pos(&call)?);
    }
    Ok(objects)
}

pub fn load_script_objects(path: &Path) -> Vec<PlacedObject> {
    let Some(objects) = read_source(path)
        .and_then(|text| parse_script_objects(&text))
        .inspect_err(|err| log::warn!("failed parsing script {}: {err}", path.display()))
        .ok()
    else {
        return Vec::new();
    };

    log::info!(
        "found {} objects in {}",
        objects.len(),
        path.file_name().unwrap_or_default().to_string_lossy()
    );
    objects
}

/// Name of the macro object list referenced by `MACRO_OBJECTS(/*objList*/ name)`.
pub fn parse_macro_list_name(text: &str) -> Option<String> {
    find_calls(text, MACRO_OBJECTS)
        .find(|call| call.has_shape(&[Some("objList")]))
        .and_then(|call| call.arg(0).map(str::to_owned))
}

pub fn load_macro_list_name(path: &Path) -> Option<String> {
    read_source(path)
        .inspect_err(|err| log::debug!("no macro list name: {err}"))
        .ok()
        .and_then(|text| parse_macro_list_name(&text))
}

/// Model id to geometry layout name, later loads of a model win.
pub fn parse_model_mapping(text: &str) -> HashMap<String, String> {
    find_calls(text, LOAD_MODEL_FROM_GEO)
        .filter(|call| call.args.len() == 2)
        .filter_map(|call| Some((call.arg(0)?.to_owned(), call.arg(1)?.to_owned())))
        .collect()
}

pub fn load_model_mapping(path: &Path) -> HashMap<String, String> {
    read_source(path)
        .inspect_err(|err| log::debug!("no model mapping: {err}"))
        .map(|text| parse_model_mapping(&text))
        .unwrap_or_default()
}

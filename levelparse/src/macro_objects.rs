use itertools::Itertools;
use shared::{
    MacroCall, brace_body, find_calls, macros::split_args, parse_uint_literal,
    units::parse_i32_literal,
};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use crate::{
    ExtractError,
    objects::{PlacedObject, param_or_zero},
    source::{field, find_files_named, read_source},
};

pub const MACRO_PRESETS_FILE: &str = "macro_presets.inc.c";
pub const MACRO_LIST_FILE: &str = "macro.inc.c";

const MACRO_OBJECT: &str = "MACRO_OBJECT";
const MACRO_OBJECT_WITH_BHV_PARAM: &str = "MACRO_OBJECT_WITH_BHV_PARAM";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MacroPreset {
    pub behavior: String,
    pub model: String,
    pub param: u32,
}

pub type MacroPresetTable = HashMap<String, MacroPreset>;

fn is_identifier(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Preset default parameters, `|` expressions are not evaluated.
fn preset_param(literal: &str) -> u32 {
    if literal.contains('|') {
        return 0;
    }
    parse_uint_literal(literal).unwrap_or_default()
}

/// Parses `/* name */ { behavior, model, param }` entries.
pub fn parse_macro_presets(text: &str) -> MacroPresetTable {
    let mut presets = MacroPresetTable::new();

    for (comment_start, _) in text.match_indices("/*") {
        let after_open = comment_start + 2;
        let Some(comment_len) = text[after_open..].find("*/") else {
            break;
        };
        let name = text[after_open..after_open + comment_len].trim();
        if !is_identifier(name) {
            continue;
        }

        let after_comment = after_open + comment_len + 2;
        let rest = &text[after_comment..];
        let open = after_comment + (rest.len() - rest.trim_start().len());
        let Some(body) = brace_body(text, open) else {
            continue;
        };
        let args = split_args(body);
        let [behavior, model, param, ..] = args.as_slice() else {
            continue;
        };
        if !is_identifier(behavior.value) || !is_identifier(model.value) {
            continue;
        }

        presets.insert(
            name.to_owned(),
            MacroPreset {
                behavior: behavior.value.to_owned(),
                model: model.value.to_owned(),
                param: preset_param(param.value),
            },
        );
    }

    presets
}

pub fn load_macro_presets(path: &Path) -> MacroPresetTable {
    let Some(presets) = read_source(path)
        .inspect_err(|err| log::warn!("macro presets unavailable: {err}"))
        .ok()
        .map(|text| parse_macro_presets(&text))
    else {
        return MacroPresetTable::new();
    };

    log::info!(
        "parsed {} macro presets from {}",
        presets.len(),
        path.display()
    );
    presets
}

fn parse_macro_object(
    call: &MacroCall,
    presets: &MacroPresetTable,
) -> Result<Option<PlacedObject>, ExtractError> {
    const KIND: &str = "macro object";
    let Some(preset_name) = call.arg(0) else {
        return Ok(None);
    };
    let (Some(yaw), Some(x), Some(y), Some(z)) = (
        field(KIND, call.arg(1), parse_i32_literal)?,
        field(KIND, call.arg(2), parse_i32_literal)?,
        field(KIND, call.arg(3), parse_i32_literal)?,
        field(KIND, call.arg(4), parse_i32_literal)?,
    ) else {
        return Ok(None);
    };

    let Some(preset) = presets.get(preset_name) else {
        log::debug!("dropping macro object with unknown preset {preset_name}");
        return Ok(None);
    };

    Ok(Some(PlacedObject {
        model: preset.model.clone(),
        x,
        y,
        z,
        // macro lists already store degrees
        ry: yaw,
        params: param_or_zero(call.arg(5)) | preset.param,
        behavior: preset.behavior.clone(),
        ..PlacedObject::default()
    }))
}

/// Objects of a macro list in the order they are written.
pub fn parse_macro_objects(
    text: &str,
    presets: &MacroPresetTable,
) -> Result<Vec<PlacedObject>, ExtractError> {
    let base = [Some("preset"), Some("yaw"), Some("pos"), None, None];
    let with_param = [
        Some("preset"),
        Some("yaw"),
        Some("pos"),
        None,
        None,
        Some("bhvParam"),
    ];

    let calls = find_calls(text, MACRO_OBJECT)
        .filter(|call| call.has_shape(&base))
        .merge_by(
            find_calls(text, MACRO_OBJECT_WITH_BHV_PARAM)
                .filter(|call| call.has_shape(&with_param)),
            |a, b| a.offset < b.offset,
        );

    let mut objects = Vec::new();
    for call in calls {
        objects.extend(parse_macro_object(&call, presets)?);
    }
    Ok(objects)
}

pub fn load_macro_objects(path: &Path, presets: &MacroPresetTable) -> Vec<PlacedObject> {
    read_source(path)
        .and_then(|text| parse_macro_objects(&text, presets))
        .inspect(|objects| {
            log::info!("found {} macro objects in {}", objects.len(), path.display())
        })
        .inspect_err(|err| log::warn!("failed parsing macro list {}: {err}", path.display()))
        .unwrap_or_default()
}

/// First `macro.inc.c` under `level_dir` (sorted, recursive) that mentions `list_name`.
pub fn find_macro_list_file(level_dir: &Path, list_name: &str) -> Option<PathBuf> {
    find_files_named(level_dir, MACRO_LIST_FILE)
        .into_iter()
        .find(|path| {
            read_source(path)
                .map(|text| text.contains(list_name))
                .unwrap_or(false)
        })
}

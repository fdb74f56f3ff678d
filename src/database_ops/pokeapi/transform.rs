//! Pure mapping from PokeAPI payloads to the rows we persist.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Language tag of the effect text we keep.
pub const EFFECT_LANGUAGE: &str = "en";

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("unexpected payload shape: {0}")]
    Shape(#[from] serde_json::Error),
    #[error("stat `{0}` missing from payload")]
    MissingStat(&'static str),
}

// ---------- PokeAPI shapes (minimal) ----------
// Only the fields the mapping reads are modeled; everything else is ignored.

#[derive(Debug, Deserialize)]
struct NamedRef {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PokemonPayload {
    id: i64,
    name: String,
    stats: Vec<StatEntry>,
}

#[derive(Debug, Deserialize)]
struct StatEntry {
    base_stat: u32,
    stat: NamedRef,
}

#[derive(Debug, Deserialize)]
struct MovePayload {
    name: String,
    power: Option<i64>,
    accuracy: Option<i64>,
    effect_chance: Option<i64>,
    #[serde(rename = "type")]
    r#type: Option<NamedRef>,
    #[serde(default)]
    effect_entries: Vec<EffectEntry>,
}

#[derive(Debug, Deserialize)]
struct EffectEntry {
    effect: Option<String>,
    language: Option<NamedRef>,
}

// ---------- Persisted shapes ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterStatus {
    pub hp: u32,
    pub agility: u32,
    pub strength: u32,
    pub defense: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterRecord {
    pub name: String,
    pub form_id: Option<i64>,
    pub status: CharacterStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveInfo {
    pub power: Option<i64>,
    pub accuracy: Option<i64>,
    pub effect_chance: Option<i64>,
    #[serde(rename = "type")]
    pub move_type: Option<String>,
    pub effect: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRecord {
    pub move_name: String,
    pub move_info: MoveInfo,
}

pub fn transform_character(entity: &Value) -> Result<CharacterRecord, TransformError> {
    let payload = PokemonPayload::deserialize(entity)?;
    let stats: HashMap<&str, u32> = payload
        .stats
        .iter()
        .map(|s| (s.stat.name.as_str(), s.base_stat))
        .collect();
    let stat = |name: &'static str| {
        stats
            .get(name)
            .copied()
            .ok_or(TransformError::MissingStat(name))
    };

    Ok(CharacterRecord {
        name: capitalize(&payload.name),
        form_id: Some(payload.id),
        status: CharacterStatus {
            hp: stat("hp")?,
            agility: stat("speed")?,
            strength: rounded_mean(stat("attack")?, stat("special-attack")?),
            defense: rounded_mean(stat("defense")?, stat("special-defense")?),
        },
    })
}

pub fn transform_move(entity: &Value) -> Result<MoveRecord, TransformError> {
    let payload = MovePayload::deserialize(entity)?;
    let effect = payload
        .effect_entries
        .iter()
        .find(|e| {
            e.language
                .as_ref()
                .is_some_and(|l| l.name == EFFECT_LANGUAGE)
        })
        .and_then(|e| e.effect.clone())
        .filter(|text| !text.is_empty());

    Ok(MoveRecord {
        move_name: title_case(&payload.name.replace('-', " ")),
        move_info: MoveInfo {
            power: payload.power,
            accuracy: payload.accuracy,
            effect_chance: payload.effect_chance,
            move_type: payload.r#type.map(|t| t.name),
            effect,
        },
    })
}

/// Integer mean of two stats, ties rounded to the even neighbour.
pub fn rounded_mean(a: u32, b: u32) -> u32 {
    let sum = u64::from(a) + u64::from(b);
    let floor = sum / 2;
    let rounded = if sum % 2 == 1 && floor % 2 == 1 {
        floor + 1
    } else {
        floor
    };
    rounded as u32
}

/// First character upper-cased, the rest lower-cased.
pub fn capitalize(raw: &str) -> String {
    let mut chars = raw.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Upper-cases every letter that follows a non-letter; lower-cases the rest.
pub fn title_case(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_is_letter = false;
    for ch in raw.chars() {
        if ch.is_alphabetic() {
            if prev_is_letter {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            out.push(ch);
            prev_is_letter = false;
        }
    }
    out
}

pub mod client;
pub mod transform;

pub use client::{EntitySource, PokeApiClient};
pub use transform::{
    transform_character, transform_move, CharacterRecord, CharacterStatus, MoveInfo, MoveRecord,
};

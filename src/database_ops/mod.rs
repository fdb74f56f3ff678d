pub mod pokeapi;
pub mod repository;
pub mod seed;

pub mod cli;
pub mod database_ops;
pub mod tracing;

pub mod util {
    pub mod db;
    pub mod db_config;
    pub mod env;
}

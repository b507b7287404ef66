/// Database connection, schema creation and seeding
pub mod database;

/// Settings loaded from config.toml and the environment
pub mod settings;

pub use settings::Settings;

//! Adjustment reason entity - Codes that justify a manual stock correction.
//! Seeded from `config.toml` at startup.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Adjustment reason database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "adjustment_reasons")]
pub struct Model {
    /// Reason code, assigned by configuration rather than autoincrement
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,
    /// Human-readable label (e.g. "Damaged", "Recount")
    pub label: String,
}

/// `AdjustmentReason` has no navigable relationships
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

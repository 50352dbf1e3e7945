//! Small key/value configuration row, used only to stamp a couple of
//! server-identity facts (name, generated UUID) at startup. Not part of
//! the workflow/node data model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Configuration {
    pub key: String,
    pub value: String,
    pub value_type: String,
    pub updated_at: String,
}

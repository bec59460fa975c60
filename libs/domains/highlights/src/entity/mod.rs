//! SeaORM entities for the ORM execution path

pub mod highlight;
pub mod sync_state;

//! Local persistence for Stride

mod connection;
mod entity_repository;
mod meta_repository;
mod migrations;
mod queue_repository;

pub use connection::Database;
pub use entity_repository::EntityRepository;
pub use meta_repository::{MetaRepository, CONFLICTS_KEY, REVIEW_KEY, SYNC_META_KEY};
pub use queue_repository::QueueRepository;

use libsql::Value;

fn opt_text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |text| Value::Text(text.to_string()))
}

fn opt_integer(value: Option<i64>) -> Value {
    value.map_or(Value::Null, Value::Integer)
}

fn value_as_opt_integer(value: Value) -> Option<i64> {
    match value {
        Value::Integer(number) => Some(number),
        _ => None,
    }
}

//! JSON types and helpers shared across the cache.

pub use serde_json_bytes::ByteString;
pub use serde_json_bytes::Map;
pub use serde_json_bytes::Value;

/// A JSON object as found in GraphQL response data.
pub type Object = Map<ByteString, Value>;

pub trait ValueExt {
    /// Compare to another value for equality, also requiring object fields
    /// to appear in the same order.
    fn eq_and_ordered(&self, other: &Self) -> bool;
}

impl ValueExt for Value {
    fn eq_and_ordered(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => {
                let mut it_a = a.iter();
                let mut it_b = b.iter();

                loop {
                    match (it_a.next(), it_b.next()) {
                        (Some(_), None) | (None, Some(_)) => break false,
                        (None, None) => break true,
                        (Some((field_a, value_a)), Some((field_b, value_b)))
                            if field_a == field_b && value_a.eq_and_ordered(value_b) =>
                        {
                            continue;
                        }
                        (Some(_), Some(_)) => break false,
                    }
                }
            }
            (Value::Array(a), Value::Array(b)) => {
                let mut it_a = a.iter();
                let mut it_b = b.iter();

                loop {
                    match (it_a.next(), it_b.next()) {
                        (Some(_), None) | (None, Some(_)) => break false,
                        (None, None) => break true,
                        (Some(value_a), Some(value_b)) if value_a.eq_and_ordered(value_b) => {
                            continue;
                        }
                        (Some(_), Some(_)) => break false,
                    }
                }
            }
            (a, b) => a == b,
        }
    }
}

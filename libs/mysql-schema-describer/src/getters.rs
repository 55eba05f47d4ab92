//! Functions for fetching from driver result rows.

use mysql_async::{Row, Value};

pub(crate) trait Getter {
    fn get_expect_string(&self, name: &str) -> String;

    fn get_string(&self, name: &str) -> Option<String>;
    fn get_bool(&self, name: &str) -> Option<bool>;
    fn get_u64(&self, name: &str) -> Option<u64>;
}

fn value(row: &Row, name: &str) -> Option<Value> {
    row.get_opt::<Value, _>(name).and_then(Result::ok)
}

impl Getter for Row {
    #[track_caller]
    fn get_expect_string(&self, name: &str) -> String {
        self.get_string(name)
            .ok_or_else(|| format!("Getting {} from row {:?} as String failed", name, &self))
            .unwrap()
    }

    fn get_string(&self, name: &str) -> Option<String> {
        match value(self, name)? {
            Value::Bytes(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Value::Int(i) => Some(i.to_string()),
            Value::UInt(u) => Some(u.to_string()),
            _ => None,
        }
    }

    // At least on MySQL, the encoding of booleans in the information schema
    // is somewhat flexible, so we match "0", "1", 0 and 1 in addition to the
    // integer forms.
    fn get_bool(&self, name: &str) -> Option<bool> {
        match value(self, name)? {
            Value::Int(0) | Value::UInt(0) => Some(false),
            Value::Int(1) | Value::UInt(1) => Some(true),
            Value::Bytes(bytes) => match String::from_utf8_lossy(&bytes).trim() {
                "0" => Some(false),
                "1" => Some(true),
                _ => None,
            },
            _ => None,
        }
    }

    fn get_u64(&self, name: &str) -> Option<u64> {
        match value(self, name)? {
            Value::Int(i) if i >= 0 => Some(i as u64),
            Value::UInt(u) => Some(u),
            Value::Bytes(bytes) => String::from_utf8_lossy(&bytes).trim().parse().ok(),
            _ => None,
        }
    }
}

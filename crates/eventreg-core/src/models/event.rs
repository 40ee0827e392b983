use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Minor currency units (the platform prices everything in whole PKR).
pub type Amount = u64;

/// A selectable sub-competition within an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(transparent)]
pub struct ModuleName(String);

impl ModuleName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for ModuleName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl std::borrow::Borrow<str> for ModuleName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Event {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub location: String,
    pub image_url: Option<String>,
    #[serde(default = "registration_open_default")]
    pub registration_open: bool,
    // The API sends `null` for events created before modules existed
    #[serde(default, deserialize_with = "null_as_default")]
    pub modules: Vec<ModuleName>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub module_amounts: HashMap<ModuleName, Amount>,
    #[serde(default)]
    pub category_name: Option<String>,
    #[serde(default)]
    pub rules: Option<String>,
    #[serde(default)]
    pub prizes: Option<String>,
    #[serde(default)]
    pub deadline: Option<String>,
    #[serde(default)]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default)]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub updated_at: Option<NaiveDateTime>,
}

fn registration_open_default() -> bool {
    true
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Event {
    /// Base price of a module, 0 when the event has no price configured for it.
    pub fn price_of(&self, module: &ModuleName) -> Amount {
        self.module_amounts.get(module).copied().unwrap_or(0)
    }

    pub fn has_module(&self, module: &ModuleName) -> bool {
        self.modules.contains(module)
    }

    /// "Mar 14, 2025 at 6:00 PM" style schedule line for listings.
    pub fn schedule_display(&self) -> String {
        match (self.date.trim(), self.time.trim()) {
            ("", "") => "TBD".to_string(),
            (date, "") => date.to_string(),
            ("", time) => time.to_string(),
            (date, time) => format!("{} at {}", date, time),
        }
    }

    /// One line per module with its price, in the event's module order.
    pub fn module_price_lines(&self) -> Vec<String> {
        self.modules
            .iter()
            .map(|m| format!("{} - {} PKR", m, self.price_of(m)))
            .collect()
    }
}

/// Events that currently accept registrations, in listing order.
pub fn open_for_registration(events: &[Event]) -> Vec<&Event> {
    events.iter().filter(|e| e.registration_open).collect()
}

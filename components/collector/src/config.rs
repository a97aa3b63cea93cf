//! Zone configuration.

use serde::{Deserialize, Serialize};

/// Collection policy knobs.
///
/// The core stores these and hands them to the collector; it does not
/// interpret them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionControl {
    /// Bytes allocated since the last pass before a pass is worth running
    pub collection_threshold: usize,
    /// Run a full pass after this many incremental ones
    pub full_vs_gen_frequency: u32,
    /// Treat every request as a full collection
    pub disable_generational: bool,
    /// Ask the collector to log per-pass detail
    pub log_collections: bool,
}

impl Default for CollectionControl {
    fn default() -> Self {
        CollectionControl {
            collection_threshold: 1024 * 1024,
            full_vs_gen_frequency: 10,
            disable_generational: false,
            log_collections: false,
        }
    }
}

/// Configuration for a [`Zone`](crate::Zone).
///
/// # Examples
///
/// ```
/// use collector::ZoneConfig;
///
/// let config = ZoneConfig::from_json(r#"{ "multithreaded": false }"#).unwrap();
/// assert!(!config.multithreaded);
/// assert_eq!(config.thread_name, "collector");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneConfig {
    /// Run passes on a dedicated collection thread
    pub multithreaded: bool,
    /// Allocator glue should start new objects at reference count one
    pub initial_refcount_to_one: bool,
    /// Weak table slots before the first growth
    pub weak_table_capacity: usize,
    /// Initial capacity of the zone's pointer set and map
    pub pointer_table_capacity: usize,
    /// Name given to the collection thread
    pub thread_name: String,
    /// Policy knobs passed through to the collector
    pub control: CollectionControl,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        ZoneConfig {
            multithreaded: true,
            initial_refcount_to_one: false,
            weak_table_capacity: 64,
            pointer_table_capacity: 64,
            thread_name: "collector".into(),
            control: CollectionControl::default(),
        }
    }
}

impl ZoneConfig {
    /// Default configuration with passes run on the requesting thread.
    pub fn single_threaded() -> Self {
        ZoneConfig {
            multithreaded: false,
            ..Self::default()
        }
    }

    /// Parses a configuration; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

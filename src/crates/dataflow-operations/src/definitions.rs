//! Definitions used by the built-in operations.

use dataflow_core::Definition;

/// Definition names selected by `get_single` / `get_multi`
pub fn get_single_spec() -> Definition {
    Definition::new("get_single_spec", "List[str]")
}

/// A map value
pub fn mapping() -> Definition {
    Definition::new("mapping", "map")
}

/// Keys to follow into a mapping, outermost first
pub fn mapping_traverse() -> Definition {
    Definition::new("mapping_traverse", "List[str]")
}

/// A mapping key
pub fn mapping_key() -> Definition {
    Definition::new("key", "str")
}

/// Any mapping value
pub fn mapping_value() -> Definition {
    Definition::new("value", "generic")
}

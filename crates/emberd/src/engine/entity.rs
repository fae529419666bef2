//! Entity abstraction for emberd
//!
//! All entities (thermostats, cameras) implement the Entity trait.

use super::message::FromIntegrationMessage;

/// Base trait that all entities must implement
pub trait Entity: Send + Sync {
    /// Engine-wide identifier (e.g. "climate.hallway")
    fn entity_id(&self) -> &str;

    /// Return the platform type of this entity (e.g. "climate", "camera")
    fn platform(&self) -> &'static str;

    /// Build the message that reports the current state of this entity to the engine
    fn state_message(&self) -> FromIntegrationMessage;
}

/// Turn a device name into the object id part of an entity id.
///
/// "Living Room (up)" becomes "living_room_up".
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("unnamed");
    }
    slug
}

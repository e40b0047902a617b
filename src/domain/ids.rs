// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Domain identifier types with validation
//!
//! Newtype wrappers keep entity ids, vessel ids, event ids and revisions from
//! being mixed up. All numeric ids are non-negative 64-bit integers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Creates a new id, rejecting negative values
            pub fn new(value: i64) -> Result<Self, String> {
                if value < 0 {
                    return Err(format!("{} cannot be negative: {}", $label, value));
                }
                Ok(Self(value))
            }

            /// Returns the raw integer value
            pub fn value(&self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let value = s
                    .trim()
                    .parse::<i64>()
                    .map_err(|e| format!("Invalid {} '{}': {}", $label, s, e))?;
                Self::new(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> i64 {
                id.0
            }
        }
    };
}

numeric_id!(
    /// Primary key of an audited or denormalized entity
    ///
    /// # Examples
    ///
    /// ```
    /// use datawh::domain::ids::EntityId;
    /// use std::str::FromStr;
    ///
    /// let id = EntityId::from_str("5").unwrap();
    /// assert_eq!(id.value(), 5);
    /// assert!(EntityId::new(-1).is_err());
    /// ```
    EntityId,
    "entity id"
);

numeric_id!(
    /// Point in the audit timeline of the source store
    Revision,
    "revision"
);

numeric_id!(
    /// Identifier of a vessel (tube, plate, rack, flowcell)
    VesselId,
    "vessel id"
);

numeric_id!(
    /// Identifier of a lab event
    EventId,
    "event id"
);

impl From<EventId> for EntityId {
    fn from(id: EventId) -> Self {
        EntityId(id.0)
    }
}

impl From<EntityId> for EventId {
    fn from(id: EntityId) -> Self {
        EventId(id.0)
    }
}

/// Name of an audited entity type, as the change feed knows it
///
/// # Examples
///
/// ```
/// use datawh::domain::ids::EntityType;
///
/// let entity_type = EntityType::new("ProductOrderSample").unwrap();
/// assert_eq!(entity_type.as_str(), "ProductOrderSample");
/// assert!(EntityType::new("  ").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityType(String);

impl EntityType {
    /// Creates a new EntityType from a string
    pub fn new(name: impl Into<String>) -> Result<Self, String> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err("Entity type cannot be empty".to_string());
        }
        if name.chars().any(char::is_whitespace) {
            return Err(format!("Entity type cannot contain whitespace: '{name}'"));
        }
        Ok(Self(name))
    }

    /// Returns the entity type as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for EntityType {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_valid() {
        let id = EntityId::new(12).unwrap();
        assert_eq!(id.value(), 12);
        assert_eq!(id.to_string(), "12");
    }

    #[test]
    fn test_entity_id_negative() {
        assert!(EntityId::new(-5).is_err());
    }

    #[test]
    fn test_revision_from_str() {
        let rev = Revision::from_str(" 42 ").unwrap();
        assert_eq!(rev.value(), 42);
        assert!(Revision::from_str("forty-two").is_err());
    }

    #[test]
    fn test_ids_order_numerically() {
        let mut ids = vec![
            EntityId::new(10).unwrap(),
            EntityId::new(2).unwrap(),
            EntityId::new(7).unwrap(),
        ];
        ids.sort();
        let values: Vec<i64> = ids.iter().map(|id| id.value()).collect();
        assert_eq!(values, vec![2, 7, 10]);
    }

    #[test]
    fn test_event_id_entity_id_conversion() {
        let event = EventId::new(99).unwrap();
        let entity: EntityId = event.into();
        assert_eq!(entity.value(), 99);
        assert_eq!(EventId::from(entity), event);
    }

    #[test]
    fn test_entity_type_rejects_whitespace() {
        assert!(EntityType::new("Lab Event").is_err());
        assert!(EntityType::new("").is_err());
        assert!(EntityType::new("LabEvent").is_ok());
    }

    #[test]
    fn test_serde_transparent() {
        let id = VesselId::new(3).unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "3");
        let back: VesselId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}

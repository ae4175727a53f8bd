use std::fmt;

/// Entity-data-model type tags used on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdmType {
    /// `Edm.String`
    String,
    /// `Edm.Int32`
    Int32,
    /// `Edm.Int64`
    Int64,
    /// `Edm.Double`
    Double,
    /// `Edm.Boolean`
    Boolean,
    /// `Edm.DateTime`
    DateTime,
    /// `Edm.Guid`
    Guid,
}

impl EdmType {
    /// Wire name, e.g. `Edm.Int32`.
    pub fn wire_name(&self) -> &'static str {
        match self {
            EdmType::String => "Edm.String",
            EdmType::Int32 => "Edm.Int32",
            EdmType::Int64 => "Edm.Int64",
            EdmType::Double => "Edm.Double",
            EdmType::Boolean => "Edm.Boolean",
            EdmType::DateTime => "Edm.DateTime",
            EdmType::Guid => "Edm.Guid",
        }
    }

    /// Parse a wire name. Unknown tags return `None`.
    pub fn from_wire_name(name: &str) -> Option<EdmType> {
        match name {
            "Edm.String" => Some(EdmType::String),
            "Edm.Int32" => Some(EdmType::Int32),
            "Edm.Int64" => Some(EdmType::Int64),
            "Edm.Double" => Some(EdmType::Double),
            "Edm.Boolean" => Some(EdmType::Boolean),
            "Edm.DateTime" => Some(EdmType::DateTime),
            "Edm.Guid" => Some(EdmType::Guid),
            _ => None,
        }
    }
}

impl fmt::Display for EdmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// A decoded property value from a query response.
///
/// `Unsupported` marks DateTime and Guid properties: the read path recognizes
/// them but drops their values, while the write path serializes them fully.
/// The asymmetry is deliberate; callers that need those values on the way
/// back must model them as strings.
#[derive(Clone, Debug, PartialEq)]
pub enum EdmValue {
    /// `Edm.String` value, also the default for untyped properties.
    String(String),
    /// `Edm.Int32` value.
    Int32(i32),
    /// `Edm.Int64` value.
    Int64(i64),
    /// `Edm.Double` value.
    Double(f64),
    /// `Edm.Boolean` value.
    Boolean(bool),
    /// Property was present with this type but its value is not decoded.
    Unsupported(EdmType),
}

impl EdmValue {
    /// The EDM type this value decodes.
    pub fn edm_type(&self) -> EdmType {
        match self {
            EdmValue::String(_) => EdmType::String,
            EdmValue::Int32(_) => EdmType::Int32,
            EdmValue::Int64(_) => EdmType::Int64,
            EdmValue::Double(_) => EdmType::Double,
            EdmValue::Boolean(_) => EdmType::Boolean,
            EdmValue::Unsupported(t) => *t,
        }
    }

    /// Borrow the string value, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            EdmValue::String(s) => Some(s),
            _ => None,
        }
    }
}

/// One named, typed property of an entity.
///
/// The value is already rendered to its wire string; the device builds these
/// straight from formatted sensor readings.
#[derive(Clone, Debug, PartialEq)]
pub struct Property {
    /// Property name, becomes the `<d:{name}>` element.
    pub name: String,
    /// Wire representation of the value.
    pub value: String,
    /// EDM type annotated on the element.
    pub edm_type: EdmType,
}

impl Property {
    /// Create a property.
    pub fn new(name: impl Into<String>, value: impl Into<String>, edm_type: EdmType) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            edm_type,
        }
    }
}

/// A table row to insert: identity keys plus ordered properties.
///
/// `(partition_key, row_key)` identify the row within a table; the service
/// rejects a second insert with the same keys with 409. `etag` and
/// `timestamp` are server-assigned and only present after a round trip.
/// Property order is preserved end-to-end; it shapes the serialized XML.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TableEntity {
    /// Partition key.
    pub partition_key: String,
    /// Row key.
    pub row_key: String,
    /// Opaque concurrency token from the last response, if any.
    pub etag: Option<String>,
    /// Server-assigned timestamp, if any.
    pub timestamp: Option<String>,
    /// Ordered properties.
    pub properties: Vec<Property>,
}

impl TableEntity {
    /// Create an entity with the given identity and no properties.
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
            ..Default::default()
        }
    }

    /// Append a property, preserving insertion order.
    pub fn with_property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(EdmType::String, "Edm.String")]
    #[test_case(EdmType::Int32, "Edm.Int32")]
    #[test_case(EdmType::Int64, "Edm.Int64")]
    #[test_case(EdmType::Double, "Edm.Double")]
    #[test_case(EdmType::Boolean, "Edm.Boolean")]
    #[test_case(EdmType::DateTime, "Edm.DateTime")]
    #[test_case(EdmType::Guid, "Edm.Guid")]
    fn test_wire_names_round_trip(t: EdmType, name: &str) {
        assert_eq!(t.wire_name(), name);
        assert_eq!(EdmType::from_wire_name(name), Some(t));
    }

    #[test]
    fn test_unknown_wire_name() {
        assert_eq!(EdmType::from_wire_name("Edm.Binary"), None);
    }

    #[test]
    fn test_entity_preserves_property_order() {
        let entity = TableEntity::new("pk", "rk")
            .with_property(Property::new("T_1", "23.5", EdmType::Double))
            .with_property(Property::new("AM_1", "14:55:12", EdmType::String))
            .with_property(Property::new("Counter", "7", EdmType::Int32));
        let names: Vec<&str> = entity.properties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["T_1", "AM_1", "Counter"]);
    }
}

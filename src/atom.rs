//! Atom+XML codec for the table wire format.
//!
//! The write path renders the fixed envelope the service expects for inserts
//! and table creation. The read path is a streaming token scan over the
//! narrow Atom subset the service emits, not a general XML parser: it
//! assumes well-formed, non-nested `<d:...>` leaf elements and fails closed
//! (empty or partial result) on anything else. Values are emitted verbatim;
//! keys and property values must not contain XML metacharacters.

use chrono::DateTime;
use chrono::Utc;
use log::warn;

use crate::entity::EdmType;
use crate::entity::EdmValue;
use crate::entity::Property;
use crate::entity::TableEntity;
use crate::time::format_atom_timestamp;

const ENTRY_OPEN: &str = r#"<?xml version="1.0" encoding="utf-8" standalone="yes"?><entry xmlns:d="http://schemas.microsoft.com/ado/2007/08/dataservices" xmlns:m="http://schemas.microsoft.com/ado/2007/08/dataservices/metadata" xmlns="http://www.w3.org/2005/Atom">"#;

/// Render the Atom body for an entity insert.
pub fn entity_to_atom(
    entity: &TableEntity,
    table: &str,
    account_name: &str,
    now: DateTime<Utc>,
) -> String {
    let updated = format_atom_timestamp(now);
    let pk = &entity.partition_key;
    let rk = &entity.row_key;
    format!(
        "{ENTRY_OPEN}\
         <id>http://{account_name}.table.core.windows.net/{table}(PartitionKey='{pk}',RowKey='{rk}')</id>\
         <title/><updated>{updated}</updated>\
         <author><name /></author>\
         <content type=\"application/atom+xml\"><m:properties>\
         <d:PartitionKey>{pk}</d:PartitionKey><d:RowKey>{rk}</d:RowKey>\
         {}\
         </m:properties></content></entry>",
        properties_xml(&entity.properties)
    )
}

/// Render the Atom body for table creation.
pub fn table_to_atom(table: &str, account_name: &str, now: DateTime<Utc>) -> String {
    let updated = format_atom_timestamp(now);
    format!(
        "{ENTRY_OPEN}\
         <id>http://{account_name}.table.core.windows.net/Tables('{table}')</id>\
         <title /><updated>{updated}</updated>\
         <author><name/></author>\
         <content type=\"application/xml\"><m:properties>\
         <d:TableName>{table}</d:TableName>\
         </m:properties></content></entry>"
    )
}

fn properties_xml(properties: &[Property]) -> String {
    let mut out = String::new();
    for p in properties {
        out.push_str(&format!(
            "<d:{0} m:type=\"{2}\">{1}</d:{0}>",
            p.name,
            p.value,
            p.edm_type.wire_name()
        ));
    }
    out
}

/// One row decoded from a query response: ordered `(name, value)` pairs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParsedEntity {
    /// Properties in document order, duplicates removed (first wins).
    pub properties: Vec<(String, EdmValue)>,
}

impl ParsedEntity {
    /// Look up a property by name.
    pub fn get(&self, name: &str) -> Option<&EdmValue> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// The row's partition key, when the response carried one.
    pub fn partition_key(&self) -> Option<&str> {
        self.get("PartitionKey").and_then(EdmValue::as_str)
    }

    /// The row's row key, when the response carried one.
    pub fn row_key(&self) -> Option<&str> {
        self.get("RowKey").and_then(EdmValue::as_str)
    }
}

/// Decode every `<m:properties>` span of a query response, in document order.
///
/// Malformed input yields however many rows were scanned cleanly, never a
/// panic.
pub fn parse_entities(xml: &str) -> Vec<ParsedEntity> {
    let mut entities = Vec::new();
    let mut cursor = 0;
    while let Some((span, next)) = next_token(xml, "<m:properties>", "</m:properties>", cursor) {
        entities.push(parse_properties_span(span));
        cursor = next;
    }
    entities
}

fn parse_properties_span(span: &str) -> ParsedEntity {
    let mut entity = ParsedEntity::default();
    let mut cursor = 0;
    while let Some((token, next)) = next_token(span, "<d:", "</d", cursor) {
        cursor = next;

        // token looks like `Name m:type="Edm.Int32">value`
        let Some((open_tag, raw_value)) = token.split_once('>') else {
            continue;
        };
        let name = open_tag.split(' ').next().unwrap_or(open_tag);
        // Self-closing or otherwise odd tags have no clean name.
        if name.is_empty() || name.ends_with('/') {
            continue;
        }
        if entity.properties.iter().any(|(n, _)| n == name) {
            // First occurrence wins.
            continue;
        }

        let edm_type = next_token(open_tag, "m:type=\"", "\"", 0)
            .and_then(|(t, _)| EdmType::from_wire_name(t))
            .unwrap_or(EdmType::String);

        let value = match decode_value(edm_type, raw_value) {
            Some(v) => v,
            None => {
                warn!("dropping property {name}: unparseable {edm_type} value");
                continue;
            }
        };
        entity.properties.push((name.to_string(), value));
    }
    entity
}

fn decode_value(edm_type: EdmType, raw: &str) -> Option<EdmValue> {
    match edm_type {
        EdmType::String => Some(EdmValue::String(raw.to_string())),
        EdmType::Int32 => raw.parse().ok().map(EdmValue::Int32),
        EdmType::Int64 => raw.parse().ok().map(EdmValue::Int64),
        EdmType::Double => raw.parse().ok().map(EdmValue::Double),
        EdmType::Boolean => Some(EdmValue::Boolean(raw == "true")),
        // Values intentionally dropped on the read path.
        EdmType::DateTime | EdmType::Guid => Some(EdmValue::Unsupported(edm_type)),
    }
}

/// Find the text between `start_token` and `end_token` at or after `from`.
/// Returns the inner slice and the byte index just past the end token.
fn next_token<'a>(
    haystack: &'a str,
    start_token: &str,
    end_token: &str,
    from: usize,
) -> Option<(&'a str, usize)> {
    if from >= haystack.len() {
        return None;
    }
    let start = haystack[from..].find(start_token)? + from + start_token.len();
    let end = haystack[start..].find(end_token)? + start;
    Some((&haystack[start..end], end + end_token.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 6, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_entity_envelope_shape() {
        let entity = TableEntity::new("D_2021", "2518389032")
            .with_property(Property::new("T_1", "23.5", EdmType::Double));
        let xml = entity_to_atom(&entity, "AnalogValues", "roschmi01", fixed_now());

        assert!(xml.starts_with("<?xml version=\"1.0\""));
        assert!(xml.contains(
            "<id>http://roschmi01.table.core.windows.net/AnalogValues(PartitionKey='D_2021',RowKey='2518389032')</id>"
        ));
        assert!(xml.contains("<updated>2021-06-15T12:00:00.0000000Z</updated>"));
        // PartitionKey and RowKey are not type annotated.
        assert!(xml.contains("<d:PartitionKey>D_2021</d:PartitionKey>"));
        assert!(xml.contains("<d:RowKey>2518389032</d:RowKey>"));
        assert!(xml.contains("<d:T_1 m:type=\"Edm.Double\">23.5</d:T_1>"));
    }

    #[test]
    fn test_table_envelope_shape() {
        let xml = table_to_atom("AnalogValues", "roschmi01", fixed_now());
        assert!(xml.contains("<id>http://roschmi01.table.core.windows.net/Tables('AnalogValues')</id>"));
        assert!(xml.contains("<d:TableName>AnalogValues</d:TableName>"));
    }

    #[test]
    fn test_serialized_property_order_follows_insertion_order() {
        let entity = TableEntity::new("pk", "rk")
            .with_property(Property::new("B", "2", EdmType::Int32))
            .with_property(Property::new("A", "1", EdmType::Int32));
        let xml = entity_to_atom(&entity, "t", "a", fixed_now());
        let b_at = xml.find("<d:B").unwrap();
        let a_at = xml.find("<d:A").unwrap();
        assert!(b_at < a_at);
    }

    #[test]
    fn test_round_trip_through_the_parser() {
        let entity = TableEntity::new("D_2021", "2518389032")
            .with_property(Property::new("T_1", "23.5", EdmType::Double))
            .with_property(Property::new("Sampled", "14:55:12", EdmType::String))
            .with_property(Property::new("Count", "7", EdmType::Int32))
            .with_property(Property::new("Total", "8589934592", EdmType::Int64))
            .with_property(Property::new("On", "true", EdmType::Boolean));
        let xml = entity_to_atom(&entity, "AnalogValues", "roschmi01", fixed_now());

        let parsed = parse_entities(&xml);
        assert_eq!(parsed.len(), 1);
        let row = &parsed[0];
        assert_eq!(row.partition_key(), Some("D_2021"));
        assert_eq!(row.row_key(), Some("2518389032"));
        assert_eq!(row.get("T_1"), Some(&EdmValue::Double(23.5)));
        assert_eq!(
            row.get("Sampled"),
            Some(&EdmValue::String("14:55:12".to_string()))
        );
        assert_eq!(row.get("Count"), Some(&EdmValue::Int32(7)));
        assert_eq!(row.get("Total"), Some(&EdmValue::Int64(8_589_934_592)));
        assert_eq!(row.get("On"), Some(&EdmValue::Boolean(true)));
    }

    #[test]
    fn test_datetime_and_guid_values_are_recognized_but_dropped() {
        let entity = TableEntity::new("pk", "rk")
            .with_property(Property::new(
                "Stamp",
                "2021-06-15T12:00:00.0000000Z",
                EdmType::DateTime,
            ))
            .with_property(Property::new(
                "Id",
                "7f1c60f5-27a3-4e0e-8f20-b1c654a1cdb2",
                EdmType::Guid,
            ));
        let xml = entity_to_atom(&entity, "t", "a", fixed_now());
        let parsed = parse_entities(&xml);
        let row = &parsed[0];

        // Present by name, value intentionally not decoded.
        assert_eq!(row.get("Stamp"), Some(&EdmValue::Unsupported(EdmType::DateTime)));
        assert_eq!(row.get("Id"), Some(&EdmValue::Unsupported(EdmType::Guid)));
    }

    #[test]
    fn test_two_property_blocks_parse_in_document_order() {
        let xml = r#"<?xml version="1.0"?><feed>
            <entry><content><m:properties>
                <d:PartitionKey>p1</d:PartitionKey><d:RowKey>r1</d:RowKey>
                <d:Value m:type="Edm.Int32">11</d:Value>
            </m:properties></content></entry>
            <entry><content><m:properties>
                <d:PartitionKey>p2</d:PartitionKey><d:RowKey>r2</d:RowKey>
                <d:Value m:type="Edm.Double">2.5</d:Value>
            </m:properties></content></entry>
        </feed>"#;
        let parsed = parse_entities(xml);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].row_key(), Some("r1"));
        assert_eq!(parsed[0].get("Value"), Some(&EdmValue::Int32(11)));
        assert_eq!(parsed[1].row_key(), Some("r2"));
        assert_eq!(parsed[1].get("Value"), Some(&EdmValue::Double(2.5)));
    }

    #[test]
    fn test_missing_type_attribute_defaults_to_string() {
        let xml = "<m:properties><d:Note>hello</d:Note></m:properties>";
        let parsed = parse_entities(xml);
        assert_eq!(
            parsed[0].get("Note"),
            Some(&EdmValue::String("hello".to_string()))
        );
    }

    #[test]
    fn test_attribute_order_does_not_matter() {
        let xml = r#"<m:properties><d:N other="x" m:type="Edm.Int64">9</d:N></m:properties>"#;
        let parsed = parse_entities(xml);
        assert_eq!(parsed[0].get("N"), Some(&EdmValue::Int64(9)));
    }

    #[test]
    fn test_duplicate_property_first_occurrence_wins() {
        let xml = r#"<m:properties>
            <d:V m:type="Edm.Int32">1</d:V>
            <d:V m:type="Edm.Int32">2</d:V>
        </m:properties>"#;
        let parsed = parse_entities(xml);
        assert_eq!(parsed[0].properties.len(), 1);
        assert_eq!(parsed[0].get("V"), Some(&EdmValue::Int32(1)));
    }

    #[test]
    fn test_unparseable_number_drops_the_property_only() {
        let xml = r#"<m:properties>
            <d:Bad m:type="Edm.Int32">oops</d:Bad>
            <d:Good m:type="Edm.Int32">3</d:Good>
        </m:properties>"#;
        let parsed = parse_entities(xml);
        assert_eq!(parsed[0].get("Bad"), None);
        assert_eq!(parsed[0].get("Good"), Some(&EdmValue::Int32(3)));
    }

    #[test]
    fn test_boolean_anything_but_true_is_false() {
        let xml = r#"<m:properties><d:B m:type="Edm.Boolean">TRUE</d:B></m:properties>"#;
        let parsed = parse_entities(xml);
        assert_eq!(parsed[0].get("B"), Some(&EdmValue::Boolean(false)));
    }

    #[test]
    fn test_malformed_input_fails_closed() {
        assert_eq!(parse_entities(""), vec![]);
        assert_eq!(parse_entities("<m:properties>never closed"), vec![]);
        assert_eq!(parse_entities("{\"odata.metadata\":\"...\"}"), vec![]);
        // A truncated property span yields the rows scanned before it.
        let xml = "<m:properties><d:A>1</d:A></m:properties><m:properties><d:B";
        let parsed = parse_entities(xml);
        assert_eq!(parsed.len(), 1);
    }
}

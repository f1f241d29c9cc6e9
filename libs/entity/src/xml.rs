//! Parses an asset body's raw XML into an [`Entity`] tree (§4.3.3's "parse
//! `body` as XML against the asset factory"). This is a generic
//! attribute/element walk, not a schema-aware factory: callers that need
//! validated, typed properties still run the result through a [`crate::Factory`].

use crate::entity::Entity;
use crate::error::EntityError;
use crate::value::Value;
use roxmltree::Node;

/// Parses `xml` and returns the [`Entity`] built from its root element.
///
/// The root element's tag becomes the entity's `name`; its namespace (if
/// any) and local name are recorded via [`Entity::set_qname`]. Attributes
/// become scalar string properties. A leaf child with no attributes and no
/// element children becomes a string property keyed by its tag; a child with
/// structure becomes a nested `Value::Entity`. A tag repeated among siblings
/// collapses to a `Value::EntityList` under that tag name instead of
/// overwriting itself.
pub fn parse_asset_body(xml: &str) -> Result<Entity, EntityError> {
    let doc = roxmltree::Document::parse(xml)
        .map_err(|e| EntityError::Structural(format!("xml parse error: {e}")))?;
    Ok(entity_from_node(doc.root_element()))
}

fn entity_from_node(node: Node) -> Entity {
    let mut entity = Entity::new(node.tag_name().name().to_string());
    if let Some(ns) = node.tag_name().namespace() {
        entity.set_qname(ns.to_string(), node.tag_name().name().to_string());
    }

    for attr in node.attributes() {
        entity.set(attr.name().to_string(), Value::String(attr.value().to_string()));
    }

    let children: Vec<Node> = node.children().filter(|c| c.is_element()).collect();
    if children.is_empty() {
        if let Some(text) = node.text() {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                entity.set("VALUE", Value::String(trimmed.to_string()));
            }
        }
        return entity;
    }

    let mut grouped: Vec<(String, Vec<Entity>)> = Vec::new();
    for child in children {
        let tag = child.tag_name().name().to_string();
        let child_entity = entity_from_node(child);
        match grouped.iter_mut().find(|(name, _)| *name == tag) {
            Some((_, entities)) => entities.push(child_entity),
            None => grouped.push((tag, vec![child_entity])),
        }
    }

    for (tag, mut entities) in grouped {
        if entities.len() == 1 {
            entity.set(tag, Value::Entity(Box::new(entities.remove(0))));
        } else {
            entity.set(tag, Value::EntityList(entities));
        }
    }

    entity
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_become_string_properties() {
        let entity = parse_asset_body(r#"<CuttingTool assetId="T1" serialNumber="S1"/>"#).unwrap();
        assert_eq!(entity.name, "CuttingTool");
        assert_eq!(entity.get("assetId"), Value::String("T1".into()));
        assert_eq!(entity.get("serialNumber"), Value::String("S1".into()));
    }

    #[test]
    fn namespaced_root_sets_qname() {
        let xml = r#"<m:CuttingTool xmlns:m="urn:mtconnect.org:MTConnectAssets:2.0" assetId="T1"/>"#;
        let entity = parse_asset_body(xml).unwrap();
        assert_eq!(
            entity.qname,
            Some(("urn:mtconnect.org:MTConnectAssets:2.0".to_string(), "CuttingTool".to_string()))
        );
    }

    #[test]
    fn repeated_child_tag_becomes_entity_list() {
        let xml = r#"<CuttingTool assetId="T1">
            <CuttingLifeCycle>
                <Measurements>
                    <Measurement type="LENGTH" value="10"/>
                    <Measurement type="DIAMETER" value="5"/>
                </Measurements>
            </CuttingLifeCycle>
        </CuttingTool>"#;
        let entity = parse_asset_body(xml).unwrap();
        let lifecycle = match entity.get("CuttingLifeCycle") {
            Value::Entity(e) => *e,
            other => panic!("expected nested entity, got {other:?}"),
        };
        let measurements = match lifecycle.get("Measurements") {
            Value::Entity(e) => *e,
            other => panic!("expected nested entity, got {other:?}"),
        };
        match measurements.get("Measurement") {
            Value::EntityList(list) => assert_eq!(list.len(), 2),
            other => panic!("expected entity list, got {other:?}"),
        }
    }

    #[test]
    fn leaf_text_becomes_value_property() {
        let xml = r#"<CuttingTool assetId="T1"><Note>worn edge</Note></CuttingTool>"#;
        let entity = parse_asset_body(xml).unwrap();
        let note = match entity.get("Note") {
            Value::Entity(e) => *e,
            other => panic!("expected nested entity, got {other:?}"),
        };
        assert_eq!(note.get("VALUE"), Value::String("worn edge".to_string()));
    }

    #[test]
    fn malformed_xml_is_rejected() {
        assert!(parse_asset_body("<CuttingTool assetId=\"T1\">").is_err());
    }
}

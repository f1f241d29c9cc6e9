use crate::entity::{Entity, LIST_PROPERTY};
use crate::error::EntityError;
use crate::value::{Value, ValueKind};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Declares one property a [`Factory`] expects: its value kind, whether it
/// is optional, an allowed controlled vocabulary (empty = unrestricted), and
/// for list-shaped properties the allowed cardinality.
#[derive(Clone)]
pub struct Requirement {
    pub name: String,
    pub kind: ValueKind,
    pub optional: bool,
    pub vocabulary: Vec<String>,
    pub cardinality: Option<(usize, usize)>,
    pub nested_factory: Option<Arc<Factory>>,
}

impl Requirement {
    pub fn scalar(name: impl Into<String>, kind: ValueKind) -> Self {
        Requirement {
            name: name.into(),
            kind,
            optional: false,
            vocabulary: Vec::new(),
            cardinality: None,
            nested_factory: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_vocabulary(mut self, vocab: Vec<String>) -> Self {
        self.vocabulary = vocab;
        self
    }

    pub fn list(
        name: impl Into<String>,
        min: usize,
        max: usize,
        factory: Arc<Factory>,
    ) -> Self {
        Requirement {
            name: name.into(),
            kind: ValueKind::EntityList,
            optional: min == 0,
            vocabulary: Vec::new(),
            cardinality: Some((min, max)),
            nested_factory: Some(factory),
        }
    }
}

enum ChildMatcher {
    Literal(String, Arc<Factory>),
    Pattern(Regex, Arc<Factory>),
}

/// Binds an entity name to the set of properties it expects and (optionally)
/// child-entity factories matched by literal name or regex.
#[derive(Default)]
pub struct Factory {
    pub entity_name: String,
    requirements: Vec<Requirement>,
    children: Vec<ChildMatcher>,
}

impl Factory {
    pub fn new(entity_name: impl Into<String>) -> Self {
        Factory {
            entity_name: entity_name.into(),
            requirements: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn require(mut self, req: Requirement) -> Self {
        self.requirements.push(req);
        self
    }

    pub fn register_child(mut self, literal_name: impl Into<String>, factory: Arc<Factory>) -> Self {
        self.children.push(ChildMatcher::Literal(literal_name.into(), factory));
        self
    }

    pub fn register_child_pattern(mut self, pattern: &str, factory: Arc<Factory>) -> Self {
        let re = Regex::new(pattern).expect("valid child-factory pattern");
        self.children.push(ChildMatcher::Pattern(re, factory));
        self
    }

    fn find_child(&self, name: &str) -> Option<&Arc<Factory>> {
        for child in &self.children {
            match child {
                ChildMatcher::Literal(n, f) if n == name => return Some(f),
                ChildMatcher::Pattern(re, f) if re.is_match(name) => return Some(f),
                _ => {}
            }
        }
        None
    }

    /// Validates each declared requirement in order, converting supplied
    /// values to their declared kind where needed, and accumulating errors.
    /// Returns `None` if any required property is missing or the supplied
    /// property set contains an unexpected key.
    pub fn create(
        &self,
        name: &str,
        mut supplied: BTreeMap<String, Value>,
        errors: &mut Vec<EntityError>,
    ) -> Option<Entity> {
        let mut entity = Entity::new(name);
        let before = errors.len();

        for req in &self.requirements {
            match supplied.remove(&req.name) {
                None => {
                    if !req.optional {
                        errors.push(EntityError::MissingRequiredProperty {
                            entity: self.entity_name.clone(),
                            property: req.name.clone(),
                        });
                    }
                }
                Some(value) => {
                    if req.kind == ValueKind::EntityList {
                        if let Value::EntityList(list) = &value {
                            if let Some((min, max)) = req.cardinality {
                                if list.len() < min || list.len() > max {
                                    errors.push(EntityError::CardinalityViolation {
                                        property: req.name.clone(),
                                        min,
                                        max,
                                        actual: list.len(),
                                    });
                                }
                            }
                        }
                        entity.set(LIST_PROPERTY, value);
                        continue;
                    }
                    match value.convert(req.kind, &req.name) {
                        Ok(converted) => {
                            if !req.vocabulary.is_empty() {
                                if let Some(s) = converted.as_str() {
                                    if !req.vocabulary.iter().any(|v| v == s) {
                                        errors.push(EntityError::NotInVocabulary {
                                            property: req.name.clone(),
                                        });
                                    }
                                }
                            }
                            entity.set(req.name.clone(), converted);
                        }
                        Err(e) => errors.push(e),
                    }
                }
            }
        }

        for (key, value) in supplied {
            if self.find_child(&key).is_some() {
                entity.set(key, value);
            } else {
                errors.push(EntityError::UnexpectedProperty {
                    entity: self.entity_name.clone(),
                    property: key,
                });
            }
        }

        if errors.len() > before {
            None
        } else {
            Some(entity)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_required_fails() {
        let f = Factory::new("Sample").require(Requirement::scalar("VALUE", ValueKind::Double));
        let mut errors = Vec::new();
        let result = f.create("Sample", BTreeMap::new(), &mut errors);
        assert!(result.is_none());
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn unexpected_property_fails() {
        let f = Factory::new("Sample");
        let mut supplied = BTreeMap::new();
        supplied.insert("bogus".to_string(), Value::Int(1));
        let mut errors = Vec::new();
        let result = f.create("Sample", supplied, &mut errors);
        assert!(result.is_none());
    }

    #[test]
    fn conversion_applied() {
        let f = Factory::new("Sample").require(Requirement::scalar("VALUE", ValueKind::Double));
        let mut supplied = BTreeMap::new();
        supplied.insert("VALUE".to_string(), Value::String("1.5".into()));
        let mut errors = Vec::new();
        let result = f.create("Sample", supplied, &mut errors).unwrap();
        assert_eq!(result.get("VALUE"), Value::Double(1.5));
    }
}

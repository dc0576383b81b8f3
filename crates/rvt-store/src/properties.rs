use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use rvt_types::{NodeRef, VersionId};

use crate::error::{StoreError, StoreResult};
use crate::node::{DataValue, Node};
use crate::store::NodeStore;

/// A revision property value, stored as its own data leaf.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyValue {
    Text(String),
    Boolean(bool),
    Number(i64),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{s}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

impl NodeStore {
    /// Create an empty property list.
    pub fn create_list(&mut self, version: VersionId) -> StoreResult<NodeRef> {
        self.push(version, Node::Data(DataValue::List(BTreeMap::new())))
    }

    fn list(&self, props: NodeRef) -> StoreResult<&BTreeMap<String, NodeRef>> {
        match self.node(props)? {
            Node::Data(DataValue::List(entries)) => Ok(entries),
            _ => Err(StoreError::NotList(props)),
        }
    }

    /// Set `name` to `value`, returning a new property list. The old list is
    /// left untouched.
    pub fn set_property(
        &mut self,
        version: VersionId,
        props: NodeRef,
        name: &str,
        value: PropertyValue,
    ) -> StoreResult<NodeRef> {
        self.check_writable(version)?;
        let mut entries = self.list(props)?.clone();
        let leaf = match value {
            PropertyValue::Text(s) => self.create_text(version, s.as_bytes())?,
            PropertyValue::Boolean(b) => self.push(version, Node::Data(DataValue::Boolean(b)))?,
            PropertyValue::Number(n) => self.push(version, Node::Data(DataValue::Number(n)))?,
        };
        entries.insert(name.to_string(), leaf);
        self.push(version, Node::Data(DataValue::List(entries)))
    }

    /// Return a new property list without `name`.
    pub fn remove_property(
        &mut self,
        version: VersionId,
        props: NodeRef,
        name: &str,
    ) -> StoreResult<NodeRef> {
        self.check_writable(version)?;
        let mut entries = self.list(props)?.clone();
        if entries.remove(name).is_none() {
            return Ok(props);
        }
        self.push(version, Node::Data(DataValue::List(entries)))
    }

    pub fn get_property(&self, props: NodeRef, name: &str) -> StoreResult<Option<PropertyValue>> {
        match self.list(props)?.get(name) {
            Some(leaf) => self.property_value(*leaf).map(Some),
            None => Ok(None),
        }
    }

    /// Property names in sorted order.
    pub fn property_names(&self, props: NodeRef) -> StoreResult<Vec<String>> {
        Ok(self.list(props)?.keys().cloned().collect())
    }

    /// All properties, resolved.
    pub fn property_map(&self, props: NodeRef) -> StoreResult<BTreeMap<String, PropertyValue>> {
        self.list(props)?
            .iter()
            .map(|(name, leaf)| Ok((name.clone(), self.property_value(*leaf)?)))
            .collect()
    }

    fn property_value(&self, leaf: NodeRef) -> StoreResult<PropertyValue> {
        match self.node(leaf)? {
            Node::Data(DataValue::Text(bytes)) => {
                Ok(PropertyValue::Text(String::from_utf8_lossy(bytes).into_owned()))
            }
            Node::Data(DataValue::Boolean(b)) => Ok(PropertyValue::Boolean(*b)),
            Node::Data(DataValue::Number(n)) => Ok(PropertyValue::Number(*n)),
            _ => Err(self.corrupt(leaf)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (NodeStore, VersionId, NodeRef) {
        let mut store = NodeStore::new();
        let v = store.open_version();
        let props = store.create_list(v).unwrap();
        (store, v, props)
    }

    #[test]
    fn set_and_get() {
        let (mut store, v, props) = setup();
        let props = store
            .set_property(v, props, "syntax", PropertyValue::Text("rust".into()))
            .unwrap();
        let props = store
            .set_property(v, props, "tab_width", PropertyValue::Number(4))
            .unwrap();
        let props = store
            .set_property(v, props, "soft_tabs", PropertyValue::Boolean(true))
            .unwrap();

        assert_eq!(
            store.get_property(props, "syntax").unwrap(),
            Some(PropertyValue::Text("rust".into()))
        );
        assert_eq!(
            store.get_property(props, "tab_width").unwrap(),
            Some(PropertyValue::Number(4))
        );
        assert_eq!(store.get_property(props, "missing").unwrap(), None);
        assert_eq!(
            store.property_names(props).unwrap(),
            vec!["soft_tabs", "syntax", "tab_width"]
        );
    }

    #[test]
    fn lists_are_copy_on_write() {
        let (mut store, v, empty) = setup();
        let one = store
            .set_property(v, empty, "a", PropertyValue::Number(1))
            .unwrap();
        assert!(store.property_names(empty).unwrap().is_empty());
        assert_eq!(store.property_names(one).unwrap(), vec!["a"]);

        let removed = store.remove_property(v, one, "a").unwrap();
        assert!(store.property_map(removed).unwrap().is_empty());
        assert_eq!(store.remove_property(v, removed, "a").unwrap(), removed);
    }

    #[test]
    fn text_node_is_not_a_list() {
        let (mut store, v, _) = setup();
        let text = store.create_text(v, b"abc").unwrap();
        assert!(matches!(
            store.get_property(text, "x"),
            Err(StoreError::NotList(_))
        ));
    }

    #[test]
    fn frozen_list_rejects_set() {
        let (mut store, v, props) = setup();
        store.freeze(v).unwrap();
        assert!(matches!(
            store.set_property(v, props, "a", PropertyValue::Boolean(false)),
            Err(StoreError::Frozen(_))
        ));
    }

    #[test]
    fn display_values() {
        assert_eq!(PropertyValue::Text("x".into()).to_string(), "x");
        assert_eq!(PropertyValue::Number(-3).to_string(), "-3");
        assert_eq!(PropertyValue::Boolean(true).to_string(), "true");
    }
}

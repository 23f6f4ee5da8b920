//! Hypermedia resources and links.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

use crate::template::{ParamSource, express};
use crate::{Error, Result};

/// A hypermedia link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Link relation, e.g. `self` or `alternate`.
    pub rel: String,
    /// Target URL.
    pub href: String,
    /// Extra attributes such as `title` or `type`.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Link {
    /// Create a link.
    pub fn new(rel: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            rel: rel.into(),
            href: href.into(),
            attributes: Map::new(),
        }
    }

    /// Create a link whose href is expanded from a URL template.
    pub fn templated(rel: impl Into<String>, template: &str, params: &dyn ParamSource) -> Self {
        Self::new(rel, express(template, params))
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Resolve a relative href against `base`.
    pub fn resolve(&self, base: &url::Url) -> Result<Link> {
        let href = base
            .join(&self.href)
            .map_err(|e| Error::runtime(format!("Invalid link href: {e}")).with_source(e))?;
        Ok(Self {
            href: href.to_string(),
            ..self.clone()
        })
    }

    /// Look up a field by name; `rel` and `href` first, then attributes.
    pub fn field(&self, name: &str) -> Option<Value> {
        match name {
            "rel" => Some(Value::String(self.rel.clone())),
            "href" => Some(Value::String(self.href.clone())),
            other => self.attributes.get(other).cloned(),
        }
    }
}

type LinkPredicate = Arc<dyn Fn(&Link) -> bool + Send + Sync>;

/// Query used to select links from a [`Resource`].
#[derive(Clone, Default)]
pub struct LinkQuery {
    filter: Option<LinkPredicate>,
    matching: Vec<(String, Value)>,
}

impl LinkQuery {
    /// Query selecting every link.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep links for which `predicate` returns true.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Link) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(predicate));
        self
    }

    /// Keep links whose field `key` equals `value`. Pairs accumulate.
    pub fn matching(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.matching.push((key.into(), value.into()));
        self
    }

    fn accepts(&self, link: &Link) -> bool {
        if let Some(filter) = &self.filter
            && !filter(link)
        {
            return false;
        }
        self.matching
            .iter()
            .all(|(key, value)| link.field(key).as_ref() == Some(value))
    }
}

impl fmt::Debug for LinkQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkQuery")
            .field("filter", &self.filter.is_some())
            .field("matching", &self.matching)
            .finish()
    }
}

/// Wire shape of a resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Data fields.
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Hypermedia links.
    #[serde(default)]
    pub links: Vec<Link>,
    /// Opaque metadata.
    #[serde(default)]
    pub meta: Map<String, Value>,
}

impl ResourceSpec {
    /// Spec with data only.
    pub fn with_data(data: Map<String, Value>) -> Self {
        Self {
            data,
            ..Default::default()
        }
    }

    /// Add a link.
    pub fn link(mut self, link: Link) -> Self {
        self.links.push(link);
        self
    }

    /// Add a meta entry.
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }
}

/// Immutable view over resource data, links and metadata.
///
/// Only the data fields are serialized, so a data field may share a name with
/// an accessor (`links`, `getLinks`, ...) without conflict.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    data: Map<String, Value>,
    links: Vec<Link>,
    meta: Map<String, Value>,
}

impl Resource {
    /// Build a resource from its spec.
    pub fn new(spec: ResourceSpec) -> Self {
        Self {
            data: spec.data,
            links: spec.links,
            meta: spec.meta,
        }
    }

    /// Parse the `{ data, links, meta }` wire shape.
    pub fn from_json(value: Value) -> Result<Self> {
        let spec: ResourceSpec = serde_json::from_value(value)
            .map_err(|e| Error::parse("Malformed resource").with_source(e))?;
        Ok(Self::new(spec))
    }

    /// Read a data field.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    /// All data fields.
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Consume the resource, returning its data fields.
    pub fn into_data(self) -> Map<String, Value> {
        self.data
    }

    /// Links selected by `query`. Always a fresh copy.
    pub fn links(&self, query: &LinkQuery) -> Vec<Link> {
        self.links
            .iter()
            .filter(|link| query.accepts(link))
            .cloned()
            .collect()
    }

    /// Every link, in order. Always a fresh copy.
    pub fn all_links(&self) -> Vec<Link> {
        self.links.clone()
    }

    /// First link with relation `rel`.
    pub fn link(&self, rel: &str) -> Option<&Link> {
        self.links.iter().find(|link| link.rel == rel)
    }

    /// Metadata as provided at construction.
    pub fn meta(&self) -> &Map<String, Value> {
        &self.meta
    }

    /// Back to the wire shape.
    pub fn to_spec(&self) -> ResourceSpec {
        ResourceSpec {
            data: self.data.clone(),
            links: self.links.clone(),
            meta: self.meta.clone(),
        }
    }
}

impl From<ResourceSpec> for Resource {
    fn from(spec: ResourceSpec) -> Self {
        Self::new(spec)
    }
}

impl Serialize for Resource {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.data.serialize(serializer)
    }
}

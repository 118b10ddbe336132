//! Variable trees reported by `context_get`, `property_get` and `eval`.
//!
//! Each `property` element is turned into a [`Property`], its nested `property`
//! elements into children. Nodes live in an arena owned by [`PropertyTree`],
//! parent links are arena indexes.

use crate::error::{Error, Result};
use crate::language::Language;
use crate::muted_error;
use base64::Engine as _;
use roxmltree::Node;
use std::string::FromUtf8Error;

pub(crate) const PROPERTY_TAG: &str = "property";

#[derive(Debug, thiserror::Error)]
pub(crate) enum DecodeError {
    #[error("base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("decoded base64 is not utf-8: {0}")]
    Utf8(#[from] FromUtf8Error),
}

/// Decode base64 text, ignoring line breaks and other whitespace inside it.
pub(crate) fn decode_base64(text: &str) -> Result<String, DecodeError> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD.decode(compact)?;
    Ok(String::from_utf8(bytes)?)
}

/// Index of a property inside its [`PropertyTree`], or inside a list made by [`PropertyTree::flatten`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct PropertyId(usize);

impl PropertyId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Single variable, or a member of one.
#[derive(Clone, PartialEq, Debug)]
pub struct Property {
    /// `classname` attribute, else `type`, else `unknown`.
    pub ty: String,
    pub display_name: String,
    pub size: Option<usize>,
    pub encoding: Option<String>,
    /// Decoded value, back-tick quoted for string types. Empty for containers.
    pub value: String,
    /// Number of line breaks in the value before quoting.
    pub newlines: usize,
    pub depth: usize,
    pub parent: Option<PropertyId>,
    pub children: Vec<PropertyId>,
    /// Number of children the engine announced, may exceed the number actually sent.
    pub declared_children: usize,
    /// True for the last child of its parent, used to draw closing tree connectors.
    pub is_last_child: bool,
}

impl Property {
    pub fn has_children(&self) -> bool {
        self.declared_children > 0
    }

    pub fn is_uninitialized(&self) -> bool {
        self.ty == "uninitialized"
    }

    /// Label like `array [3]` or `string [5]`, or just the type when the size is unknown.
    pub fn type_and_size(&self) -> String {
        let size = if self.has_children() {
            Some(self.declared_children)
        } else {
            self.size
        };
        match size {
            Some(size) => format!("{} [{size}]", self.ty),
            None => self.ty.clone(),
        }
    }
}

/// How display names are composed.
#[derive(Clone, Copy, Debug)]
pub enum Naming<'a> {
    /// Names are taken from the `fullname` the engine reports.
    Context,
    /// Names are derived from the evaluated expression, following the language conventions.
    Eval { code: &'a str, language: &'a Language },
}

/// Display name of a non-root property produced by `eval`.
///
/// `name` is the short member name, `fullname` the engine provided full name if any.
pub fn eval_display_name(
    language: &Language,
    parent: &Property,
    name: &str,
    fullname: Option<&str>,
) -> String {
    let parent_name = &parent.display_name;
    match language {
        Language::Php if parent.ty == "array" => {
            if !name.is_empty() && name.chars().all(|c| c.is_ascii_digit()) {
                format!("{parent_name}[{name}]")
            } else {
                format!("{parent_name}['{name}']")
            }
        }
        Language::Php => format!("{parent_name}->{name}"),
        Language::Perl => fullname.unwrap_or_default().to_string(),
        _ if parent.ty == "list" => format!("{parent_name}{name}"),
        _ => format!("{parent_name}.{name}"),
    }
}

/// Tree of properties built from one top-level `property` element.
#[derive(Clone, PartialEq, Debug)]
pub struct PropertyTree {
    nodes: Vec<Property>,
}

impl PropertyTree {
    /// Build a tree from a `property` element, `ns` is the namespace of the response.
    pub fn build(node: Node<'_, '_>, ns: &str, naming: Naming<'_>) -> Result<Self> {
        let mut builder = TreeBuilder {
            ns,
            naming,
            nodes: vec![],
        };
        builder.build_node(node, None, 0)?;
        Ok(PropertyTree {
            nodes: builder.nodes,
        })
    }

    pub fn root(&self) -> &Property {
        &self.nodes[0]
    }

    pub fn root_id(&self) -> PropertyId {
        PropertyId(0)
    }

    pub fn get(&self, id: PropertyId) -> &Property {
        &self.nodes[id.0]
    }

    pub fn parent(&self, id: PropertyId) -> Option<&Property> {
        self.get(id).parent.map(|p| self.get(p))
    }

    pub fn children(&self, id: PropertyId) -> impl Iterator<Item = (PropertyId, &Property)> {
        self.get(id).children.iter().map(|&c| (c, self.get(c)))
    }

    /// All properties, each parent followed by its descendants.
    pub fn iter(&self) -> impl Iterator<Item = (PropertyId, &Property)> {
        self.nodes.iter().enumerate().map(|(i, p)| (PropertyId(i), p))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Concatenate trees into a single list, each parent followed by its descendants.
    /// Parent and children links are shifted so they index the returned list.
    pub fn flatten(trees: Vec<PropertyTree>) -> Vec<Property> {
        let mut list = Vec::with_capacity(trees.iter().map(PropertyTree::len).sum());
        for tree in trees {
            let base = list.len();
            list.extend(tree.nodes.into_iter().map(|mut prop| {
                prop.parent = prop.parent.map(|id| PropertyId(id.0 + base));
                prop.children.iter_mut().for_each(|id| id.0 += base);
                prop
            }));
        }
        list
    }
}

struct TreeBuilder<'a> {
    ns: &'a str,
    naming: Naming<'a>,
    nodes: Vec<Property>,
}

impl TreeBuilder<'_> {
    fn find_child<'a, 'input>(&self, node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
        node.children()
            .find(|n| n.is_element() && n.has_tag_name((self.ns, name)))
    }

    /// Text of a nested element, base64 decoded if the element says so.
    fn encoded_text(&self, node: Node<'_, '_>, name: &str) -> Option<String> {
        let child = self.find_child(node, name)?;
        let text = child.text()?;
        if child.attribute("encoding") == Some("base64") {
            let decoded = muted_error!(decode_base64(text), "decode nested element:");
            Some(decoded.unwrap_or_else(|| text.to_string()))
        } else {
            Some(text.to_string())
        }
    }

    fn fullname(&self, node: Node<'_, '_>) -> Option<String> {
        node.attribute("fullname")
            .map(str::to_string)
            .or_else(|| self.encoded_text(node, "fullname"))
    }

    fn display_name(&self, node: Node<'_, '_>, ty: &str, parent: Option<PropertyId>) -> String {
        match (self.naming, parent) {
            (Naming::Eval { code, .. }, None) => code.to_string(),
            (Naming::Eval { language, .. }, Some(parent)) => {
                let name = node
                    .attribute("name")
                    .map(str::to_string)
                    .or_else(|| self.encoded_text(node, "name"))
                    .unwrap_or_else(|| "?".to_string());
                let fullname = self.fullname(node);
                eval_display_name(
                    language,
                    &self.nodes[parent.0],
                    &name,
                    fullname.as_deref(),
                )
            }
            (Naming::Context, _) => {
                let name = self.fullname(node).unwrap_or_default();
                if name == "::" {
                    ty.to_string()
                } else {
                    name
                }
            }
        }
    }

    fn value(&self, node: Node<'_, '_>, ty: &str, encoding: Option<&str>) -> String {
        if let Some(value) = self.encoded_text(node, "value") {
            return value;
        }

        if encoding == Some("base64") {
            return match node.text() {
                None => String::new(),
                Some(text) => muted_error!(decode_base64(text), "decode property value:")
                    .unwrap_or_else(|| text.to_string()),
            };
        }

        if ty != "uninitialized" {
            return node.text().unwrap_or_default().to_string();
        }
        String::new()
    }

    fn build_node(
        &mut self,
        node: Node<'_, '_>,
        parent: Option<PropertyId>,
        depth: usize,
    ) -> Result<PropertyId> {
        let ty = node
            .attribute("classname")
            .or_else(|| node.attribute("type"))
            .unwrap_or("unknown")
            .to_string();

        let declared_children = match node
            .attribute("numchildren")
            .or_else(|| node.attribute("children"))
        {
            None => 0,
            Some(n) => n.trim().parse::<i64>().map_err(|e| {
                Error::response_format(
                    format!("invalid child count \"{n}\": {e}"),
                    format!("{node:?}"),
                )
            })?,
        }
        .max(0) as usize;

        let display_name = self.display_name(node, &ty, parent);
        let encoding = node.attribute("encoding").map(str::to_string);

        let mut value = String::new();
        let mut newlines = 0;
        if declared_children == 0 {
            value = self.value(node, &ty, encoding.as_deref());
            newlines = value.matches('\n').count();
            if ["string", "str", "scalar"]
                .iter()
                .any(|t| ty.eq_ignore_ascii_case(t))
            {
                value = format!("`{}`", value.replace('`', "\\`"));
            }
        }

        // containers of type scalar have an empty value and report size 0
        let size = if ty == "scalar" {
            Some(value.chars().count().saturating_sub(2))
        } else {
            node.attribute("size").and_then(|s| s.trim().parse().ok())
        };

        let id = PropertyId(self.nodes.len());
        self.nodes.push(Property {
            ty,
            display_name,
            size,
            encoding,
            value,
            newlines,
            depth,
            parent,
            children: vec![],
            declared_children,
            is_last_child: false,
        });

        if declared_children > 0 {
            let child_nodes: Vec<_> = node
                .children()
                .filter(|n| n.is_element() && n.has_tag_name((self.ns, PROPERTY_TAG)))
                .collect();
            let mut children = Vec::with_capacity(child_nodes.len());
            for child in child_nodes {
                children.push(self.build_node(child, Some(id), depth + 1)?);
            }
            if let Some(&last) = children.last() {
                self.nodes[last.0].is_last_child = true;
            }
            self.nodes[id.0].children = children;
        }

        Ok(id)
    }
}

//! HTML document template parsed once and cloned per request.
//!
//! The template goes through the html5ever tree builder once. Slot markers
//! are planted in the tree (after the `<html>` attributes, at the title, at
//! the end of `<head>`, inside the mount element and at the end of `<body>`)
//! and the serialized tree is cut at those markers. A [`Document`] shares
//! the resulting pieces through an `Arc` and only owns what plugins and the
//! renderer change for one request, so cloning it never re-parses.

use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;

use html5ever::serialize::{serialize, SerializeOpts, TraversalScope};
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::{parse_document, Attribute, LocalName, Namespace, QualName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom, SerializableHandle};

use crate::error::{CoreError, Result};
use crate::markup::escape_html;

const SLOT_PREFIX: &str = "prerender-slot";
const ATTRS_SLOT: &str = "data-prerender-slot";
const TITLE_SLOT: &str = "prerender-slot:title";
const HEAD_SLOT: &str = "prerender-slot:head";
const MOUNT_SLOT: &str = "prerender-slot:mount";
const BODY_SLOT: &str = "prerender-slot:body";

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Immutable, parsed form of the template HTML.
#[derive(Debug, PartialEq, Eq)]
struct TemplateParts {
    /// Doctype through the last template attribute of `<html`.
    before_attrs: String,
    /// From the end of the `<html>` attributes to the title position.
    before_title: String,
    /// Head contents after the title position.
    before_head_end: String,
    /// From `</head>` through the mount element's start tag.
    before_mount: String,
    /// From the mount element's end tag to the end of the body contents.
    after_mount: String,
    /// `</body>` and everything after it.
    tail: String,
    /// Title found in the template.
    title: Option<String>,
}

/// A parsed template. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentTemplate {
    parts: Arc<TemplateParts>,
}

impl DocumentTemplate {
    /// Parse template HTML. `mount_id` names the (empty) element the
    /// rendered markup is injected into, e.g. `<div id="root"></div>`.
    /// The element is matched on its exact `id` attribute value.
    pub fn parse(html: &str, mount_id: &str) -> Result<Self> {
        if html.contains(SLOT_PREFIX) {
            return Err(template_error("template must not contain prerender-slot markers"));
        }

        let dom = parse_document(RcDom::default(), Default::default()).one(html);
        let document = dom.document.clone();

        let root = find_element(&document, &|node| is_element(node, "html"))
            .ok_or_else(|| template_error("missing <html> element"))?;
        let head = find_element(&root, &|node| is_element(node, "head"))
            .ok_or_else(|| template_error("missing <head> element"))?;
        let body = find_element(&root, &|node| is_element(node, "body"))
            .ok_or_else(|| template_error("missing <body> element"))?;

        let mount = find_element(&body, &|node| has_id(node, mount_id))
            .ok_or_else(|| template_error(&format!("missing mount element #{mount_id}")))?;
        if VOID_ELEMENTS.iter().any(|tag| is_element(&mount, tag)) {
            return Err(template_error("mount element cannot be a void element"));
        }
        if !is_blank(&mount) {
            return Err(template_error("mount element must be empty"));
        }

        if let NodeData::Element { attrs, .. } = &root.data {
            attrs.borrow_mut().push(Attribute {
                name: QualName::new(None, Namespace::from(""), LocalName::from(ATTRS_SLOT)),
                value: StrTendril::new(),
            });
        }

        let title = match find_element(&head, &|node| is_element(node, "title")) {
            Some(node) => {
                let text = text_content(&node).trim().to_string();
                replace_node(&node, comment(TITLE_SLOT))?;
                Some(text)
            }
            None => {
                append(&head, comment(TITLE_SLOT));
                None
            }
        };
        append(&head, comment(HEAD_SLOT));
        mount.children.borrow_mut().clear();
        append(&mount, comment(MOUNT_SLOT));
        append(&body, comment(BODY_SLOT));

        let serialized = serialize_document(&document)?;
        let mut rest = serialized.as_str();
        let before_attrs = take_until(&mut rest, &format!(r#" {ATTRS_SLOT}="""#))?;
        let before_title = take_until(&mut rest, &slot(TITLE_SLOT))?;
        let before_head_end = take_until(&mut rest, &slot(HEAD_SLOT))?;
        let before_mount = take_until(&mut rest, &slot(MOUNT_SLOT))?;
        let after_mount = take_until(&mut rest, &slot(BODY_SLOT))?;

        Ok(Self {
            parts: Arc::new(TemplateParts {
                before_attrs,
                before_title,
                before_head_end,
                before_mount,
                after_mount,
                tail: rest.to_string(),
                title,
            }),
        })
    }

    /// Fresh per-request document sharing this template's parsed pieces.
    pub fn instantiate(&self) -> Document {
        Document {
            parts: Arc::clone(&self.parts),
            title: self.parts.title.clone(),
            html_attrs: BTreeMap::new(),
            head: Vec::new(),
            mount_html: String::new(),
            body_end: Vec::new(),
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.parts.title.as_deref()
    }
}

/// Per-request mutable document.
#[derive(Debug, Clone)]
pub struct Document {
    parts: Arc<TemplateParts>,
    title: Option<String>,
    html_attrs: BTreeMap<String, String>,
    head: Vec<String>,
    mount_html: String,
    body_end: Vec<String>,
}

impl Document {
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Replace the document title. The value is escaped on serialization.
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = Some(title.into());
    }

    /// Set (or overwrite) an attribute on the `<html>` element.
    pub fn set_html_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.html_attrs.insert(name.into(), value.into());
    }

    pub fn add_meta(&mut self, name: &str, content: &str) {
        self.head.push(format!(
            r#"<meta name="{}" content="{}">"#,
            escape_html(name),
            escape_html(content)
        ));
    }

    pub fn add_stylesheet(&mut self, href: &str) {
        self.head.push(format!(
            r#"<link rel="stylesheet" href="{}">"#,
            escape_html(href)
        ));
    }

    /// Append a raw HTML fragment to `<head>`. Not escaped.
    pub fn push_head(&mut self, html: impl Into<String>) {
        self.head.push(html.into());
    }

    /// Append a raw HTML fragment just before `</body>`. Not escaped.
    pub fn push_body_end(&mut self, html: impl Into<String>) {
        self.body_end.push(html.into());
    }

    pub fn mount_html(&self) -> &str {
        &self.mount_html
    }

    /// Set the markup injected into the mount element.
    pub fn set_mount_html(&mut self, html: impl Into<String>) {
        self.mount_html = html.into();
    }

    /// Fragments appended to `<head>` so far.
    pub fn head_fragments(&self) -> &[String] {
        &self.head
    }

    /// Fragments appended before `</body>` so far.
    pub fn body_end_fragments(&self) -> &[String] {
        &self.body_end
    }

    /// Serialize the full document.
    pub fn to_html(&self) -> String {
        let parts = &self.parts;
        let mut html = String::with_capacity(
            parts.before_title.len()
                + parts.before_head_end.len()
                + parts.before_mount.len()
                + self.mount_html.len()
                + 256,
        );

        html.push_str(&parts.before_attrs);
        for (name, value) in &self.html_attrs {
            html.push_str(&format!(r#" {}="{}""#, name, escape_html(value)));
        }

        html.push_str(&parts.before_title);
        if let Some(title) = &self.title {
            html.push_str(&format!("<title>{}</title>", escape_html(title)));
        }
        html.push_str(&parts.before_head_end);
        for fragment in &self.head {
            html.push_str(fragment);
        }

        html.push_str(&parts.before_mount);
        html.push_str(&self.mount_html);
        html.push_str(&parts.after_mount);
        for fragment in &self.body_end {
            html.push_str(fragment);
        }
        html.push_str(&parts.tail);

        html
    }
}

fn template_error(reason: &str) -> CoreError {
    CoreError::Template(reason.to_string())
}

fn slot(name: &str) -> String {
    format!("<!--{name}-->")
}

fn comment(contents: &str) -> Handle {
    Node::new(NodeData::Comment {
        contents: StrTendril::from(contents),
    })
}

fn append(parent: &Handle, child: Handle) {
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().push(child);
}

/// Put `replacement` where `node` sits in its parent.
fn replace_node(node: &Handle, replacement: Handle) -> Result<()> {
    let parent = node
        .parent
        .take()
        .and_then(|weak| weak.upgrade())
        .ok_or_else(|| template_error("detached template node"))?;
    let mut children = parent.children.borrow_mut();
    let index = children
        .iter()
        .position(|child| Rc::ptr_eq(child, node))
        .ok_or_else(|| template_error("detached template node"))?;
    replacement.parent.set(Some(Rc::downgrade(&parent)));
    children[index] = replacement;
    Ok(())
}

/// First node in document order, `node` included, matching `predicate`.
fn find_element(node: &Handle, predicate: &dyn Fn(&Handle) -> bool) -> Option<Handle> {
    let mut stack = vec![node.clone()];
    while let Some(current) = stack.pop() {
        if predicate(&current) {
            return Some(current);
        }
        stack.extend(current.children.borrow().iter().rev().cloned());
    }
    None
}

fn is_element(node: &Handle, tag: &str) -> bool {
    matches!(&node.data, NodeData::Element { name, .. } if &*name.local == tag)
}

fn has_id(node: &Handle, id: &str) -> bool {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .any(|attr| &*attr.name.local == "id" && &*attr.value == id),
        _ => false,
    }
}

/// No children other than whitespace text.
fn is_blank(node: &Handle) -> bool {
    node.children.borrow().iter().all(|child| match &child.data {
        NodeData::Text { contents } => contents.borrow().trim().is_empty(),
        _ => false,
    })
}

fn text_content(node: &Handle) -> String {
    let mut text = String::new();
    for child in node.children.borrow().iter() {
        if let NodeData::Text { contents } = &child.data {
            text.push_str(&contents.borrow());
        }
    }
    text
}

fn serialize_document(document: &Handle) -> Result<String> {
    let handle: SerializableHandle = document.clone().into();
    let mut bytes = Vec::new();
    serialize(
        &mut bytes,
        &handle,
        SerializeOpts {
            traversal_scope: TraversalScope::ChildrenOnly(None),
            ..Default::default()
        },
    )
    .map_err(|e| template_error(&format!("serialize template: {e}")))?;
    String::from_utf8(bytes).map_err(|e| template_error(&format!("serialize template: {e}")))
}

/// Cut `rest` at `marker`: returns the text before it and advances past it.
fn take_until<'a>(rest: &mut &'a str, marker: &str) -> Result<String> {
    let text: &'a str = *rest;
    let index = text
        .find(marker)
        .ok_or_else(|| template_error(&format!("slot {marker} cannot hold content")))?;
    *rest = &text[index + marker.len()..];
    Ok(text[..index].to_string())
}

//! Parameter and body decoding
//!
//! Before a handler runs, its parameter and body are decoded according to
//! the tag's [`Convention`](crate::template::convention::Convention):
//!
//! - parameters stay a scalar or are split on the separator or on commas,
//! - bodies stay text or become a key-value map, a JSON value, a list, a
//!   comma list or an XML tree.
//!
//! Decoding failures are returned as plain messages; the engine turns them
//! into convention errors that name the tag.

use crate::template::config::ShapeConfig;
use crate::template::convention::{BodyShape, ParamShape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::Value;
use std::collections::BTreeMap;

/// A decoded tag parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    Text(String),
    List(Vec<String>),
}

impl Param {
    /// The scalar parameter, or `""` for list parameters.
    pub fn text(&self) -> &str {
        match self {
            Param::Text(text) => text,
            Param::List(_) => "",
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Param::List(items) => Some(items),
            Param::Text(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Param::Text(text) => text.is_empty(),
            Param::List(items) => items.is_empty(),
        }
    }
}

/// An element of an XML body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    pub children: Vec<XmlNode>,
    pub text: String,
}

impl XmlNode {
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// A decoded tag body.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// The tag has no body
    None,
    Text(String),
    Map(BTreeMap<String, String>),
    Json(Value),
    List(Vec<String>),
    Xml(XmlNode),
}

impl Body {
    pub fn is_none(&self) -> bool {
        matches!(self, Body::None)
    }

    /// The text body, or `""` for every other shape.
    pub fn text(&self) -> &str {
        match self {
            Body::Text(text) => text,
            _ => "",
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Body::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Body::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Body::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_xml(&self) -> Option<&XmlNode> {
        match self {
            Body::Xml(node) => Some(node),
            _ => None,
        }
    }
}

pub fn decode_param(raw: &str, shape: ParamShape, separator: &str) -> Param {
    match shape {
        ParamShape::Scalar => Param::Text(raw.to_string()),
        ParamShape::List => Param::List(split_trimmed(raw, separator)),
        ParamShape::CommaList => Param::List(split_trimmed(raw, ",")),
    }
}

pub fn decode_body(raw: String, shape: BodyShape, config: &ShapeConfig) -> Result<Body, String> {
    match shape {
        BodyShape::Text => Ok(Body::Text(raw)),
        BodyShape::KeyValue => parse_kv(&raw, config).map(Body::Map),
        BodyShape::Json => serde_json::from_str(raw.trim())
            .map(Body::Json)
            .map_err(|e| e.to_string()),
        BodyShape::List => Ok(Body::List(split_trimmed(&raw, &config.list_delimiter))),
        BodyShape::CommaList => Ok(Body::List(split_trimmed(&raw, ","))),
        BodyShape::Xml => parse_xml(&raw).map(Body::Xml),
    }
}

fn split_trimmed(text: &str, delimiter: &str) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    text.split(delimiter)
        .map(|part| part.trim().to_string())
        .collect()
}

/// Parse `key=value` entries separated by the list delimiter, or by newlines
/// when the text contains no list delimiter.
pub fn parse_kv(text: &str, config: &ShapeConfig) -> Result<BTreeMap<String, String>, String> {
    let entries: Vec<&str> = if text.contains(config.list_delimiter.as_str()) {
        text.split(config.list_delimiter.as_str()).collect()
    } else {
        text.lines().collect()
    };

    let mut map = BTreeMap::new();
    for entry in entries {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let Some((key, value)) = entry.split_once(config.kv_separator.as_str()) else {
            return Err(format!(
                "entry '{}' has no '{}'",
                entry, config.kv_separator
            ));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("entry '{}' has an empty key", entry));
        }
        map.insert(key.to_string(), value.trim().to_string());
    }
    Ok(map)
}

/// Parse an XML document with exactly one root element.
pub fn parse_xml(text: &str) -> Result<XmlNode, String> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(e) => stack.push(start_node(&e)?),
            Event::Empty(e) => {
                let node = start_node(&e)?;
                attach(&mut stack, &mut root, node)?;
            }
            Event::End(_) => {
                let node = stack.pop().ok_or("unexpected closing element")?;
                attach(&mut stack, &mut root, node)?;
            }
            Event::Text(e) => {
                let text = e.unescape().map_err(|e| e.to_string())?;
                push_text(&mut stack, &text)?;
            }
            Event::CData(e) => {
                let bytes = e.into_inner();
                push_text(&mut stack, &String::from_utf8_lossy(&bytes))?;
            }
            Event::Eof => break,
            // declarations, comments, processing instructions
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(format!("unclosed element <{}>", open.name));
    }
    root.ok_or_else(|| "no root element".to_string())
}

fn start_node(e: &BytesStart) -> Result<XmlNode, String> {
    let mut node = XmlNode {
        name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
        ..XmlNode::default()
    };
    for attr in e.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(|e| e.to_string())?;
        node.attributes.insert(key, value.into_owned());
    }
    Ok(node)
}

fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) -> Result<(), String> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
    } else if root.is_some() {
        return Err("more than one root element".to_string());
    } else {
        *root = Some(node);
    }
    Ok(())
}

fn push_text(stack: &mut [XmlNode], text: &str) -> Result<(), String> {
    match stack.last_mut() {
        Some(node) => {
            node.text.push_str(text);
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err("text outside the root element".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ShapeConfig {
        ShapeConfig::default()
    }

    #[test]
    fn test_param_scalar_is_exact() {
        assert_eq!(
            decode_param(" a:b ", ParamShape::Scalar, ":"),
            Param::Text(" a:b ".to_string())
        );
    }

    #[test]
    fn test_param_colon_list() {
        let param = decode_param("a: b :c", ParamShape::List, ":");
        assert_eq!(param.as_list().unwrap(), ["a", "b", "c"]);
        assert_eq!(param.text(), "");
    }

    #[test]
    fn test_param_comma_list_empty() {
        assert!(decode_param("", ParamShape::CommaList, ":").is_empty());
    }

    #[test]
    fn test_kv_with_list_delimiter() {
        let map = parse_kv("a=1|#| b = two words |#|", &config()).unwrap();
        assert_eq!(map.get("a").unwrap(), "1");
        assert_eq!(map.get("b").unwrap(), "two words");
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_kv_line_based() {
        let map = parse_kv("\n  title = Hello\n  url=https://x.org/?q=1\n", &config()).unwrap();
        assert_eq!(map.get("title").unwrap(), "Hello");
        assert_eq!(map.get("url").unwrap(), "https://x.org/?q=1");
    }

    #[test]
    fn test_kv_entry_without_separator() {
        let err = parse_kv("a=1\njunk", &config()).unwrap_err();
        assert!(err.contains("junk"));
    }

    #[test]
    fn test_list_body() {
        let body = decode_body("x |#| y|#|z".to_string(), BodyShape::List, &config()).unwrap();
        assert_eq!(body.as_list().unwrap(), ["x", "y", "z"]);
    }

    #[test]
    fn test_comma_list_body() {
        let body = decode_body(" 1, 2 ,3 ".to_string(), BodyShape::CommaList, &config()).unwrap();
        assert_eq!(body.as_list().unwrap(), ["1", "2", "3"]);
    }

    #[test]
    fn test_json_body() {
        let body = decode_body(
            r#" {"a": [1, 2], "b": "c"} "#.to_string(),
            BodyShape::Json,
            &config(),
        )
        .unwrap();
        assert_eq!(body.as_json().unwrap()["a"][1], 2);
    }

    #[test]
    fn test_invalid_json_body() {
        assert!(decode_body("{oops".to_string(), BodyShape::Json, &config()).is_err());
    }

    #[test]
    fn test_xml_body() {
        let node = parse_xml(
            r#"<?xml version="1.0"?>
            <menu id="main"><item href="/a">A &amp; B</item><sep/><item href="/c"><![CDATA[<C>]]></item></menu>"#,
        )
        .unwrap();
        assert_eq!(node.name, "menu");
        assert_eq!(node.attribute("id"), Some("main"));
        assert_eq!(node.children.len(), 3);
        assert_eq!(node.children[0].text, "A & B");
        assert_eq!(node.child("sep").unwrap().children.len(), 0);
        assert_eq!(node.children[2].text, "<C>");
    }

    #[test]
    fn test_xml_two_roots() {
        assert!(parse_xml("<a/><b/>").is_err());
    }

    #[test]
    fn test_xml_unclosed() {
        assert!(parse_xml("<a><b></b>").is_err());
    }

    #[test]
    fn test_body_accessors() {
        assert!(Body::None.is_none());
        assert_eq!(Body::Text("x".to_string()).text(), "x");
        assert_eq!(Body::List(vec![]).text(), "");
    }
}

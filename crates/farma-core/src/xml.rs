//! # Document Parser
//!
//! Converts XML text into a generic tree with no NFe knowledge.
//!
//! ## Tree Shape
//! ```text
//! <emit>                                   XmlNode {
//!   <CNPJ>123</CNPJ>                         "CNPJ"  → Scalar("123")
//!   <enderEmit>                              "enderEmit" → Node {
//!     <xMun>SP</xMun>                            "xMun" → Scalar("SP") }
//!   </enderEmit>                             "det" → NodeList [
//!   <det nItem="1">...</det>                     Node { "nItem" → Scalar("1"), ... },
//!   <det nItem="2">...</det>                     Node { "nItem" → Scalar("2"), ... } ]
//! </emit>                                  }
//! ```
//!
//! ## Rules
//! - An element with neither attributes nor child elements becomes a
//!   `Scalar` holding its trimmed text (empty elements give `Scalar("")`).
//! - Attributes are merged into the element's mapping as sibling keys.
//! - Text of an element that also has attributes or children is kept under
//!   [`TEXT_KEY`].
//! - A key seen twice under the same parent becomes a `NodeList` in document
//!   order. This also covers an attribute whose name matches a child element.
//! - Element names are stored without their namespace prefix; attribute names
//!   are stored as written (`xmlns:ds` stays `xmlns:ds`).
//! - Raw bytes are decoded with the charset named by the XML declaration
//!   (or a byte-order mark), UTF-8 when neither is present. Bytes that are
//!   invalid in that charset make the document malformed.

use quick_xml::encoding::Decoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{CoreError, CoreResult};

/// Key under which mixed text content is stored.
pub const TEXT_KEY: &str = "#text";

// =============================================================================
// Tree Types
// =============================================================================

/// A value in the generic document tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlValue {
    /// Text-only element or attribute value.
    Scalar(String),

    /// Element with attributes and/or child elements.
    Node(XmlNode),

    /// Same key repeated under one parent, in document order.
    NodeList(Vec<XmlValue>),
}

impl XmlValue {
    /// Returns the text of this value.
    ///
    /// A `Node` yields its [`TEXT_KEY`] content (e.g. `<vNF moeda="BRL">10</vNF>`).
    /// A `NodeList` has no single text and yields `None`.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            XmlValue::Scalar(text) => Some(text),
            XmlValue::Node(node) => node.text(),
            XmlValue::NodeList(_) => None,
        }
    }

    /// Returns the mapping if this value is a single element node.
    pub fn as_node(&self) -> Option<&XmlNode> {
        match self {
            XmlValue::Node(node) => Some(node),
            _ => None,
        }
    }

    /// Views this value as a sequence: a `NodeList` yields its members, any
    /// other value yields itself once.
    pub fn as_list(&self) -> Vec<&XmlValue> {
        match self {
            XmlValue::NodeList(values) => values.iter().collect(),
            other => vec![other],
        }
    }
}

/// An element mapping, preserving insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    entries: Vec<(String, XmlValue)>,
}

impl XmlNode {
    /// Creates an empty node.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, turning repeated keys into a `NodeList`.
    pub fn insert(&mut self, key: impl Into<String>, value: XmlValue) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => match existing {
                XmlValue::NodeList(values) => values.push(value),
                _ => {
                    let first = std::mem::replace(existing, XmlValue::NodeList(Vec::new()));
                    *existing = XmlValue::NodeList(vec![first, value]);
                }
            },
            None => self.entries.push((key, value)),
        }
    }

    /// Looks up a direct child or attribute.
    pub fn get(&self, key: &str) -> Option<&XmlValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Follows a path of element names through nested nodes.
    pub fn get_path(&self, path: &[&str]) -> Option<&XmlValue> {
        let (last, parents) = path.split_last()?;
        let mut node = self;
        for key in parents {
            node = node.get(key)?.as_node()?;
        }
        node.get(last)
    }

    /// Follows a path and returns the node at its end.
    pub fn node_at(&self, path: &[&str]) -> Option<&XmlNode> {
        self.get_path(path)?.as_node()
    }

    /// Follows a path and returns trimmed, non-empty text.
    pub fn text_at(&self, path: &[&str]) -> Option<&str> {
        self.get_path(path)?
            .as_text()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }

    /// Mixed text content of this element, if any.
    pub fn text(&self) -> Option<&str> {
        match self.get(TEXT_KEY) {
            Some(XmlValue::Scalar(text)) => Some(text),
            _ => None,
        }
    }

    /// Iterates keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the node has no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// Parser
// =============================================================================

/// An element whose end tag has not been seen yet.
struct OpenElement {
    name: String,
    node: XmlNode,
    text: String,
}

impl OpenElement {
    fn from_start(start: &BytesStart<'_>, decoder: Decoder) -> CoreResult<Self> {
        let name = decode_name(decoder, start.local_name().as_ref())?;
        let mut node = XmlNode::new();

        for attr in start.attributes() {
            let attr = attr.map_err(|e| {
                CoreError::malformed(format!("invalid attribute on <{name}>: {e}"))
            })?;
            let key = decode_name(decoder, attr.key.as_ref())?;
            let value = attr
                .decode_and_unescape_value(decoder)
                .map_err(|e| CoreError::malformed(format!("invalid value for {key}: {e}")))?;
            node.insert(key, XmlValue::Scalar(value.into_owned()));
        }

        Ok(OpenElement {
            name,
            node,
            text: String::new(),
        })
    }

    fn into_value(self) -> (String, XmlValue) {
        let text = self.text.trim();
        let value = if self.node.is_empty() {
            XmlValue::Scalar(text.to_string())
        } else {
            let mut node = self.node;
            if !text.is_empty() {
                node.insert(TEXT_KEY, XmlValue::Scalar(text.to_string()));
            }
            XmlValue::Node(node)
        };
        (self.name, value)
    }
}

/// Parses XML text into a tree whose single key is the root element.
///
/// ## Errors
/// `MalformedDocument` when the input is not well-formed: syntax errors,
/// mismatched end tags, unclosed elements, text or elements outside the
/// root, or an empty document.
///
/// ## Example
/// ```rust
/// use farma_core::xml::parse_document;
///
/// let doc = parse_document("<a><b>1</b><b>2</b></a>").unwrap();
/// let b = doc.get_path(&["a", "b"]).unwrap();
/// assert_eq!(b.as_list().len(), 2);
/// ```
pub fn parse_document(xml: &str) -> CoreResult<XmlNode> {
    build_tree(Reader::from_str(xml))
}

/// Parses raw file contents, decoding them with the declared charset.
///
/// ## Errors
/// Same as [`parse_document`], plus `MalformedDocument` for bytes that are
/// not valid in the document's encoding.
///
/// ## Example
/// ```rust
/// use farma_core::xml::parse_bytes;
///
/// let raw = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><xMun>S\xC3O PAULO</xMun>";
/// let doc = parse_bytes(raw).unwrap();
/// assert_eq!(doc.text_at(&["xMun"]), Some("S\u{c3}O PAULO"));
/// ```
pub fn parse_bytes(bytes: &[u8]) -> CoreResult<XmlNode> {
    build_tree(Reader::from_reader(bytes))
}

fn build_tree(mut reader: Reader<&[u8]>) -> CoreResult<XmlNode> {
    reader.config_mut().trim_text(true);

    let mut stack: Vec<OpenElement> = Vec::new();
    let mut document = XmlNode::new();

    loop {
        let event = reader.read_event().map_err(|e| {
            CoreError::malformed(format!("at byte {}: {e}", reader.buffer_position()))
        })?;

        match event {
            Event::Start(start) => {
                stack.push(OpenElement::from_start(&start, reader.decoder())?);
            }
            Event::Empty(start) => {
                let element = OpenElement::from_start(&start, reader.decoder())?;
                close_element(element, &mut stack, &mut document)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| CoreError::malformed("unexpected closing tag"))?;
                close_element(element, &mut stack, &mut document)?;
            }
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|e| CoreError::malformed(format!("invalid text content: {e}")))?;
                append_text(&mut stack, &text)?;
            }
            Event::CData(data) => {
                let text = data
                    .decode()
                    .map_err(|e| CoreError::malformed(format!("invalid CDATA content: {e}")))?;
                append_text(&mut stack, &text)?;
            }
            Event::Eof => break,
            // Declaration, comments, processing instructions, doctype
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(CoreError::malformed(format!(
            "unclosed element <{}>",
            open.name
        )));
    }

    if document.is_empty() {
        return Err(CoreError::malformed("document has no root element"));
    }

    Ok(document)
}

fn decode_name(decoder: Decoder, raw: &[u8]) -> CoreResult<String> {
    decoder
        .decode(raw)
        .map(|name| name.into_owned())
        .map_err(|e| CoreError::malformed(format!("invalid name: {e}")))
}

fn close_element(
    element: OpenElement,
    stack: &mut [OpenElement],
    document: &mut XmlNode,
) -> CoreResult<()> {
    let (name, value) = element.into_value();
    match stack.last_mut() {
        Some(parent) => parent.node.insert(name, value),
        None if document.is_empty() => document.insert(name, value),
        None => {
            return Err(CoreError::malformed(format!(
                "second root element <{name}>"
            )))
        }
    }
    Ok(())
}

fn append_text(stack: &mut [OpenElement], text: &str) -> CoreResult<()> {
    match stack.last_mut() {
        Some(open) => {
            open.text.push_str(text);
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(CoreError::malformed("text outside the root element")),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_children() {
        let doc = parse_document("<emit><CNPJ>123</CNPJ><xNome> ACME </xNome></emit>").unwrap();
        assert_eq!(doc.text_at(&["emit", "CNPJ"]), Some("123"));
        assert_eq!(doc.text_at(&["emit", "xNome"]), Some("ACME"));
    }

    #[test]
    fn test_repeated_elements_become_list_in_order() {
        let doc = parse_document(
            "<NFe><det nItem=\"1\"><c>A</c></det><det nItem=\"2\"><c>B</c></det><det nItem=\"3\"><c>C</c></det></NFe>",
        )
        .unwrap();

        let det = doc.get_path(&["NFe", "det"]).unwrap();
        assert!(matches!(det, XmlValue::NodeList(_)));

        let codes: Vec<&str> = det
            .as_list()
            .iter()
            .filter_map(|d| d.as_node())
            .filter_map(|n| n.text_at(&["c"]))
            .collect();
        assert_eq!(codes, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_single_element_is_not_a_list() {
        let doc = parse_document("<NFe><det><c>A</c></det></NFe>").unwrap();
        let det = doc.get_path(&["NFe", "det"]).unwrap();
        assert!(det.as_node().is_some());
        assert_eq!(det.as_list().len(), 1);
    }

    #[test]
    fn test_attributes_merge_with_children() {
        let doc = parse_document(
            r#"<infNFe Id="NFe123" versao="4.00"><ide><nNF>1</nNF></ide></infNFe>"#,
        )
        .unwrap();
        let inf = doc.node_at(&["infNFe"]).unwrap();
        assert_eq!(inf.text_at(&["Id"]), Some("NFe123"));
        assert_eq!(inf.text_at(&["versao"]), Some("4.00"));
        assert_eq!(inf.text_at(&["ide", "nNF"]), Some("1"));
        assert_eq!(inf.keys().collect::<Vec<_>>(), vec!["Id", "versao", "ide"]);
    }

    #[test]
    fn test_text_alongside_attributes() {
        let doc = parse_document(r#"<total><vNF moeda="BRL">150.00</vNF></total>"#).unwrap();
        let v = doc.get_path(&["total", "vNF"]).unwrap();
        assert!(v.as_node().is_some());
        assert_eq!(v.as_text(), Some("150.00"));
        assert_eq!(doc.text_at(&["total", "vNF"]), Some("150.00"));
    }

    #[test]
    fn test_attribute_colliding_with_child_becomes_list() {
        let doc = parse_document(r#"<a x="attr"><x>child</x></a>"#).unwrap();
        let x = doc.get_path(&["a", "x"]).unwrap();
        let texts: Vec<_> = x.as_list().iter().filter_map(|v| v.as_text()).collect();
        assert_eq!(texts, vec!["attr", "child"]);
    }

    #[test]
    fn test_empty_element_and_entities() {
        let doc =
            parse_document("<a><empty/><name>A &amp; B</name><c><![CDATA[x<y]]></c></a>").unwrap();
        assert_eq!(
            doc.get_path(&["a", "empty"]),
            Some(&XmlValue::Scalar(String::new()))
        );
        assert_eq!(doc.text_at(&["a", "empty"]), None);
        assert_eq!(doc.text_at(&["a", "name"]), Some("A & B"));
        assert_eq!(doc.text_at(&["a", "c"]), Some("x<y"));
    }

    #[test]
    fn test_namespace_prefix_dropped_from_elements() {
        let doc = parse_document(
            r#"<?xml version="1.0" encoding="UTF-8"?><nfe:NFe xmlns:nfe="http://www.portalfiscal.inf.br/nfe"><nfe:ide><nfe:nNF>7</nfe:nNF></nfe:ide></nfe:NFe>"#,
        )
        .unwrap();
        assert_eq!(doc.text_at(&["NFe", "ide", "nNF"]), Some("7"));
    }

    #[test]
    fn test_malformed_documents() {
        for input in [
            "",
            "   ",
            "not xml at all",
            "<a><b></a>",
            "<a>",
            "<a></a><b></b>",
            r#"<a x="1" x></a>"#,
        ] {
            let err = parse_document(input).unwrap_err();
            assert!(
                matches!(err, CoreError::MalformedDocument { .. }),
                "expected MalformedDocument for {input:?}, got {err:?}"
            );
        }
    }
    #[test]
    fn test_latin1_declaration_is_decoded() {
        let raw = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>\
            <enderEmit cMun=\"S\xC3O\"><xMun>S\xC3O PAULO</xMun>\
            <xBairro><![CDATA[CONCEI\xC7\xC3O]]></xBairro></enderEmit>";

        let doc = parse_bytes(raw).unwrap();

        assert_eq!(doc.text_at(&["enderEmit", "cMun"]), Some("SÃO"));
        assert_eq!(doc.text_at(&["enderEmit", "xMun"]), Some("SÃO PAULO"));
        assert_eq!(doc.text_at(&["enderEmit", "xBairro"]), Some("CONCEIÇÃO"));
    }

    #[test]
    fn test_utf8_bytes_with_and_without_bom() {
        let plain = "<?xml version=\"1.0\" encoding=\"UTF-8\"?><xMun>SÃO PAULO</xMun>";
        assert_eq!(
            parse_bytes(plain.as_bytes()).unwrap().text_at(&["xMun"]),
            Some("SÃO PAULO")
        );

        let mut with_bom = vec![0xEF, 0xBB, 0xBF];
        with_bom.extend_from_slice(plain.as_bytes());
        assert_eq!(
            parse_bytes(&with_bom).unwrap().text_at(&["xMun"]),
            Some("SÃO PAULO")
        );
    }

    #[test]
    fn test_invalid_bytes_for_declared_charset() {
        let raw = b"<?xml version=\"1.0\" encoding=\"UTF-8\"?><xMun>S\xC3O PAULO</xMun>";
        let err = parse_bytes(raw).unwrap_err();
        assert!(
            matches!(err, CoreError::MalformedDocument { .. }),
            "got {err:?}"
        );
    }
}

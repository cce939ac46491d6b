//! Minimal XML element model used to carry declarative configuration
//! (element descriptors, quality-test descriptors) into the allocator and
//! quality-test-factory registries.
//!
//! This module is a thin adapter over `quick-xml`'s event reader — it does
//! not implement general XML parsing, it just flattens the one or two
//! levels of nesting the element and quality-test descriptors actually
//! use into a small owned tree.

use std::collections::HashMap;

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::status::Error;

#[derive(Debug, Clone, Default)]
pub struct XmlElement {
    pub tag: String,
    pub attrs: HashMap<String, String>,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    /// Returns the named attribute, or logs an error and fails if it is
    /// absent — construction-time violations fail loudly with no partial
    /// side effects.
    pub fn require(&self, key: &str) -> Result<&str, Error> {
        self.attr(key).ok_or_else(|| {
            let msg = format!("missing required attribute {key:?} on <{}>", self.tag);
            tracing::error!("{msg}");
            Error::InvalidParameter(msg)
        })
    }

    pub fn require_f64(&self, key: &str) -> Result<f64, Error> {
        self.require(key)?
            .parse()
            .map_err(|_| Error::InvalidParameter(format!("attribute {key:?} is not numeric")))
    }

    pub fn require_u32(&self, key: &str) -> Result<u32, Error> {
        self.require(key)?
            .parse()
            .map_err(|_| Error::InvalidParameter(format!("attribute {key:?} is not an integer")))
    }

    pub fn attr_f64_or(&self, key: &str, default: f64) -> Result<f64, Error> {
        match self.attr(key) {
            None => Ok(default),
            Some(v) => v
                .parse()
                .map_err(|_| Error::InvalidParameter(format!("attribute {key:?} is not numeric"))),
        }
    }

    pub fn child(&self, tag: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.tag == tag)
    }

    /// Parses the first element found in `xml`, including its attributes
    /// and direct-child elements (one level of nesting, enough for
    /// `<qtest>`'s nested `<param>` children).
    pub fn parse(xml: &str) -> Result<Self, Error> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            match reader
                .read_event()
                .map_err(|e| Error::InvalidParameter(format!("malformed XML: {e}")))?
            {
                Event::Start(e) => {
                    let elem = XmlElement {
                        tag: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                        attrs: attrs_of(&e)?,
                        children: Vec::new(),
                    };
                    stack.push(elem);
                }
                Event::Empty(e) => {
                    let elem = XmlElement {
                        tag: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                        attrs: attrs_of(&e)?,
                        children: Vec::new(),
                    };
                    push_finished(&mut stack, &mut root, elem);
                }
                Event::End(_) => {
                    let elem = stack
                        .pop()
                        .ok_or_else(|| Error::InvalidParameter("unbalanced XML".into()))?;
                    push_finished(&mut stack, &mut root, elem);
                    if stack.is_empty() && root.is_some() {
                        break;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        root.ok_or_else(|| Error::InvalidParameter("no XML element found".into()))
    }
}

fn push_finished(stack: &mut Vec<XmlElement>, root: &mut Option<XmlElement>, elem: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(elem),
        None => *root = Some(elem),
    }
}

fn attrs_of(e: &quick_xml::events::BytesStart) -> Result<HashMap<String, String>, Error> {
    let mut out = HashMap::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| Error::InvalidParameter(format!("malformed attribute: {e}")))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| Error::InvalidParameter(format!("malformed attribute value: {e}")))?
            .into_owned();
        out.insert(key, value);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_self_closing_element() {
        let e = XmlElement::parse(r#"<monitorElement type="TH1D" name="h1" nBinsX="10" minX="0" maxX="1"/>"#).unwrap();
        assert_eq!(e.tag, "monitorElement");
        assert_eq!(e.attr("type"), Some("TH1D"));
        assert_eq!(e.require_u32("nBinsX").unwrap(), 10);
    }

    #[test]
    fn parses_nested_children() {
        let e = XmlElement::parse(
            r#"<qtest type="XRange" name="q1"><param key="xmin">0</param><param key="xmax">10</param></qtest>"#,
        )
        .unwrap();
        assert_eq!(e.tag, "qtest");
        assert_eq!(e.children.len(), 2);
        assert_eq!(e.children[0].attr("key"), Some("xmin"));
    }

    #[test]
    fn missing_required_attribute_fails() {
        let e = XmlElement::parse(r#"<monitorElement type="TH1D" name="h1"/>"#).unwrap();
        assert!(e.require_u32("nBinsX").is_err());
    }
}

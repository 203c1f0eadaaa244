//! Content codec for the JSON and XML body formats.
//!
//! Both formats decode to the same `serde_json::Value` shape using JSON field
//! naming, so assertions never care which format was on the wire. Request and
//! response formats are independent: callers pick each one separately.
use crate::error::HarnessError;
use anyhow::{anyhow, Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::{Map, Value};

/// Collection elements and the name of their repeated child element.
const COLLECTIONS: &[(&str, &str)] = &[
    ("todos", "todo"),
    ("errorMessages", "errorMessage"),
    ("challenges", "challenge"),
];

/// Leaf elements that carry integers in the JSON representation.
const NUMERIC_FIELDS: &[&str] = &["id"];

/// Leaf elements that carry booleans in the JSON representation.
const BOOLEAN_FIELDS: &[&str] = &["doneStatus", "status"];

/// Body formats the service speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Xml,
}

impl Format {
    pub fn mime(&self) -> &'static str {
        match self {
            Format::Json => "application/json",
            Format::Xml => "application/xml",
        }
    }

    /// Classify a media type, ignoring parameters and case.
    pub fn from_media_type(value: &str) -> Option<Format> {
        match media_type(value).as_str() {
            "application/json" => Some(Format::Json),
            "application/xml" => Some(Format::Xml),
            _ => None,
        }
    }
}

/// Outcome of matching an accept-preference list against supported formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Negotiation {
    Respond(Format),
    NotAcceptable,
}

impl Negotiation {
    /// Status the service must answer with for a successful read.
    pub fn read_status(&self) -> u16 {
        match self {
            Negotiation::Respond(_) => 200,
            Negotiation::NotAcceptable => 406,
        }
    }
}

/// Pick the response format for an `Accept` header value.
///
/// The first supported entry in list order wins; an absent or empty list, or a
/// wildcard reached before any supported entry, means JSON.
pub fn negotiate(accept: Option<&str>) -> Negotiation {
    let Some(accept) = accept.map(str::trim).filter(|value| !value.is_empty()) else {
        return Negotiation::Respond(Format::Json);
    };
    for entry in accept.split(',') {
        let media = media_type(entry);
        if media.is_empty() {
            continue;
        }
        if let Some(format) = Format::from_media_type(&media) {
            return Negotiation::Respond(format);
        }
        if media == "*/*" || media == "application/*" {
            return Negotiation::Respond(Format::Json);
        }
    }
    Negotiation::NotAcceptable
}

fn media_type(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Encode a document. `root` names the XML element for object documents;
/// a single-key collection document (`{"todos": [...]}`) uses its key instead.
pub fn encode(document: &Value, root: &str, format: Format) -> Result<Vec<u8>> {
    match format {
        Format::Json => serde_json::to_vec(document).context("encode JSON body"),
        Format::Xml => {
            let mut out = String::new();
            match collection_document(document) {
                Some((name, items)) => write_xml(&mut out, name, &Value::Array(items.clone()))?,
                None => write_xml(&mut out, root, document)?,
            }
            Ok(out.into_bytes())
        }
    }
}

fn collection_document(document: &Value) -> Option<(&str, &Vec<Value>)> {
    let object = document.as_object()?;
    if object.len() != 1 {
        return None;
    }
    let (key, value) = object.iter().next()?;
    let items = value.as_array()?;
    collection_child(key).map(|_| (key.as_str(), items))
}

fn collection_child(name: &str) -> Option<&'static str> {
    COLLECTIONS
        .iter()
        .find(|(collection, _)| *collection == name)
        .map(|(_, child)| *child)
}

fn write_xml(out: &mut String, name: &str, value: &Value) -> Result<()> {
    out.push('<');
    out.push_str(name);
    out.push('>');
    match value {
        Value::Object(fields) => {
            for (key, field) in fields {
                write_xml(out, key, field)?;
            }
        }
        Value::Array(items) => {
            let child = collection_child(name).ok_or_else(|| {
                HarnessError::Setup(format!("no XML element name for items of {name:?}"))
            })?;
            for item in items {
                write_xml(out, child, item)?;
            }
        }
        Value::String(text) => out.push_str(&quick_xml::escape::escape(text.as_str())),
        Value::Bool(flag) => out.push_str(if *flag { "true" } else { "false" }),
        Value::Number(number) => out.push_str(&number.to_string()),
        Value::Null => {}
    }
    out.push_str("</");
    out.push_str(name);
    out.push('>');
    Ok(())
}

/// Decode a response body according to its `Content-Type` header.
///
/// An empty body decodes to `Value::Null` whatever the header says.
pub fn decode(body: &[u8], content_type: Option<&str>) -> Result<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    let format = match content_type.and_then(Format::from_media_type) {
        Some(format) => format,
        None => sniff(body).ok_or_else(|| {
            anyhow!(
                "cannot decode body with content type {:?}",
                content_type.unwrap_or("<none>")
            )
        })?,
    };
    match format {
        Format::Json => serde_json::from_slice(body).context("decode JSON body"),
        Format::Xml => {
            let text = std::str::from_utf8(body).context("XML body is not UTF-8")?;
            let root = parse_xml(text)?;
            Ok(xml_document(root))
        }
    }
}

fn sniff(body: &[u8]) -> Option<Format> {
    let first = body.iter().find(|byte| !byte.is_ascii_whitespace())?;
    match first {
        b'{' | b'[' => Some(Format::Json),
        b'<' => Some(Format::Xml),
        _ => None,
    }
}

#[derive(Debug, Default)]
struct XmlElement {
    name: String,
    text: String,
    children: Vec<XmlElement>,
}

impl XmlElement {
    fn named(name: &[u8]) -> Self {
        Self {
            name: String::from_utf8_lossy(name).into_owned(),
            ..Default::default()
        }
    }
}

fn parse_xml(text: &str) -> Result<XmlElement> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root = None;

    loop {
        let position = reader.buffer_position();
        let event = reader
            .read_event()
            .with_context(|| format!("parse XML after byte {position}"))?;
        match event {
            Event::Start(start) => stack.push(XmlElement::named(start.name().as_ref())),
            Event::Empty(start) => {
                let element = XmlElement::named(start.name().as_ref());
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(content) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&content.unescape().context("unescape XML text")?);
                }
            }
            Event::CData(content) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&content));
                }
            }
            Event::End(_) => {
                let element = stack.pop().ok_or_else(|| anyhow!("unbalanced XML end tag"))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(anyhow!("XML document ended inside <{}>", stack[0].name));
    }
    root.ok_or_else(|| anyhow!("XML document has no root element"))
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(anyhow!("XML document has more than one root element")),
    }
    Ok(())
}

fn xml_document(root: XmlElement) -> Value {
    if collection_child(&root.name).is_some() {
        let mut object = Map::new();
        let name = root.name.clone();
        object.insert(name, xml_value(root));
        return Value::Object(object);
    }
    xml_value(root)
}

fn xml_value(element: XmlElement) -> Value {
    if collection_child(&element.name).is_some() {
        return Value::Array(element.children.into_iter().map(xml_value).collect());
    }
    if element.children.is_empty() {
        return xml_scalar(&element.name, element.text);
    }
    let mut object = Map::new();
    for child in element.children {
        let key = child.name.clone();
        object.insert(key, xml_value(child));
    }
    Value::Object(object)
}

fn xml_scalar(name: &str, text: String) -> Value {
    if NUMERIC_FIELDS.contains(&name) {
        if let Ok(number) = text.trim().parse::<u64>() {
            return Value::from(number);
        }
    }
    if BOOLEAN_FIELDS.contains(&name) {
        match text.trim() {
            "true" => return Value::Bool(true),
            "false" => return Value::Bool(false),
            _ => {}
        }
    }
    Value::String(text)
}

/// Compare the fields that were sent against what the service reports back.
pub fn round_trip_mismatches(sent: &Map<String, Value>, received: &Value) -> Vec<String> {
    let mut mismatches = Vec::new();
    for (key, expected) in sent {
        match received.get(key) {
            Some(actual) if actual == expected => {}
            Some(actual) => mismatches.push(format!(
                "field {key}: sent {expected}, read back {actual}"
            )),
            None => mismatches.push(format!("field {key}: sent {expected}, missing on read")),
        }
    }
    mismatches
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;

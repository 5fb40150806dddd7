//! XML wire format
//!
//! Requests are written with a bank-specific root element and character
//! encoding. Replies are read into a [`Payload`] holding the children of the
//! root element; repeated siblings become a [`Value::List`].

use encoding_rs::Encoding;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{GatewayError, GatewayResult};
use crate::payments::codec::{Payload, Value};
use crate::payments::types::Bank;

/// How a bank wants its XML documents written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XmlOptions {
    pub root: &'static str,
    /// WHATWG encoding label, e.g. `ISO-8859-9`
    pub encoding: &'static str,
    /// Write the `<?xml ...?>` declaration
    pub prolog: bool,
}

impl XmlOptions {
    pub const fn new(root: &'static str, encoding: &'static str) -> Self {
        Self {
            root,
            encoding,
            prolog: true,
        }
    }

    pub const fn without_prolog(mut self) -> Self {
        self.prolog = false;
        self
    }

    fn resolve_encoding(&self) -> GatewayResult<&'static Encoding> {
        Encoding::for_label(self.encoding.as_bytes()).ok_or_else(|| {
            GatewayError::encoding(format!("Unknown character encoding: {}", self.encoding))
        })
    }
}

fn write_error(err: impl std::fmt::Display) -> GatewayError {
    GatewayError::encoding(format!("XML write failed: {}", err))
}

fn write_value(writer: &mut Writer<Vec<u8>>, name: &str, value: &Value) -> GatewayResult<()> {
    match value {
        Value::Null => writer
            .write_event(Event::Empty(BytesStart::new(name)))
            .map_err(write_error),
        Value::Text(text) if text.is_empty() => writer
            .write_event(Event::Empty(BytesStart::new(name)))
            .map_err(write_error),
        Value::Text(text) => {
            writer
                .write_event(Event::Start(BytesStart::new(name)))
                .map_err(write_error)?;
            writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(write_error)?;
            writer
                .write_event(Event::End(BytesEnd::new(name)))
                .map_err(write_error)
        }
        Value::Map(children) => {
            writer
                .write_event(Event::Start(BytesStart::new(name)))
                .map_err(write_error)?;
            for (key, child) in children {
                write_value(writer, key, child)?;
            }
            writer
                .write_event(Event::End(BytesEnd::new(name)))
                .map_err(write_error)
        }
        Value::List(items) => {
            for item in items {
                write_value(writer, name, item)?;
            }
            Ok(())
        }
    }
}

/// Serialize `payload` under the configured root element and encode the
/// document in the configured character set.
pub fn encode_xml(options: &XmlOptions, payload: &Payload) -> GatewayResult<Vec<u8>> {
    let encoding = options.resolve_encoding()?;
    let mut writer = Writer::new(Vec::new());

    if options.prolog {
        writer
            .write_event(Event::Decl(BytesDecl::new(
                "1.0",
                Some(options.encoding),
                None,
            )))
            .map_err(write_error)?;
    }
    write_value(&mut writer, options.root, &Value::Map(payload.clone()))?;

    let document = String::from_utf8(writer.into_inner()).map_err(write_error)?;
    if encoding == encoding_rs::UTF_8 {
        return Ok(document.into_bytes());
    }
    let (bytes, _, _) = encoding.encode(&document);
    Ok(bytes.into_owned())
}

/// Decode raw bytes into text. UTF-8 is taken as-is, anything else is read in
/// the bank's declared charset.
pub fn decode_text(bytes: &[u8], encoding_label: &str) -> String {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_string();
    }
    let encoding = Encoding::for_label(encoding_label.as_bytes()).unwrap_or(encoding_rs::UTF_8);
    let (text, _, _) = encoding.decode(bytes);
    text.into_owned()
}

struct Frame {
    name: String,
    children: Payload,
    text: String,
}

impl Frame {
    fn new(name: String) -> Self {
        Self {
            name,
            children: Payload::new(),
            text: String::new(),
        }
    }

    fn into_value(self) -> (String, Value) {
        let value = if self.children.is_empty() {
            Value::Text(self.text)
        } else {
            Value::Map(self.children)
        };
        (self.name, value)
    }
}

fn push_child(parent: &mut Payload, name: String, value: Value) {
    match parent.get(&name).cloned() {
        None => parent.insert(name, value),
        Some(Value::List(mut items)) => {
            items.push(value);
            parent.insert(name, Value::List(items));
        }
        Some(existing) => parent.insert(name, Value::List(vec![existing, value])),
    }
}

fn element_name(bank: Bank, raw: &[u8]) -> GatewayResult<String> {
    std::str::from_utf8(raw)
        .map(str::to_string)
        .map_err(|e| GatewayError::malformed(bank, format!("invalid element name: {}", e)))
}

/// Parse an XML reply into the children of its root element.
pub fn decode_xml(bank: Bank, body: &str) -> GatewayResult<Payload> {
    let mut reader = Reader::from_str(body);
    reader.trim_text(true);

    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<Payload> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| GatewayError::malformed(bank, e.to_string()))?;

        match event {
            Event::Start(start) => {
                if root.is_some() {
                    return Err(GatewayError::malformed(bank, "content after root element"));
                }
                let name = element_name(bank, start.name().as_ref())?;
                stack.push(Frame::new(name));
            }
            Event::Empty(start) => {
                let name = element_name(bank, start.name().as_ref())?;
                match stack.last_mut() {
                    Some(parent) => push_child(&mut parent.children, name, Value::Null),
                    None if root.is_none() => root = Some(Payload::new()),
                    None => {
                        return Err(GatewayError::malformed(bank, "content after root element"))
                    }
                }
            }
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|e| GatewayError::malformed(bank, e.to_string()))?;
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(frame) = stack.last_mut() {
                    frame
                        .text
                        .push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::End(_) => {
                let frame = stack
                    .pop()
                    .ok_or_else(|| GatewayError::malformed(bank, "unbalanced closing tag"))?;
                match stack.last_mut() {
                    Some(parent) => {
                        let (name, value) = frame.into_value();
                        push_child(&mut parent.children, name, value);
                    }
                    None => root = Some(frame.children),
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(GatewayError::malformed(bank, "unexpected end of document"));
    }
    root.ok_or_else(|| GatewayError::malformed(bank, "empty document"))
}

//! HTML auto-submit forms
//!
//! Some banks answer a request with a page that immediately posts a form to
//! the next hop instead of returning structured data. The target and the
//! inputs of that form are the real reply.

use indexmap::IndexMap;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};

/// A form extracted from an HTML reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtmlForm {
    /// The form's `action`
    pub target: String,
    /// Named inputs in document order, submit buttons excluded
    pub fields: IndexMap<String, String>,
}

/// Cheap sniff used before choosing the XML or the HTML decode path.
pub fn is_html(body: &str) -> bool {
    let head: String = body
        .trim_start()
        .chars()
        .take(256)
        .collect::<String>()
        .to_ascii_lowercase();
    head.starts_with("<!doctype html")
        || head.starts_with("<html")
        || head.starts_with("<form")
        || head.contains("<html")
}

fn attribute_value(attr: &Attribute<'_>) -> String {
    attr.unescape_value()
        .map(|value| value.into_owned())
        .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned())
}

fn attributes(tag: &BytesStart<'_>) -> IndexMap<String, String> {
    tag.html_attributes()
        .with_checks(false)
        .flatten()
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_ascii_lowercase();
            (key, attribute_value(&attr))
        })
        .collect()
}

fn tag_name(tag: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(tag.name().as_ref()).to_ascii_lowercase()
}

/// Extract the first `<form>` of an HTML document.
///
/// Fails when the document holds no form, or the form has no `action`.
pub fn extract_form(body: &str) -> GatewayResult<HtmlForm> {
    let mut reader = Reader::from_str(body);
    reader.trim_text(true);
    reader.check_end_names(false);

    let mut target: Option<String> = None;
    let mut in_form = false;
    let mut seen_form = false;
    let mut fields = IndexMap::new();

    loop {
        let tag = match reader.read_event() {
            Ok(Event::Start(tag)) | Ok(Event::Empty(tag)) => tag,
            Ok(Event::End(end)) => {
                if in_form && end.name().as_ref().eq_ignore_ascii_case(b"form") {
                    break;
                }
                continue;
            }
            Ok(Event::Eof) | Err(_) => break,
            Ok(_) => continue,
        };

        match tag_name(&tag).as_str() {
            "form" if !seen_form => {
                seen_form = true;
                in_form = true;
                target = attributes(&tag)
                    .shift_remove("action")
                    .filter(|action| !action.trim().is_empty());
            }
            "input" if in_form => {
                let attrs = attributes(&tag);
                let Some(name) = attrs.get("name").filter(|name| !name.is_empty()) else {
                    continue;
                };
                let is_submit = name.eq_ignore_ascii_case("submit")
                    || attrs
                        .get("type")
                        .is_some_and(|kind| kind.eq_ignore_ascii_case("submit"));
                if is_submit {
                    continue;
                }
                fields.insert(
                    name.clone(),
                    attrs.get("value").cloned().unwrap_or_default(),
                );
            }
            _ => {}
        }
    }

    if !seen_form {
        return Err(GatewayError::form_not_found("document contains no <form>"));
    }
    let target = target.ok_or_else(|| GatewayError::form_not_found("<form> has no action"))?;

    Ok(HtmlForm { target, fields })
}

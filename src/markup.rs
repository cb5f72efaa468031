//! # Markup Writer
//!
//! Turns build-time [`Value`]s into HTML following React DOM server output:
//! attribute naming, boolean attributes, style objects and void elements.
//!
//! Adjacent literal pieces are merged into one run, which is escaped and then
//! neutralized as a whole, so the only `__RUXY_SV_` sequences in the output
//! are tokens written by [`emit_placeholder`].

use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::placeholder::{emit_placeholder, neutralize_after_token, neutralize_literal};
use crate::value::{format_number, NotComputable, Segment, Value};

lazy_static::lazy_static! {
    pub static ref VOID_ELEMENTS: HashSet<&'static str> = [
        "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta",
        "param", "source", "track", "wbr",
    ]
    .iter()
    .cloned()
    .collect();

    static ref ATTRIBUTE_RENAMES: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("className", "class");
        m.insert("htmlFor", "for");
        m.insert("tabIndex", "tabindex");
        m.insert("readOnly", "readonly");
        m.insert("maxLength", "maxlength");
        m.insert("minLength", "minlength");
        m.insert("autoComplete", "autocomplete");
        m.insert("autoFocus", "autofocus");
        m.insert("autoPlay", "autoplay");
        m.insert("colSpan", "colspan");
        m.insert("rowSpan", "rowspan");
        m.insert("contentEditable", "contenteditable");
        m.insert("crossOrigin", "crossorigin");
        m.insert("encType", "enctype");
        m.insert("noValidate", "novalidate");
        m.insert("spellCheck", "spellcheck");
        m.insert("srcSet", "srcset");
        m.insert("acceptCharset", "accept-charset");
        m.insert("httpEquiv", "http-equiv");
        m
    };

    /// CSS properties React leaves unitless when given a number.
    static ref UNITLESS_CSS: HashSet<&'static str> = [
        "animationIterationCount", "aspectRatio", "borderImageOutset", "borderImageSlice",
        "borderImageWidth", "columnCount", "columns", "flex", "flexGrow", "flexPositive",
        "flexShrink", "flexNegative", "flexOrder", "fontWeight", "gridArea", "gridColumn",
        "gridColumnEnd", "gridColumnStart", "gridRow", "gridRowEnd", "gridRowStart",
        "lineClamp", "lineHeight", "opacity", "order", "orphans", "scale", "tabSize",
        "widows", "zIndex", "zoom", "fillOpacity", "floodOpacity", "stopOpacity",
        "strokeDasharray", "strokeDashoffset", "strokeMiterlimit", "strokeOpacity",
        "strokeWidth",
    ]
    .iter()
    .cloned()
    .collect();

    static ref EVENT_HANDLER_RE: Regex = Regex::new(r"^on[A-Z]").unwrap();
}

/// Props rendered as text content rather than attributes.
pub const CONTENT_PROPS: [&str; 2] = ["children", "text"];

/// True for props that never reach the markup and are never evaluated.
pub fn is_skipped_prop(name: &str) -> bool {
    name == "key" || name == "ref" || EVENT_HANDLER_RE.is_match(name)
}

pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.contains(tag.to_ascii_lowercase().as_str())
}

pub fn attribute_name(prop: &str) -> &str {
    ATTRIBUTE_RENAMES.get(prop).copied().unwrap_or(prop)
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\"', "&quot;")
        .replace('\'', "&#39;")
}

/// Writes one element and records the server slots its markup references.
#[derive(Debug, Default)]
pub struct MarkupWriter {
    html: String,
    slots: BTreeSet<String>,
    /// Literal text not yet escaped, merged across pieces and props.
    pending: String,
    after_token: bool,
}

impl MarkupWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_tag(&mut self, tag: &str) {
        self.markup("<");
        self.html.push_str(tag);
    }

    /// Appends ` name="value"`, or nothing when the value omits the attribute.
    pub fn attribute(&mut self, prop: &str, value: &Value) -> Result<(), NotComputable> {
        let name = attribute_name(prop);
        if prop == "style" {
            if let Value::Object(_) = value {
                let css = style_segments(value)?;
                if !css.is_empty() {
                    self.push_attribute(name, &css);
                }
                return Ok(());
            }
        }

        match value {
            Value::Undefined | Value::Null | Value::Bool(false) => Ok(()),
            Value::Bool(true) => {
                if name.starts_with("data-") || name.starts_with("aria-") {
                    self.push_attribute(name, &[Segment::Text("true".to_string())]);
                } else {
                    self.markup(" ");
                    self.html.push_str(name);
                }
                Ok(())
            }
            Value::Object(_) => Err(NotComputable(format!(
                "object value for attribute `{}` has no markup form",
                prop
            ))),
            other => {
                let segments = other.to_segments();
                self.push_attribute(name, &segments);
                Ok(())
            }
        }
    }

    fn push_attribute(&mut self, name: &str, segments: &[Segment]) {
        self.markup(" ");
        self.html.push_str(name);
        self.html.push_str("=\"");
        self.push_segments(segments);
        self.markup("\"");
    }

    pub fn close_open_tag(&mut self) {
        self.markup(">");
    }

    pub fn close_void_tag(&mut self) {
        self.markup(" />");
    }

    pub fn end_tag(&mut self, tag: &str) {
        self.markup("</");
        self.html.push_str(tag);
        self.html.push('>');
    }

    /// Text content the way React renders a child value.
    pub fn text(&mut self, value: &Value) -> Result<(), NotComputable> {
        match value {
            Value::Undefined | Value::Null | Value::Bool(_) => Ok(()),
            Value::Array(items) => {
                for item in items {
                    self.text(item)?;
                }
                Ok(())
            }
            Value::Object(_) => Err(NotComputable(
                "objects are not valid as text content".to_string(),
            )),
            other => {
                let segments = other.to_segments();
                self.push_segments(&segments);
                Ok(())
            }
        }
    }

    /// Inlines markup produced for a resolved child.
    pub fn raw(&mut self, html: &str) {
        self.markup(html);
    }

    pub fn adopt_slots<'s, I>(&mut self, slots: I)
    where
        I: IntoIterator<Item = &'s String>,
    {
        self.slots.extend(slots.into_iter().cloned());
    }

    fn push_segments(&mut self, segments: &[Segment]) {
        for segment in segments {
            match segment {
                Segment::Text(text) => self.pending.push_str(text),
                Segment::Slot(slot) => {
                    self.flush_text();
                    self.html.push_str(&emit_placeholder(slot));
                    self.slots.insert(slot.clone());
                    self.after_token = true;
                }
            }
        }
    }

    /// Writes the pending literal run as one escaped, neutralized piece.
    fn flush_text(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let escaped = escape_html(&self.pending);
        let literal = if self.after_token {
            neutralize_after_token(&escaped)
        } else {
            neutralize_literal(&escaped)
        };
        self.html.push_str(&literal);
        self.pending.clear();
        self.after_token = false;
    }

    /// Ends any literal run and appends markup that is not literal text.
    fn markup(&mut self, html: &str) {
        self.flush_text();
        self.after_token = false;
        self.html.push_str(html);
    }

    pub fn is_empty(&self) -> bool {
        self.html.is_empty() && self.pending.is_empty()
    }

    pub fn finish(mut self) -> (String, BTreeSet<String>) {
        self.flush_text();
        (self.html, self.slots)
    }
}

/// `{ fontSize: 12, display: "flex" }` → `font-size:12px;display:flex`
fn style_segments(value: &Value) -> Result<Vec<Segment>, NotComputable> {
    let map = match value {
        Value::Object(map) => map,
        _ => return Ok(Vec::new()),
    };

    let mut segments = Vec::new();
    for (property, entry) in map {
        let rendered = match entry {
            Value::Undefined | Value::Null | Value::Bool(_) => continue,
            Value::Str(s) if s.trim().is_empty() => continue,
            Value::Number(n) if *n != 0.0 && !is_unitless(property) => {
                vec![Segment::Text(format!("{}px", format_number(*n)))]
            }
            Value::Array(_) | Value::Object(_) => {
                return Err(NotComputable(format!(
                    "style property `{}` must be a string or number",
                    property
                )))
            }
            other => other.to_segments(),
        };

        if !segments.is_empty() {
            segments.push(Segment::Text(";".to_string()));
        }
        segments.push(Segment::Text(format!("{}:", css_property_name(property))));
        segments.extend(rendered);
    }
    Ok(segments)
}

fn is_unitless(property: &str) -> bool {
    property.starts_with("--") || UNITLESS_CSS.contains(property)
}

fn css_property_name(property: &str) -> String {
    if property.starts_with("--") {
        return property.to_string();
    }
    let mut name = String::with_capacity(property.len() + 4);
    if property.starts_with("ms") && property[2..].starts_with(char::is_uppercase) {
        name.push('-');
    }
    for ch in property.chars() {
        if ch.is_ascii_uppercase() {
            name.push('-');
            name.push(ch.to_ascii_lowercase());
        } else {
            name.push(ch);
        }
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placeholder::scan_placeholders;
    use indexmap::IndexMap;

    fn render_attr(prop: &str, value: Value) -> String {
        let mut writer = MarkupWriter::new();
        writer.attribute(prop, &value).unwrap();
        writer.finish().0
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("<a href=\"x\">Tom & 'Jerry'</a>"),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_attribute_renames_and_booleans() {
        assert_eq!(render_attr("className", Value::Str("card".into())), " class=\"card\"");
        assert_eq!(render_attr("htmlFor", Value::Str("email".into())), " for=\"email\"");
        assert_eq!(render_attr("disabled", Value::Bool(true)), " disabled");
        assert_eq!(render_attr("aria-hidden", Value::Bool(true)), " aria-hidden=\"true\"");
        assert_eq!(render_attr("hidden", Value::Bool(false)), "");
        assert_eq!(render_attr("title", Value::Null), "");
        assert_eq!(render_attr("tabIndex", Value::Number(0.0)), " tabindex=\"0\"");
    }

    #[test]
    fn test_style_object() {
        let mut style = IndexMap::new();
        style.insert("fontSize".to_string(), Value::Number(12.0));
        style.insert("lineHeight".to_string(), Value::Number(1.5));
        style.insert("display".to_string(), Value::Str("flex".into()));
        style.insert("color".to_string(), Value::Null);
        style.insert("WebkitTransition".to_string(), Value::Str("none".into()));

        assert_eq!(
            render_attr("style", Value::Object(style)),
            " style=\"font-size:12px;line-height:1.5;display:flex;-webkit-transition:none\""
        );
    }

    #[test]
    fn test_server_slot_in_attribute() {
        let value = Value::Server(vec![
            Segment::Text("/users/".into()),
            Segment::Slot("id".into()),
        ]);
        let mut writer = MarkupWriter::new();
        writer.attribute("href", &value).unwrap();
        let (html, slots) = writer.finish();
        assert_eq!(html, " href=\"/users/__RUXY_SV_id__\"");
        assert!(slots.contains("id"));
    }

    #[test]
    fn test_text_content() {
        let mut writer = MarkupWriter::new();
        writer
            .text(&Value::Array(vec![
                Value::Str("a < b".into()),
                Value::Bool(true),
                Value::Number(3.0),
                Value::Null,
            ]))
            .unwrap();
        assert_eq!(writer.finish().0, "a &lt; b3");
    }

    #[test]
    fn test_literal_token_lookalike_is_neutralized() {
        let mut writer = MarkupWriter::new();
        writer.text(&Value::Str("__RUXY_SV_S1__".into())).unwrap();
        let (html, slots) = writer.finish();
        assert_eq!(html, "&#95;_RUXY_SV_S1__");
        assert!(slots.is_empty());
    }

    #[test]
    fn test_split_lookalike_is_neutralized_as_one_run() {
        let mut writer = MarkupWriter::new();
        writer.text(&Value::Str("__RUXY_SV".into())).unwrap();
        writer.text(&Value::Str("_S1__".into())).unwrap();
        let (html, slots) = writer.finish();
        assert_eq!(html, "&#95;_RUXY_SV_S1__");
        assert!(scan_placeholders(&html).is_empty());
        assert!(slots.is_empty());

        let mut writer = MarkupWriter::new();
        writer
            .text(&Value::Array(vec![
                Value::Str("__RUXY_".into()),
                Value::Str("SV_S1__".into()),
            ]))
            .unwrap();
        assert!(scan_placeholders(&writer.finish().0).is_empty());
    }

    #[test]
    fn test_literal_after_token_cannot_form_a_token() {
        let value = Value::Server(vec![
            Segment::Slot("A".into()),
            Segment::Text("RUXY_SV_B__".into()),
        ]);
        let mut writer = MarkupWriter::new();
        writer.text(&value).unwrap();
        let (html, slots) = writer.finish();
        assert_eq!(html, "__RUXY_SV_A__&#82;UXY_SV_B__");
        assert_eq!(scan_placeholders(&html), vec!["__RUXY_SV_A__".to_string()]);
        assert_eq!(slots.into_iter().collect::<Vec<_>>(), vec!["A".to_string()]);

        let mut writer = MarkupWriter::new();
        writer.attribute("title", &value).unwrap();
        assert_eq!(writer.finish().0, " title=\"__RUXY_SV_A__&#82;UXY_SV_B__\"");
    }

    #[test]
    fn test_skipped_props() {
        assert!(is_skipped_prop("key"));
        assert!(is_skipped_prop("onClick"));
        assert!(!is_skipped_prop("one"));
        assert!(!is_skipped_prop("title"));
    }

    #[test]
    fn test_objects_are_not_text() {
        let mut writer = MarkupWriter::new();
        assert!(writer.text(&Value::Object(IndexMap::new())).is_err());
    }
}

//! Translation between [`Value`] trees and XML element trees
//!
//! Maps become one child element per key. Lists become a reserved wrapper
//! element (`<array>` by default) holding one reserved item element
//! (`<item>`) per entry. Scalars become text. Decoding reverses this; an
//! element with no content decodes to [`Value::Null`].

use tracing::warn;

use super::document::{Charset, Element, latin1_to_string};
use super::error::ApiError;
use super::value::{Map, Value};

/// Reserved tag names and output charset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecConfig {
    pub array_tag: String,
    pub item_tag: String,
    pub charset: Charset,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            array_tag: "array".to_string(),
            item_tag: "item".to_string(),
            charset: Charset::Utf8,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Codec {
    config: CodecConfig,
}

impl Codec {
    pub fn new(config: CodecConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn charset(&self) -> Charset {
        self.config.charset
    }

    /// Encode `value` into a fresh element named `name`
    pub fn to_element(&self, name: &str, value: &Value) -> Result<Element, ApiError> {
        let mut element = Element::new(name);
        self.encode_into(&mut element, value)?;
        Ok(element)
    }

    /// Append the encoding of `value` to `parent`
    pub fn encode_into(&self, parent: &mut Element, value: &Value) -> Result<(), ApiError> {
        match value {
            Value::Null => {}
            Value::Text(text) => parent.push_text(self.encode_str(text)),
            Value::Bytes(raw) => parent.push_text(self.encode_bytes(raw)),
            Value::List(items) => parent.append(self.encode_array(items.iter())?),
            Value::Indexed(entries) => parent.append(self.encode_array(entries.values())?),
            Value::Map(fields) => {
                for (key, field) in fields.iter() {
                    self.check_name(key)?;
                    parent.append(self.to_element(key, field)?);
                }
            }
        }
        Ok(())
    }

    fn encode_array<'a>(
        &self,
        items: impl Iterator<Item = &'a Value>,
    ) -> Result<Element, ApiError> {
        let mut wrapper = Element::new(self.config.array_tag.as_str());
        for item in items {
            wrapper.append(self.to_element(&self.config.item_tag, item)?);
        }
        Ok(wrapper)
    }

    /// Make text safe to embed as XML character data.
    ///
    /// Characters XML 1.0 cannot carry are replaced with U+FFFD. Applying
    /// this twice gives the same result as applying it once.
    pub fn encode_str(&self, text: &str) -> String {
        if text.chars().all(is_xml_char) {
            return text.to_string();
        }
        warn!(
            "Scalar contains characters not allowed in XML, replacing them ({} chars)",
            text.chars().count()
        );
        text.chars()
            .map(|c| if is_xml_char(c) { c } else { char::REPLACEMENT_CHARACTER })
            .collect()
    }

    /// Decode raw scalar bytes with the configured charset, falling back to
    /// ISO-8859-1 when they do not decode, then make them XML safe.
    pub fn encode_bytes(&self, raw: &[u8]) -> String {
        let text = match self.config.charset.decode(raw) {
            Some(text) => text,
            None => {
                warn!(
                    "Scalar is not valid {}, reading it as ISO-8859-1 ({} bytes)",
                    self.config.charset.label(),
                    raw.len()
                );
                latin1_to_string(raw)
            }
        };
        self.encode_str(&text)
    }

    /// Decode the content of `element`
    pub fn decode(&self, element: &Element) -> Result<Value, ApiError> {
        let mut wrapper = None;
        let mut fields = Map::new();

        for child in element.elements() {
            if child.name == self.config.array_tag {
                if wrapper.replace(child).is_some() {
                    return Err(ApiError::Format(format!(
                        "more than one <{}> inside <{}>",
                        self.config.array_tag, element.name
                    )));
                }
            } else {
                fields.insert(child.name.clone(), self.decode(child)?);
            }
        }

        if let Some(array) = wrapper {
            if !fields.is_empty() {
                return Err(ApiError::Format(format!(
                    "<{}> mixed with named fields inside <{}>",
                    self.config.array_tag, element.name
                )));
            }
            return self.decode_array(array);
        }

        if !fields.is_empty() {
            return Ok(Value::Map(fields));
        }

        let text = element.text();
        if text.is_empty() {
            Ok(Value::Null)
        } else {
            Ok(Value::Text(text))
        }
    }

    fn decode_array(&self, array: &Element) -> Result<Value, ApiError> {
        if !array.text().trim().is_empty() {
            return Err(ApiError::Format(format!(
                "text content inside <{}>",
                self.config.array_tag
            )));
        }

        array
            .elements()
            .map(|child| {
                if child.name != self.config.item_tag {
                    return Err(ApiError::Format(format!(
                        "expected <{}> inside <{}>, found <{}>",
                        self.config.item_tag, self.config.array_tag, child.name
                    )));
                }
                self.decode(child)
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List)
    }

    /// Map keys and command names must be usable as element names and must
    /// not look like list positions or the array wrapper.
    pub fn check_name(&self, key: &str) -> Result<(), ApiError> {
        let mut chars = key.chars();
        let valid_start = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));

        if !valid_start || !valid_rest || key == self.config.array_tag {
            return Err(ApiError::InvalidKey(key.to_string()));
        }
        Ok(())
    }
}

fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\t' | '\n' | '\r'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

use std::fmt::Display;
use std::str::FromStr;

use crate::error::{Result, XmlError};
use crate::node::{Attrs, Node};

/// Reads attributes off a [`Node`], accumulating every failure so a caller can
/// report all missing or malformed fields at once through [`AttrParser::finish`].
pub struct AttrParser<'a> {
    pub attrs: &'a Attrs,
    pub errors: Vec<XmlError>,
}

impl<'a> AttrParser<'a> {
    pub fn new(node: &'a Node) -> Self {
        Self {
            attrs: &node.attrs,
            errors: Vec::new(),
        }
    }

    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn finish(&self) -> Result<()> {
        if self.ok() {
            Ok(())
        } else {
            Err(XmlError::AttrList(self.errors.clone()))
        }
    }

    fn get_raw(&mut self, key: &str, require: bool) -> Option<&'a str> {
        let val = self.attrs.get(key).map(String::as_str);
        if require && val.is_none() {
            self.errors.push(XmlError::MissingAttr(key.to_string()));
        }
        val
    }

    pub fn optional_string(&mut self, key: &str) -> Option<&'a str> {
        self.get_raw(key, false)
    }

    /// Get a required string attribute, returning an error if missing.
    ///
    /// Unlike [`AttrParser::string`] this does not record the failure.
    pub fn required_string(&mut self, key: &str) -> Result<&'a str> {
        self.optional_string(key)
            .ok_or_else(|| XmlError::MissingAttr(key.to_string()))
    }

    /// Get a required string, recording a missing attribute and returning "".
    pub fn string(&mut self, key: &str) -> &'a str {
        self.get_raw(key, true).unwrap_or_default()
    }

    fn get_parsed<T>(&mut self, key: &str, require: bool) -> Option<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.get_raw(key, require)
            .and_then(|s| match s.trim().parse::<T>() {
                Ok(val) => Some(val),
                Err(e) => {
                    self.errors.push(XmlError::AttrParse(format!(
                        "failed to parse '{s}' for key '{key}': {e}"
                    )));
                    None
                }
            })
    }

    pub fn optional_i32(&mut self, key: &str) -> Option<i32> {
        self.get_parsed(key, false)
    }

    pub fn optional_u32(&mut self, key: &str) -> Option<u32> {
        self.get_parsed(key, false)
    }

    pub fn optional_u16(&mut self, key: &str) -> Option<u16> {
        self.get_parsed(key, false)
    }

    pub fn optional_f32(&mut self, key: &str) -> Option<f32> {
        self.get_parsed(key, false)
    }

    pub fn u16(&mut self, key: &str) -> u16 {
        self.get_parsed(key, true).unwrap_or_default()
    }
}

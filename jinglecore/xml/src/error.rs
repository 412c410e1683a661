use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum XmlError {
    #[error("missing required attribute: {0}")]
    MissingAttr(String),
    #[error("attribute parsing failed: {0}")]
    AttrParse(String),
    #[error("multiple attribute parsing errors: {0:?}")]
    AttrList(Vec<XmlError>),
}

impl XmlError {
    /// Names of every missing attribute reported by this error, flattening lists.
    pub fn missing_attrs(&self) -> Vec<&str> {
        match self {
            XmlError::MissingAttr(name) => vec![name.as_str()],
            XmlError::AttrParse(_) => Vec::new(),
            XmlError::AttrList(list) => list.iter().flat_map(|e| e.missing_attrs()).collect(),
        }
    }
}

pub type Result<T> = std::result::Result<T, XmlError>;

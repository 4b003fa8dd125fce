use std::fmt;

pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
pub const BINARY_CONTENT_TYPE: &str = "application/octet-stream";
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// File content as it flows through the encrypt / sign / upload pipeline
///
/// The variant is preserved across encryption (the envelope records it), so
/// a file written as text reads back as text.
#[derive(Clone, PartialEq, Eq)]
pub enum Content {
    Text(String),
    Binary(Vec<u8>),
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Content::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Content::Binary(bytes) => write!(f, "Binary({} bytes)", bytes.len()),
        }
    }
}

impl Content {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Content::Text(text) => text.as_bytes(),
            Content::Binary(bytes) => bytes,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Content::Text(text) => text.into_bytes(),
            Content::Binary(bytes) => bytes,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Content::Text(_))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(text) => Some(text),
            Content::Binary(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Content type used when the caller does not supply one
    pub fn default_content_type(&self) -> &'static str {
        match self {
            Content::Text(_) => TEXT_CONTENT_TYPE,
            Content::Binary(_) => BINARY_CONTENT_TYPE,
        }
    }

    /// Interpret raw hub bytes according to the response content type.
    ///
    /// `text/*` and `application/json` decode as text when the bytes are
    /// valid UTF-8; everything else stays binary.
    pub fn from_response(bytes: Vec<u8>, content_type: Option<&str>) -> Self {
        let textual = content_type
            .map(|ct| {
                let ct = ct.trim().to_ascii_lowercase();
                ct.starts_with("text") || ct.starts_with(JSON_CONTENT_TYPE)
            })
            .unwrap_or(false);
        if !textual {
            return Content::Binary(bytes);
        }
        match String::from_utf8(bytes) {
            Ok(text) => Content::Text(text),
            Err(e) => Content::Binary(e.into_bytes()),
        }
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Content {
    fn from(bytes: Vec<u8>) -> Self {
        Content::Binary(bytes)
    }
}

impl From<&[u8]> for Content {
    fn from(bytes: &[u8]) -> Self {
        Content::Binary(bytes.to_vec())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_content_type_drives_decoding() {
        let text = Content::from_response(b"hi".to_vec(), Some("text/plain; charset=utf-8"));
        assert_eq!(text, Content::Text("hi".into()));

        let json = Content::from_response(b"{}".to_vec(), Some("application/json"));
        assert!(json.is_text());

        let binary = Content::from_response(b"hi".to_vec(), Some("image/png"));
        assert_eq!(binary, Content::Binary(b"hi".to_vec()));

        let unknown = Content::from_response(b"hi".to_vec(), None);
        assert!(!unknown.is_text());

        // invalid utf-8 never panics, it stays binary
        let invalid = Content::from_response(vec![0xff, 0xfe], Some("text/plain"));
        assert_eq!(invalid, Content::Binary(vec![0xff, 0xfe]));
    }
}

use bytes::Bytes;

/// One message received over the duplex connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// Raw media bytes, persisted verbatim.
    Binary(Bytes),
    /// Text message; ignored for persistence.
    Text(String),
    /// Ping/pong or other transport control message; ignored.
    Control,
}

impl Frame {
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::Binary(data.into())
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Binary(_))
    }

    /// Short label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Binary(_) => "binary",
            Self::Text(_) => "text",
            Self::Control => "control",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_binary_is_binary() {
        assert!(Frame::binary(vec![1u8]).is_binary());
        assert!(!Frame::Text("hi".into()).is_binary());
        assert!(!Frame::Control.is_binary());
    }

    #[test]
    fn kinds() {
        assert_eq!(Frame::binary(&b"x"[..]).kind(), "binary");
        assert_eq!(Frame::Text(String::new()).kind(), "text");
        assert_eq!(Frame::Control.kind(), "control");
    }
}

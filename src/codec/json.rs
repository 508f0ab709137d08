use super::{Codec, CodecError, Format};
use crate::document::Node;

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn format(&self) -> Format {
        Format::Json
    }

    fn encode(&self, document: &Node) -> Result<String, CodecError> {
        serde_json::to_string_pretty(document).map_err(|err| CodecError::Encode {
            format: Format::Json,
            detail: err.to_string(),
        })
    }

    fn decode(&self, text: &str) -> Result<Node, CodecError> {
        serde_json::from_str(text).map_err(|err| CodecError::Syntax {
            format: Format::Json,
            detail: err.to_string(),
        })
    }
}

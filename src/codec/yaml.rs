use super::{Codec, CodecError, Format};
use crate::document::Node;

#[derive(Debug, Clone, Copy, Default)]
pub struct YamlCodec;

impl Codec for YamlCodec {
    fn format(&self) -> Format {
        Format::Yaml
    }

    fn encode(&self, document: &Node) -> Result<String, CodecError> {
        serde_yaml::to_string(document).map_err(|err| CodecError::Encode {
            format: Format::Yaml,
            detail: err.to_string(),
        })
    }

    // An empty stream decodes to null and is left for validation to reject.
    fn decode(&self, text: &str) -> Result<Node, CodecError> {
        serde_yaml::from_str(text).map_err(|err| CodecError::Syntax {
            format: Format::Yaml,
            detail: err.to_string(),
        })
    }
}

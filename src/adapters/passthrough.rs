//! Identity codec, for archives whose assets are stored as-is.

use crate::domain::ResourceKind;

use super::AssetCodec;

/// Returns bytes unchanged and never claims to detect obfuscation
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCodec;

impl AssetCodec for PassthroughCodec {
    fn normalize(&self, data: &[u8], _kind: &ResourceKind) -> Vec<u8> {
        data.to_vec()
    }

    fn is_obfuscated(&self, _kind: &ResourceKind, _data: &[u8]) -> Option<bool> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough() {
        let codec = PassthroughCodec;
        assert_eq!(codec.normalize(b"BM..", &ResourceKind::Bmp), b"BM..".to_vec());
        assert_eq!(codec.is_obfuscated(&ResourceKind::Mbac, b"MB"), None);
    }
}

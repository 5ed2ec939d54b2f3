//! Optional packed-text codec.
//!
//! Hosts may plug in a codec that packs expression source into a compact
//! binary form. Having none installed is a normal configuration.

use std::fmt;
use std::sync::Arc;

use crate::error::{MatrixError, MatrixResult};

pub const CODEC_CAPABILITY: &str = "scxq2-pack";

pub trait PackCodec: Send + Sync {
    fn pack(&self, text: &str) -> MatrixResult<Vec<u8>>;
    fn unpack(&self, packed: &[u8]) -> MatrixResult<String>;
}

/// A codec slot that may be empty.
#[derive(Clone, Default)]
pub struct OptionalCodec {
    codec: Option<Arc<dyn PackCodec>>,
}

impl fmt::Debug for OptionalCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptionalCodec")
            .field("available", &self.is_available())
            .finish()
    }
}

impl OptionalCodec {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_codec(codec: Arc<dyn PackCodec>) -> Self {
        Self { codec: Some(codec) }
    }

    pub fn is_available(&self) -> bool {
        self.codec.is_some()
    }

    pub fn pack(&self, text: &str) -> MatrixResult<Vec<u8>> {
        self.installed()?.pack(text)
    }

    pub fn unpack(&self, packed: &[u8]) -> MatrixResult<String> {
        self.installed()?.unpack(packed)
    }

    fn installed(&self) -> MatrixResult<&dyn PackCodec> {
        self.codec
            .as_deref()
            .ok_or_else(|| MatrixError::CapabilityUnavailable(CODEC_CAPABILITY.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{OptionalCodec, PackCodec};
    use crate::error::{MatrixError, MatrixResult};

    struct Reverse;

    impl PackCodec for Reverse {
        fn pack(&self, text: &str) -> MatrixResult<Vec<u8>> {
            Ok(text.bytes().rev().collect())
        }

        fn unpack(&self, packed: &[u8]) -> MatrixResult<String> {
            String::from_utf8(packed.iter().rev().copied().collect())
                .map_err(|err| MatrixError::Validation(err.to_string()))
        }
    }

    #[test]
    fn empty_slot_reports_unavailable() {
        let slot = OptionalCodec::empty();
        assert!(!slot.is_available());
        assert_eq!(
            slot.pack("x").expect_err("empty").code(),
            "CAPABILITY_UNAVAILABLE"
        );
        assert!(slot.unpack(b"x").is_err());
    }

    #[test]
    fn installed_codec_is_used() {
        let slot = OptionalCodec::with_codec(Arc::new(Reverse));
        assert!(slot.is_available());
        let packed = slot.pack("_score").expect("pack");
        assert_eq!(packed, b"erocs_".to_vec());
        assert_eq!(slot.unpack(&packed).expect("unpack"), "_score");
    }
}

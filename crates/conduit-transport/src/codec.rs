use bytes::BytesMut;
use tokio_util::codec::LinesCodec;

/// Thin wrapper so callers don't need to know `tokio_util`'s constructor name; bounds a
/// single line to the configured byte count per spec §4.1 / §9 instead of buffering
/// unboundedly.
pub struct BoundedLinesCodec(LinesCodec);

impl BoundedLinesCodec {
    pub fn new(max_line_bytes: usize) -> Self {
        Self(LinesCodec::new_with_max_length(max_line_bytes))
    }
}

impl tokio_util::codec::Decoder for BoundedLinesCodec {
    type Item = String;
    type Error = tokio_util::codec::LinesCodecError;

    fn decode(
        &mut self,
        src: &mut BytesMut,
    ) -> Result<Option<Self::Item>, Self::Error> {
        self.0.decode(src)
    }
}

impl tokio_util::codec::Encoder<String> for BoundedLinesCodec {
    type Error = tokio_util::codec::LinesCodecError;

    fn encode(
        &mut self,
        item: String,
        dst: &mut BytesMut,
    ) -> Result<(), Self::Error> {
        self.0.encode(item, dst)
    }
}

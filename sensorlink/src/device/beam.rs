//! Line-oriented "beam" firmware.
//!
//! The firmware prints one reading per line, terminated by CR LF. It also
//! answers the discovery handshake with `<id:beamscan>`, which is how
//! `sensorlink-find` locates it.

use bytes::BytesMut;
use std::sync::Arc;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

use super::serial::{Family, SerialDevice};
use super::{Device, DriverDescriptor};
use crate::{
    config::Config,
    error::{Error, Result},
    tracing::prelude::*,
};

/// Family name in the driver registry.
pub const FAMILY: &str = "beam";

/// Product id the firmware reports during discovery.
pub const PRODUCT_ID: &str = "<id:beamscan>";

/// Longest line accepted before the stream is considered corrupt.
pub const MAX_LINE: usize = 256;

/// Splits the stream into trimmed, non-empty lines.
#[derive(Debug)]
pub struct BeamCodec {
    lines: LinesCodec,
}

impl Default for BeamCodec {
    fn default() -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(MAX_LINE),
        }
    }
}

fn map_err(e: LinesCodecError) -> Error {
    match e {
        LinesCodecError::MaxLineLengthExceeded => {
            Error::Protocol(format!("line longer than {} bytes", MAX_LINE))
        }
        LinesCodecError::Io(e) => Error::Io(e),
    }
}

impl BeamCodec {
    fn next_line(
        &mut self,
        src: &mut BytesMut,
        eof: bool,
    ) -> Result<Option<String>> {
        loop {
            let line = if eof {
                self.lines.decode_eof(src)
            } else {
                self.lines.decode(src)
            }
            .map_err(map_err)?;

            match line {
                Some(line) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        return Ok(Some(line.to_string()));
                    }
                }
                None => return Ok(None),
            }
        }
    }
}

impl Decoder for BeamCodec {
    type Item = String;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        self.next_line(src, false)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        self.next_line(src, true)
    }
}

/// Beam scanner family.
pub struct Beam;

impl Family for Beam {
    type Frame = String;
    type Codec = BeamCodec;
    const NAME: &'static str = FAMILY;
    const BAUD_RATE: u32 = 115_200;

    fn codec() -> BeamCodec {
        BeamCodec::default()
    }

    fn report(device: &str, frame: &String) {
        debug!(device, reading = %frame, "beam");
    }
}

fn create(config: &Config) -> Result<Arc<dyn Device>> {
    Ok(Arc::new(SerialDevice::<Beam>::new(config)))
}

inventory::submit! {
    DriverDescriptor {
        family: FAMILY,
        prefix: "beam",
        create,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &[u8]) -> Result<Vec<String>> {
        let mut codec = BeamCodec::default();
        let mut buf = BytesMut::from(input);
        let mut out = Vec::new();
        while let Some(line) = codec.decode(&mut buf)? {
            out.push(line);
        }
        while let Some(line) = codec.decode_eof(&mut buf)? {
            out.push(line);
        }
        Ok(out)
    }

    #[test]
    fn test_crlf_lines() {
        assert_eq!(
            decode_all(b"12 340\r\n12 341\r\n").unwrap(),
            vec!["12 340", "12 341"]
        );
    }

    #[test]
    fn test_blank_lines_skipped() {
        assert_eq!(decode_all(b"\r\n  \r\na\r\n").unwrap(), vec!["a"]);
    }

    #[test]
    fn test_trailing_line_without_newline() {
        assert_eq!(decode_all(b"a\nb").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_overlong_line_is_protocol_error() {
        let long = vec![b'x'; MAX_LINE + 1];
        assert!(matches!(decode_all(&long), Err(Error::Protocol(_))));
    }
}

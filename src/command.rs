//! Wire format for the MV16 text protocol.
//!
//! Only the label block is ever written:
//!
//! ```text
//! INPUT LABELS:
//! <index> <label>
//!
//! ```
//!
//! Anything the device sends back is discarded.

use anyhow::{Result, bail};
use std::fmt;
use std::io;
use tokio_util::bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Number of inputs selectable from the rename action.
pub const SOURCE_COUNT: u32 = 16;

const INPUT_LABELS_HEADER: &str = "INPUT LABELS:";

// A single input rename, addressed by the device's zero-based input index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelCommand {
    pub input: u32,
    pub label: String,
}

impl LabelCommand {
    pub fn new(input: u32, label: impl Into<String>) -> Self {
        Self {
            input,
            label: sanitize_label(&label.into()),
        }
    }

    /// Build a command from a 1-based source number as shown to the operator.
    pub fn from_source(source: u32, label: impl Into<String>) -> Result<Self> {
        if source == 0 || source > SOURCE_COUNT {
            bail!("source {} out of range 1..={}", source, SOURCE_COUNT);
        }
        Ok(Self::new(source - 1, label))
    }

    pub fn source(&self) -> u32 {
        self.input + 1
    }
}

impl fmt::Display for LabelCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\n{} {}\n\n",
            INPUT_LABELS_HEADER, self.input, self.label
        )
    }
}

// Line breaks would terminate the block early
fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect()
}

// Write-only codec; the decoder swallows device output so the read half only reports close
#[derive(Debug, Default, Clone, Copy)]
pub struct LabelCodec;

impl Encoder<LabelCommand> for LabelCodec {
    type Error = io::Error;

    fn encode(&mut self, item: LabelCommand, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let text = item.to_string();
        dst.reserve(text.len());
        dst.put_slice(text.as_bytes());
        Ok(())
    }
}

impl Decoder for LabelCodec {
    type Item = ();
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if !src.is_empty() {
            log::trace!("Discarding {} bytes from device", src.len());
            src.clear();
        }
        Ok(None)
    }
}

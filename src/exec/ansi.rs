// src/exec/ansi.rs

//! Terminal colour sequences in captured output.

use std::borrow::Cow;

use regex::Regex;

use crate::errors::Result;

const ESC: u8 = 0x1b;

/// Longest unfinished sequence held back between reads. Anything longer is
/// not a colour sequence and is passed through.
const MAX_PENDING_SEQUENCE: usize = 32;

/// Removes SGR colour sequences (`ESC [ ... m`) from output chunks.
#[derive(Debug, Clone)]
pub struct ColorStripper {
    sequence: Regex,
}

impl ColorStripper {
    pub fn new() -> Result<Self> {
        Ok(Self {
            sequence: Regex::new(r"\x1b\[[0-9;]*m")?,
        })
    }

    pub fn strip<'a>(&self, chunk: &'a str) -> Cow<'a, str> {
        self.sequence.replace_all(chunk, "")
    }
}

/// Offset of a colour sequence at the end of `bytes` whose final `m` has not
/// arrived yet.
pub fn unfinished_sequence_start(bytes: &[u8]) -> Option<usize> {
    let start = bytes.iter().rposition(|&b| b == ESC)?;
    let tail = &bytes[start + 1..];
    if tail.len() >= MAX_PENDING_SEQUENCE {
        return None;
    }

    let unfinished = match tail.split_first() {
        None => true,
        Some((b'[', params)) => params.iter().all(|&b| b.is_ascii_digit() || b == b';'),
        Some(_) => false,
    };
    unfinished.then_some(start)
}

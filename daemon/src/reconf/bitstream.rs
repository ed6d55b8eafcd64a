// This file is part of afupr, an application to orchestrate partial reconfiguration of FPGA accelerator function units.
//
// Copyright 2025 Canonical Ltd.
//
// SPDX-License-Identifier: GPL-3.0-only
//
// afupr is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License version 3, as published by the Free Software Foundation.
//
// afupr is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranties of MERCHANTABILITY, SATISFACTORY QUALITY, or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with this program.  If not, see http://www.gnu.org/licenses/.

//! Decoding of the fixed-layout header that precedes every partial bitstream.
//!
//! The header is a packed, little-endian record of exactly [`HEADER_LEN`] bytes. The payload
//! that gets streamed into the configuration engine follows it directly and is
//! `payload_length` bytes long.
//!
//! | field             | offset | size |
//! |-------------------|-------:|-----:|
//! | signature         |      0 |  256 |
//! | message digest    |    256 |   32 |
//! | public key        |    288 |  260 |
//! | public key hash   |    548 |   32 |
//! | metadata id       |    580 |   16 |
//! | slot type id      |    596 |   16 |
//! | power (watts)     |    612 |    4 |
//! | target port       |    616 |    1 |
//! | latency class     |    617 |    2 |
//! | clock count       |    619 |    4 |
//! | payload length    |    623 |    4 |
//!
//! Parsing copies the header out of the caller's buffer, so the returned
//! [`BitstreamHeader`] does not borrow it.
//!
//! # Examples
//!
//! ```rust,no_run
//! # use afuprd::reconf::bitstream::BitstreamHeader;
//! # let buffer = vec![0u8; 627];
//! let header = BitstreamHeader::parse(&buffer)?;
//! let payload = header.payload(&buffer)?;
//! println!("{} watts, {} payload bytes", header.power_watts, payload.len());
//! # Ok::<(), afuprd::reconf::error::ErrorKind>(())
//! ```

use crate::reconf::error::{ErrorKind, MalformedKind};

pub const SIGNATURE_LEN: usize = 256;
pub const DIGEST_LEN: usize = 32;
pub const PUBLIC_KEY_LEN: usize = 260;
pub const PUBLIC_KEY_HASH_LEN: usize = 32;
pub const ID_LEN: usize = 16;

/// Size in bytes of the encoded header.
pub const HEADER_LEN: usize = SIGNATURE_LEN
    + DIGEST_LEN
    + PUBLIC_KEY_LEN
    + PUBLIC_KEY_HASH_LEN
    + ID_LEN
    + ID_LEN
    + 4
    + 1
    + 2
    + 4
    + 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitstreamHeader {
    pub signature: [u8; SIGNATURE_LEN],
    pub message_digest: [u8; DIGEST_LEN],
    pub public_key: [u8; PUBLIC_KEY_LEN],
    pub public_key_hash: [u8; PUBLIC_KEY_HASH_LEN],
    pub metadata_id: [u8; ID_LEN],
    pub slot_type_id: [u8; ID_LEN],
    pub power_watts: u32,
    pub target_port: u8,
    pub latency_class: u16,
    pub clock_count: u32,
    pub payload_length: u32,
}

/// Forward-only reader over a slice whose length has already been checked.
struct Fields<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Fields<'a> {
    fn bytes<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn u8(&mut self) -> u8 {
        self.bytes::<1>()[0]
    }

    fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.bytes())
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.bytes())
    }
}

impl BitstreamHeader {
    /// Decode the header at the start of `buffer`.
    ///
    /// # Arguments
    ///
    /// * `buffer`: header and payload as supplied by the requester.
    ///
    /// # Returns: `Result<BitstreamHeader, ErrorKind>`
    /// * `Ok(BitstreamHeader)` - copy of the header fields
    /// * `Err(ErrorKind::Malformed)` - the buffer is empty or shorter than [`HEADER_LEN`]
    pub fn parse(buffer: &[u8]) -> Result<BitstreamHeader, ErrorKind> {
        if buffer.is_empty() {
            return Err(ErrorKind::Malformed(MalformedKind::EmptyBuffer));
        }
        if buffer.len() < HEADER_LEN {
            return Err(ErrorKind::Malformed(MalformedKind::TooShort {
                needed: HEADER_LEN,
                found: buffer.len(),
            }));
        }
        let mut fields = Fields {
            buf: &buffer[..HEADER_LEN],
            pos: 0,
        };
        Ok(BitstreamHeader {
            signature: fields.bytes(),
            message_digest: fields.bytes(),
            public_key: fields.bytes(),
            public_key_hash: fields.bytes(),
            metadata_id: fields.bytes(),
            slot_type_id: fields.bytes(),
            power_watts: fields.u32(),
            target_port: fields.u8(),
            latency_class: fields.u16(),
            clock_count: fields.u32(),
            payload_length: fields.u32(),
        })
    }

    /// Encode the header in the same layout [`BitstreamHeader::parse`] reads.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN);
        out.extend_from_slice(&self.signature);
        out.extend_from_slice(&self.message_digest);
        out.extend_from_slice(&self.public_key);
        out.extend_from_slice(&self.public_key_hash);
        out.extend_from_slice(&self.metadata_id);
        out.extend_from_slice(&self.slot_type_id);
        out.extend_from_slice(&self.power_watts.to_le_bytes());
        out.push(self.target_port);
        out.extend_from_slice(&self.latency_class.to_le_bytes());
        out.extend_from_slice(&self.clock_count.to_le_bytes());
        out.extend_from_slice(&self.payload_length.to_le_bytes());
        out
    }

    /// Slice out the payload that follows the header in `buffer`.
    ///
    /// # Returns: `Result<&[u8], ErrorKind>`
    /// * `Err(ErrorKind::Malformed(PayloadTruncated))` - fewer than `payload_length` bytes
    ///   follow the header
    pub fn payload<'a>(&self, buffer: &'a [u8]) -> Result<&'a [u8], ErrorKind> {
        let available = buffer.len().saturating_sub(HEADER_LEN);
        let declared = self.payload_length as usize;
        if declared > available {
            return Err(ErrorKind::Malformed(MalformedKind::PayloadTruncated {
                declared: self.payload_length,
                available,
            }));
        }
        Ok(&buffer[HEADER_LEN..HEADER_LEN + declared])
    }
}

impl Default for BitstreamHeader {
    fn default() -> Self {
        BitstreamHeader {
            signature: [0; SIGNATURE_LEN],
            message_digest: [0; DIGEST_LEN],
            public_key: [0; PUBLIC_KEY_LEN],
            public_key_hash: [0; PUBLIC_KEY_HASH_LEN],
            metadata_id: [0; ID_LEN],
            slot_type_id: [0; ID_LEN],
            power_watts: 0,
            target_port: 0,
            latency_class: 0,
            clock_count: 0,
            payload_length: 0,
        }
    }
}

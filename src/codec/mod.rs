// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! PDU encoding and decoding shared by master and slave.

use std::{
    fmt,
    io::{self, Cursor},
};

use byteorder::{BigEndian, ReadBytesExt as _};
use bytes::{BufMut, Bytes};

use crate::{
    backend::Backend,
    frame::{
        Address, Coil, MessageType, Quantity, Request, Response, Word, MAX_PDU_SIZE,
        MAX_READ_BITS, MAX_READ_REGISTERS, MAX_RW_READ_REGISTERS, MAX_RW_WRITE_REGISTERS,
        MAX_WRITE_BITS, MAX_WRITE_REGISTERS,
    },
    Error, FunctionCode, Result,
};

/// Length rules for function codes the engine doesn't know.
///
/// `meta` returns the number of fixed bytes following the function code,
/// `data` the number of variable bytes after them. `data` receives the
/// received PDU starting at the function code, which may be incomplete.
#[derive(Clone, Copy)]
pub struct CustomLengths {
    pub meta: fn(function: u8, msg_type: MessageType) -> usize,
    pub data: fn(pdu: &[u8], msg_type: MessageType) -> usize,
}

impl fmt::Debug for CustomLengths {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomLengths").finish_non_exhaustive()
    }
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) fn u16_len(len: usize) -> u16 {
    // This type conversion should always be safe, because either
    // the caller is responsible to pass a valid usize or the
    // possible values are limited by the protocol.
    debug_assert!(len <= u16::MAX.into());
    len as u16
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) fn u8_len(len: usize) -> u8 {
    debug_assert!(len <= u8::MAX.into());
    len as u8
}

pub(crate) fn bool_to_coil(state: bool) -> u16 {
    if state {
        0xFF00
    } else {
        0x0000
    }
}

pub(crate) fn coil_to_bool(coil: u16) -> Option<bool> {
    match coil {
        0xFF00 => Some(true),
        0x0000 => Some(false),
        _ => None,
    }
}

pub(crate) const fn packed_coils_size(count: usize) -> usize {
    (count + 7) / 8
}

pub(crate) fn encode_packed_coils(dst: &mut impl BufMut, coils: &[Coil]) {
    for chunk in coils.chunks(8) {
        let packed = chunk
            .iter()
            .enumerate()
            .fold(0u8, |acc, (i, coil)| acc | (u8::from(*coil) << i));
        dst.put_u8(packed);
    }
}

/// Unpacks `dest.len()` bits from `bytes`.
///
/// `bytes` must hold at least [`packed_coils_size`] bytes.
pub(crate) fn decode_packed_coils(bytes: &[u8], dest: &mut [Coil]) {
    for (i, coil) in dest.iter_mut().enumerate() {
        *coil = (bytes[i / 8] >> (i % 8)) & 0b1 > 0;
    }
}

fn check_quantity(quantity: usize, max: Quantity, what: &'static str) -> Result<Quantity> {
    if quantity == 0 || quantity > usize::from(max) {
        return Err(Error::IllegalDataValue(what));
    }
    Ok(u16_len(quantity))
}

pub(crate) fn check_range(address: Address, quantity: Quantity) -> Result<()> {
    if u32::from(address) + u32::from(quantity) > 0x1_0000 {
        return Err(Error::IllegalDataAddress { address, quantity });
    }
    Ok(())
}

/// Rejects requests exceeding the protocol limits before anything is encoded.
pub(crate) fn validate_request(request: &Request<'_>) -> Result<()> {
    use crate::frame::Request::*;
    match request {
        ReadCoils(address, quantity) | ReadDiscreteInputs(address, quantity) => {
            let quantity =
                check_quantity(usize::from(*quantity), MAX_READ_BITS, "too many bits requested")?;
            check_range(*address, quantity)
        }
        ReadHoldingRegisters(address, quantity) | ReadInputRegisters(address, quantity) => {
            let quantity = check_quantity(
                usize::from(*quantity),
                MAX_READ_REGISTERS,
                "too many registers requested",
            )?;
            check_range(*address, quantity)
        }
        WriteMultipleCoils(address, coils) => {
            let quantity = check_quantity(coils.len(), MAX_WRITE_BITS, "too many bits to write")?;
            check_range(*address, quantity)
        }
        WriteMultipleRegisters(address, words) => {
            let quantity = check_quantity(
                words.len(),
                MAX_WRITE_REGISTERS,
                "too many registers to write",
            )?;
            check_range(*address, quantity)
        }
        ReadWriteMultipleRegisters(read_address, read_quantity, write_address, words) => {
            let write_quantity = check_quantity(
                words.len(),
                MAX_RW_WRITE_REGISTERS,
                "too many registers to write",
            )?;
            let read_quantity = check_quantity(
                usize::from(*read_quantity),
                MAX_RW_READ_REGISTERS,
                "too many registers requested",
            )?;
            check_range(*write_address, write_quantity)?;
            check_range(*read_address, read_quantity)
        }
        Custom(function, _) => {
            if function & 0x80 != 0 {
                return Err(Error::IllegalFunction(FunctionCode::new(*function)));
            }
            Ok(())
        }
        WriteSingleCoil(_, _)
        | WriteSingleRegister(_, _)
        | ReadExceptionStatus
        | ReportServerId
        | MaskWriteRegister(_, _, _) => Ok(()),
    }
}

pub(crate) fn request_pdu_size(request: &Request<'_>) -> Result<usize> {
    use crate::frame::Request::*;
    let size = match request {
        ReadCoils(_, _)
        | ReadDiscreteInputs(_, _)
        | ReadInputRegisters(_, _)
        | ReadHoldingRegisters(_, _)
        | WriteSingleRegister(_, _)
        | WriteSingleCoil(_, _) => 5,
        WriteMultipleCoils(_, coils) => 6 + packed_coils_size(coils.len()),
        WriteMultipleRegisters(_, data) => 6 + data.len() * 2,
        ReadExceptionStatus | ReportServerId => 1,
        MaskWriteRegister(_, _, _) => 7,
        ReadWriteMultipleRegisters(_, _, _, data) => 10 + data.len() * 2,
        Custom(_, data) => 1 + data.len(),
    };
    if size > MAX_PDU_SIZE {
        return Err(Error::BufferOverflow {
            required: size,
            capacity: MAX_PDU_SIZE,
        });
    }
    Ok(size)
}

/// Encodes everything after the function code.
///
/// `dst` must have room for [`request_pdu_size`] minus one bytes.
pub(crate) fn encode_request_data(dst: &mut impl BufMut, request: &Request<'_>) {
    use crate::frame::Request::*;
    match request {
        ReadCoils(address, quantity)
        | ReadDiscreteInputs(address, quantity)
        | ReadInputRegisters(address, quantity)
        | ReadHoldingRegisters(address, quantity) => {
            dst.put_u16(*address);
            dst.put_u16(*quantity);
        }
        WriteSingleCoil(address, state) => {
            dst.put_u16(*address);
            dst.put_u16(bool_to_coil(*state));
        }
        WriteMultipleCoils(address, coils) => {
            dst.put_u16(*address);
            dst.put_u16(u16_len(coils.len()));
            dst.put_u8(u8_len(packed_coils_size(coils.len())));
            encode_packed_coils(dst, coils);
        }
        WriteSingleRegister(address, word) => {
            dst.put_u16(*address);
            dst.put_u16(*word);
        }
        WriteMultipleRegisters(address, words) => {
            dst.put_u16(*address);
            let len = words.len();
            dst.put_u16(u16_len(len));
            dst.put_u8(u8_len(len * 2));
            for w in words.as_ref() {
                dst.put_u16(*w);
            }
        }
        ReadExceptionStatus | ReportServerId => {}
        MaskWriteRegister(address, and_mask, or_mask) => {
            dst.put_u16(*address);
            dst.put_u16(*and_mask);
            dst.put_u16(*or_mask);
        }
        ReadWriteMultipleRegisters(read_address, quantity, write_address, words) => {
            dst.put_u16(*read_address);
            dst.put_u16(*quantity);
            dst.put_u16(*write_address);
            let len = words.len();
            dst.put_u16(u16_len(len));
            dst.put_u8(u8_len(len * 2));
            for w in words.as_ref() {
                dst.put_u16(*w);
            }
        }
        Custom(_, custom_data) => {
            dst.put_slice(custom_data.as_ref());
        }
    }
}

fn truncated(_: io::Error) -> Error {
    Error::MalformedFrame("truncated PDU")
}

fn read_u16_be(rdr: &mut Cursor<&[u8]>) -> Result<u16> {
    rdr.read_u16::<BigEndian>().map_err(truncated)
}

fn read_u8(rdr: &mut Cursor<&[u8]>) -> Result<u8> {
    rdr.read_u8().map_err(truncated)
}

fn read_words(rdr: &mut Cursor<&[u8]>) -> Result<Vec<Word>> {
    let byte_count = read_u8(rdr)?;
    if byte_count % 2 != 0 {
        return Err(Error::MalformedFrame("odd register byte count"));
    }
    let quantity = byte_count / 2;
    let mut data = Vec::with_capacity(quantity.into());
    for _ in 0..quantity {
        data.push(read_u16_be(rdr)?);
    }
    Ok(data)
}

fn read_bits(rdr: &mut Cursor<&[u8]>, pdu: &[u8]) -> Result<Vec<Coil>> {
    let byte_count = usize::from(read_u8(rdr)?);
    let packed_coils = pdu
        .get(2..2 + byte_count)
        .ok_or(Error::MalformedFrame("truncated PDU"))?;
    rdr.set_position((2 + byte_count) as u64);
    // Without the requested quantity the whole bytes are unpacked.
    let mut coils = vec![false; byte_count * 8];
    decode_packed_coils(packed_coils, &mut coils);
    Ok(coils)
}

/// Decodes a non-exception response PDU starting at the function code.
pub(crate) fn decode_response_pdu(pdu: &[u8]) -> Result<Response> {
    use crate::frame::Response::*;
    if pdu.len() > MAX_PDU_SIZE {
        return Err(Error::MalformedFrame("response PDU size exceeded"));
    }
    let rdr = &mut Cursor::new(pdu);
    let fn_code = read_u8(rdr)?;
    let rsp = match fn_code {
        0x01 => ReadCoils(read_bits(rdr, pdu)?),
        0x02 => ReadDiscreteInputs(read_bits(rdr, pdu)?),
        0x03 => ReadHoldingRegisters(read_words(rdr)?),
        0x04 => ReadInputRegisters(read_words(rdr)?),
        0x05 => {
            let address = read_u16_be(rdr)?;
            let coil = coil_to_bool(read_u16_be(rdr)?)
                .ok_or(Error::MalformedFrame("invalid coil value"))?;
            WriteSingleCoil(address, coil)
        }
        0x06 => WriteSingleRegister(read_u16_be(rdr)?, read_u16_be(rdr)?),
        0x07 => ReadExceptionStatus(read_u8(rdr)?),
        0x0F => WriteMultipleCoils(read_u16_be(rdr)?, read_u16_be(rdr)?),
        0x10 => WriteMultipleRegisters(read_u16_be(rdr)?, read_u16_be(rdr)?),
        0x11 => {
            let byte_count = read_u8(rdr)?;
            if byte_count < 2 {
                return Err(Error::MalformedFrame("server id too short"));
            }
            let server_id = read_u8(rdr)?;
            let run_indication_status = match read_u8(rdr)? {
                0x00 => false,
                0xFF => true,
                _ => return Err(Error::MalformedFrame("invalid run indication status")),
            };
            let data_len = usize::from(byte_count - 2);
            let data = pdu
                .get(4..4 + data_len)
                .ok_or(Error::MalformedFrame("truncated PDU"))?
                .to_vec();
            rdr.set_position((4 + data_len) as u64);
            ReportServerId(server_id, run_indication_status, data)
        }
        0x16 => MaskWriteRegister(read_u16_be(rdr)?, read_u16_be(rdr)?, read_u16_be(rdr)?),
        0x17 => ReadWriteMultipleRegisters(read_words(rdr)?),
        _ => {
            // Consume all remaining bytes as custom data.
            return Ok(Custom(fn_code, Bytes::copy_from_slice(&pdu[1..])));
        }
    };
    // Verify that all data has been consumed and decoded.
    if rdr.position() != pdu.len() as u64 {
        return Err(Error::MalformedFrame("undecoded response data"));
    }
    Ok(rsp)
}

/// Number of fixed bytes after the function code.
fn meta_length(function: u8, msg_type: MessageType) -> Option<usize> {
    let len = match msg_type {
        MessageType::Indication => match function {
            0x01..=0x06 => 4,
            0x07 | 0x0B | 0x0C | 0x11 => 0,
            0x0F | 0x10 => 5,
            0x16 => 6,
            0x17 => 9,
            _ => return None,
        },
        MessageType::Confirmation => match function {
            0x80..=0xFF => 1,
            0x01..=0x04 | 0x07 | 0x0C | 0x11 | 0x17 => 1,
            0x05 | 0x06 | 0x0B | 0x0F | 0x10 => 4,
            0x16 => 6,
            _ => return None,
        },
    };
    Some(len)
}

/// Whether the last fixed byte is a byte count of the variable data.
fn has_byte_count(function: u8, msg_type: MessageType) -> bool {
    match msg_type {
        MessageType::Indication => matches!(function, 0x0F | 0x10 | 0x17),
        MessageType::Confirmation => {
            matches!(function, 0x01..=0x04 | 0x0C | 0x11 | 0x17)
        }
    }
}

fn unknown_frame_length(backend: Backend, msg: &[u8]) -> Option<usize> {
    match backend {
        #[cfg(feature = "rtu")]
        Backend::Rtu => Some(msg.len()),
        #[cfg(feature = "tcp")]
        Backend::Tcp => crate::backend::tcp::declared_frame_length(msg),
    }
}

/// Computes the length of the frame at the start of `msg` and verifies
/// its integrity.
///
/// Bytes following the frame are ignored.
pub(crate) fn judge_frame(
    backend: Backend,
    msg: &[u8],
    msg_type: MessageType,
    custom_lengths: Option<&CustomLengths>,
) -> Result<usize> {
    let header_length = backend.header_length();
    let checksum_length = backend.checksum_length();
    let Some(&function) = msg.get(header_length) else {
        return Err(Error::FrameTooShort {
            expected: header_length + 1,
            actual: msg.len(),
        });
    };
    let pdu = &msg[header_length..];
    let frame_length = if let Some(meta) = meta_length(function, msg_type) {
        let data = if has_byte_count(function, msg_type) {
            let Some(&byte_count) = pdu.get(meta) else {
                return Err(Error::FrameTooShort {
                    expected: header_length + 1 + meta,
                    actual: msg.len(),
                });
            };
            usize::from(byte_count)
        } else {
            0
        };
        header_length + 1 + meta + data + checksum_length
    } else if let Some(custom) = custom_lengths {
        (custom.meta)(function, msg_type)
            .checked_add((custom.data)(pdu, msg_type))
            .and_then(|len| len.checked_add(header_length + 1 + checksum_length))
            .ok_or(Error::FrameTooLong {
                max: backend.max_adu_length(),
                actual: usize::MAX,
            })?
    } else {
        unknown_frame_length(backend, msg).ok_or(Error::FrameTooShort {
            expected: header_length + 1,
            actual: msg.len(),
        })?
    };
    let max = backend.max_adu_length();
    if frame_length > max {
        return Err(Error::FrameTooLong {
            max,
            actual: frame_length,
        });
    }
    if msg.len() < frame_length {
        return Err(Error::FrameTooShort {
            expected: frame_length,
            actual: msg.len(),
        });
    }
    backend.check_integrity(&msg[..frame_length])
}

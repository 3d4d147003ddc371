// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! RTU framing: `[slave][function][data..][crc lo][crc hi]`

use bytes::BufMut as _;

use crate::{Error, FunctionCode, Result, Slave};

pub const HEADER_LENGTH: usize = 1;
pub const CHECKSUM_LENGTH: usize = 2;
pub const MAX_ADU_LENGTH: usize = 256;

// addr + function + crc
const MIN_ADU_LENGTH: usize = HEADER_LENGTH + 1 + CHECKSUM_LENGTH;

const fn build_crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        #[allow(clippy::cast_possible_truncation)]
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            if (crc & 0x0001) != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

const CRC16_TABLE: [u16; 256] = build_crc16_table();

/// CRC-16/MODBUS of `data`.
///
/// The result is transmitted low byte first.
#[must_use]
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0xFFFF_u16;
    for byte in data {
        let idx = usize::from((crc ^ u16::from(*byte)) & 0x00FF);
        crc = (crc >> 8) ^ CRC16_TABLE[idx];
    }
    crc
}

pub(crate) fn set_slave(slave: Slave) -> Result<Slave> {
    if slave.is_reserved() {
        return Err(Error::InvalidSlave(slave));
    }
    Ok(slave)
}

pub(crate) fn build_basis(slave: Slave, function: FunctionCode, buf: &mut [u8]) -> Result<usize> {
    let required = HEADER_LENGTH + 1;
    if buf.len() < required {
        return Err(Error::BufferOverflow {
            required,
            capacity: buf.len(),
        });
    }
    let mut dst = &mut buf[..];
    dst.put_u8(slave.into());
    dst.put_u8(function.value());
    Ok(required)
}

pub(crate) fn send_msg_pre(buf: &mut [u8], len: usize) -> Result<usize> {
    let required = len + CHECKSUM_LENGTH;
    let capacity = buf.len().min(MAX_ADU_LENGTH);
    if required > capacity {
        return Err(Error::BufferOverflow { required, capacity });
    }
    let crc = crc16(&buf[..len]);
    let mut dst = &mut buf[len..required];
    dst.put_u16_le(crc);
    Ok(required)
}

pub(crate) fn check_integrity(msg: &[u8]) -> Result<usize> {
    if msg.len() < MIN_ADU_LENGTH {
        return Err(Error::FrameTooShort {
            expected: MIN_ADU_LENGTH,
            actual: msg.len(),
        });
    }
    let (payload, crc) = msg.split_at(msg.len() - CHECKSUM_LENGTH);
    let calculated = crc16(payload);
    let received = u16::from_le_bytes([crc[0], crc[1]]);
    if calculated != received {
        log::warn!("Invalid CRC: calculated 0x{calculated:04X}, received 0x{received:04X}");
        return Err(Error::ChecksumMismatch {
            calculated,
            received,
        });
    }
    Ok(msg.len())
}

pub(crate) fn pre_check_confirmation(req: &[u8], rsp: &[u8]) -> Result<()> {
    let (Some(&request), Some(&response)) = (req.first(), rsp.first()) else {
        return Err(Error::FrameTooShort {
            expected: HEADER_LENGTH,
            actual: req.len().min(rsp.len()),
        });
    };
    let (request, response) = (Slave(request), Slave(response));
    if !request.is_broadcast() && request != response {
        return Err(Error::SlaveMismatch { request, response });
    }
    Ok(())
}

// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! TCP framing with the MBAP header:
//! `[tid hi][tid lo][0x00][0x00][len hi][len lo][unit id][function][data..]`

use byteorder::{BigEndian, ByteOrder as _};
use bytes::BufMut as _;

use super::TransactionId;
use crate::{Error, FunctionCode, Result, Slave};

pub const HEADER_LENGTH: usize = 7;
pub const CHECKSUM_LENGTH: usize = 0;
pub const MAX_ADU_LENGTH: usize = 260;

const PROTOCOL_ID: u16 = 0x0000;

// The length field counts the unit id and everything after it.
const LENGTH_FIELD_OFFSET: usize = 6;

pub(crate) fn build_basis(
    transaction_id: TransactionId,
    slave: Slave,
    function: FunctionCode,
    buf: &mut [u8],
) -> Result<usize> {
    let required = HEADER_LENGTH + 1;
    if buf.len() < required {
        return Err(Error::BufferOverflow {
            required,
            capacity: buf.len(),
        });
    }
    let mut dst = &mut buf[..];
    dst.put_u16(transaction_id);
    dst.put_u16(PROTOCOL_ID);
    // Patched by send_msg_pre()
    dst.put_u16(0);
    dst.put_u8(slave.into());
    dst.put_u8(function.value());
    Ok(required)
}

pub(crate) fn transaction_id(msg: &[u8]) -> TransactionId {
    msg.get(..2).map_or(0, BigEndian::read_u16)
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) fn send_msg_pre(buf: &mut [u8], len: usize) -> Result<usize> {
    if len < HEADER_LENGTH || len > buf.len() {
        return Err(Error::FrameTooShort {
            expected: HEADER_LENGTH,
            actual: len.min(buf.len()),
        });
    }
    if len > MAX_ADU_LENGTH {
        return Err(Error::BufferOverflow {
            required: len,
            capacity: MAX_ADU_LENGTH,
        });
    }
    // Bounded by MAX_ADU_LENGTH
    BigEndian::write_u16(&mut buf[4..6], (len - LENGTH_FIELD_OFFSET) as u16);
    Ok(len)
}

pub(crate) fn check_integrity(msg: &[u8]) -> Result<usize> {
    let min_len = HEADER_LENGTH + 1;
    if msg.len() < min_len {
        return Err(Error::FrameTooShort {
            expected: min_len,
            actual: msg.len(),
        });
    }
    let protocol_id = BigEndian::read_u16(&msg[2..4]);
    if protocol_id != PROTOCOL_ID {
        log::warn!("Invalid protocol identifier: 0x{protocol_id:04X}");
        return Err(Error::InvalidProtocolId(protocol_id));
    }
    let declared = usize::from(BigEndian::read_u16(&msg[4..6]));
    let actual = msg.len() - LENGTH_FIELD_OFFSET;
    if declared != actual {
        log::warn!("Invalid MBAP length: declared {declared}, actual {actual}");
        return Err(Error::LengthFieldMismatch { declared, actual });
    }
    Ok(msg.len())
}

pub(crate) fn pre_check_confirmation(req: &[u8], rsp: &[u8]) -> Result<()> {
    if req.len() < HEADER_LENGTH || rsp.len() < HEADER_LENGTH {
        return Err(Error::FrameTooShort {
            expected: HEADER_LENGTH,
            actual: req.len().min(rsp.len()),
        });
    }
    let request = transaction_id(req);
    let response = transaction_id(rsp);
    if request != response {
        return Err(Error::TransactionMismatch { request, response });
    }
    let (request, response) = (Slave(req[HEADER_LENGTH - 1]), Slave(rsp[HEADER_LENGTH - 1]));
    if request != response {
        return Err(Error::SlaveMismatch { request, response });
    }
    Ok(())
}

/// Number of bytes a frame occupies according to its MBAP length field.
pub(crate) fn declared_frame_length(msg: &[u8]) -> Option<usize> {
    msg.get(4..6)
        .map(|len| LENGTH_FIELD_OFFSET + usize::from(BigEndian::read_u16(len)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_basis_with_placeholder_length() {
        let mut buf = [0xAA; 12];
        let len = build_basis(0x1234, Slave(0x11), FunctionCode::ReadCoils, &mut buf).unwrap();
        assert_eq!(len, 8);
        assert_eq!(&buf[..8], &[0x12, 0x34, 0x00, 0x00, 0x00, 0x00, 0x11, 0x01]);
    }

    #[test]
    fn patch_length_field() {
        let mut buf = [
            0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x01, 0x03, 0x00, 0x10, 0x00, 0x04,
        ];
        assert_eq!(send_msg_pre(&mut buf, 12).unwrap(), 12);
        assert_eq!(&buf[4..6], &[0x00, 0x06]);
        assert_eq!(check_integrity(&buf).unwrap(), 12);
    }

    #[test]
    fn invalid_protocol_id() {
        let buf = [0x00, 0x01, 0x00, 0x01, 0x00, 0x02, 0x01, 0x07];
        assert_eq!(
            check_integrity(&buf).unwrap_err(),
            Error::InvalidProtocolId(1)
        );
    }

    #[test]
    fn length_field_mismatch() {
        let buf = [0x00, 0x01, 0x00, 0x00, 0x00, 0x03, 0x01, 0x07];
        assert_eq!(
            check_integrity(&buf).unwrap_err(),
            Error::LengthFieldMismatch {
                declared: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn confirmation_of_another_transaction() {
        let req = [0x00, 0x02, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03];
        let rsp = [0x00, 0x01, 0x00, 0x00, 0x00, 0x03, 0x01, 0x03];
        assert_eq!(
            pre_check_confirmation(&req, &rsp).unwrap_err(),
            Error::TransactionMismatch {
                request: 2,
                response: 1
            }
        );
        assert!(pre_check_confirmation(&req, &req).is_ok());
    }

    #[test]
    fn confirmation_of_another_unit() {
        let req = [0x00, 0x02, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03];
        let rsp = [0x00, 0x02, 0x00, 0x00, 0x00, 0x03, 0x02, 0x03];
        assert_eq!(
            pre_check_confirmation(&req, &rsp).unwrap_err(),
            Error::SlaveMismatch {
                request: Slave(1),
                response: Slave(2)
            }
        );
    }

    #[test]
    fn transaction_id_of_short_buffer() {
        assert_eq!(transaction_id(&[0x01]), 0);
        assert_eq!(transaction_id(&[0x01, 0x02, 0x03]), 0x0102);
    }
}

// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use modbus_engine::{
    Address, BitTable, Coil, Context, ExceptionCode, RegisterTable, Storage, Word,
};

/// Fails every access with a different exception.
pub struct ExceptionStorage;

impl Storage for ExceptionStorage {
    fn read_bits(
        &mut self,
        table: BitTable,
        _address: Address,
        _dest: &mut [Coil],
    ) -> Result<(), ExceptionCode> {
        match table {
            BitTable::Coils => Err(ExceptionCode::Acknowledge),
            BitTable::DiscreteInputs => Err(ExceptionCode::GatewayPathUnavailable),
        }
    }

    fn read_registers(
        &mut self,
        table: RegisterTable,
        _address: Address,
        _dest: &mut [Word],
    ) -> Result<(), ExceptionCode> {
        match table {
            RegisterTable::Holding => Err(ExceptionCode::IllegalFunction),
            RegisterTable::Input => Err(ExceptionCode::IllegalDataValue),
        }
    }

    fn write_bits(&mut self, _address: Address, values: &[Coil]) -> Result<(), ExceptionCode> {
        if values.len() == 1 {
            Err(ExceptionCode::GatewayTargetDevice)
        } else {
            Err(ExceptionCode::IllegalDataAddress)
        }
    }

    fn write_registers(&mut self, _address: Address, values: &[Word]) -> Result<(), ExceptionCode> {
        if values.len() == 1 {
            Err(ExceptionCode::MemoryParityError)
        } else {
            Err(ExceptionCode::ServerDeviceBusy)
        }
    }

    fn read_exception_status(&mut self) -> Result<u8, ExceptionCode> {
        Err(ExceptionCode::NegativeAcknowledge)
    }

    fn report_server_id(&mut self, _data: &mut [u8]) -> Result<(bool, usize), ExceptionCode> {
        Err(ExceptionCode::ServerDeviceFailure)
    }

    fn custom_function(
        &mut self,
        _function: u8,
        _request: &[u8],
        _response: &mut [u8],
    ) -> Result<usize, ExceptionCode> {
        Err(ExceptionCode::NotDefined)
    }
}

/// Moves the pending request of `master` through `slave` and places the
/// response into the receive buffer of `master`.
pub fn exchange(master: &mut Context, slave: &mut Context, storage: &mut impl Storage) -> usize {
    let request = master.send_buf().to_vec();
    let len = slave.receive(&request).unwrap();
    let response = slave
        .process_indication(len, storage)
        .unwrap()
        .expect("no response")
        .to_vec();
    master.receive(&response).unwrap()
}

pub fn check_master_context(mut master: Context, mut slave: Context) {
    let mut storage = ExceptionStorage;

    master.build_read_coils(0x00, 2).unwrap();
    let len = exchange(&mut master, &mut slave, &mut storage);
    assert_eq!(
        master.parse_read_coils(len).unwrap(),
        Err(ExceptionCode::Acknowledge)
    );

    master.build_read_discrete_inputs(0x00, 2).unwrap();
    let len = exchange(&mut master, &mut slave, &mut storage);
    assert_eq!(
        master.parse_read_discrete_inputs(len).unwrap(),
        Err(ExceptionCode::GatewayPathUnavailable)
    );

    master.build_write_single_coil(0x00, true).unwrap();
    let len = exchange(&mut master, &mut slave, &mut storage);
    assert_eq!(
        master.parse_write(len).unwrap(),
        Err(ExceptionCode::GatewayTargetDevice)
    );

    master.build_write_multiple_coils(0x00, &[true, false]).unwrap();
    let len = exchange(&mut master, &mut slave, &mut storage);
    assert_eq!(
        master.parse_write(len).unwrap(),
        Err(ExceptionCode::IllegalDataAddress)
    );

    master.build_read_input_registers(0x00, 2).unwrap();
    let len = exchange(&mut master, &mut slave, &mut storage);
    assert_eq!(
        master.parse_read_input_registers(len).unwrap(),
        Err(ExceptionCode::IllegalDataValue)
    );

    master.build_read_holding_registers(0x00, 2).unwrap();
    let len = exchange(&mut master, &mut slave, &mut storage);
    assert_eq!(
        master.parse_read_holding_registers(len).unwrap(),
        Err(ExceptionCode::IllegalFunction)
    );

    master.build_write_single_register(0x00, 42).unwrap();
    let len = exchange(&mut master, &mut slave, &mut storage);
    assert_eq!(
        master.parse_write(len).unwrap(),
        Err(ExceptionCode::MemoryParityError)
    );

    master.build_write_multiple_registers(0x00, &[42, 43]).unwrap();
    let len = exchange(&mut master, &mut slave, &mut storage);
    assert_eq!(
        master.parse_write(len).unwrap(),
        Err(ExceptionCode::ServerDeviceBusy)
    );

    master.build_read_exception_status().unwrap();
    let len = exchange(&mut master, &mut slave, &mut storage);
    assert_eq!(
        master.parse_read_exception_status(len).unwrap(),
        Err(ExceptionCode::NegativeAcknowledge)
    );

    master.build_report_server_id().unwrap();
    let len = exchange(&mut master, &mut slave, &mut storage);
    assert_eq!(
        master.parse_report_server_id(len).unwrap(),
        Err(ExceptionCode::ServerDeviceFailure)
    );

    // The current value is read before the masks are applied.
    master.build_masked_write_register(0x00, 0xF0, 0x0F).unwrap();
    let len = exchange(&mut master, &mut slave, &mut storage);
    assert_eq!(
        master.parse_write(len).unwrap(),
        Err(ExceptionCode::IllegalFunction)
    );

    let slave_id = u8::from(master.slave());
    master.build_raw_request(&[slave_id, 0x41, 0x01]).unwrap();
    let len = exchange(&mut master, &mut slave, &mut storage);
    assert_eq!(
        master.parse_response(len).unwrap(),
        Err(ExceptionCode::NotDefined)
    );
}

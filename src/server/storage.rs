// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::ops::{DerefMut, Range};

use crate::{
    frame::{Address, Coil, ExceptionCode, FunctionCode, Word},
    Slave,
};

/// Identification reported by [`Storage::report_server_id`] unless overridden.
pub const DEFAULT_SERVER_ID: &str = concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"));

/// The bit tables of a slave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitTable {
    Coils,
    DiscreteInputs,
}

/// The register tables of a slave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterTable {
    Holding,
    Input,
}

/// The data of a slave.
///
/// Every access fails with the exception that is sent back to the master.
/// Returning [`ExceptionCode::Unknown`] suppresses the response.
pub trait Storage {
    /// Fills `dest` with the bits starting at `address`.
    fn read_bits(
        &mut self,
        table: BitTable,
        address: Address,
        dest: &mut [Coil],
    ) -> Result<(), ExceptionCode>;

    /// Fills `dest` with the registers starting at `address`.
    fn read_registers(
        &mut self,
        table: RegisterTable,
        address: Address,
        dest: &mut [Word],
    ) -> Result<(), ExceptionCode>;

    /// Writes coils starting at `address`.
    fn write_bits(&mut self, address: Address, values: &[Coil]) -> Result<(), ExceptionCode>;

    /// Writes holding registers starting at `address`.
    fn write_registers(&mut self, address: Address, values: &[Word]) -> Result<(), ExceptionCode>;

    /// Decides whether an indication addressed to `slave` is served.
    ///
    /// Called for every indication that passed the address filter of the
    /// transport, before the request is executed. The returned exception is
    /// sent back instead, [`ExceptionCode::Unknown`] discards the indication
    /// silently.
    fn check_indication(
        &mut self,
        slave: Slave,
        function: FunctionCode,
    ) -> Result<(), ExceptionCode> {
        let _ = (slave, function);
        Ok(())
    }

    /// Called with the outcome of every checked indication, after the
    /// request has been executed and before the response is built.
    fn indication_done(&mut self, function: FunctionCode, result: Result<(), ExceptionCode>) {
        let _ = (function, result);
    }

    /// The eight exception status outputs (0x07).
    fn read_exception_status(&mut self) -> Result<u8, ExceptionCode> {
        Err(ExceptionCode::IllegalFunction)
    }

    /// Writes the device specific identification into `data` (0x11).
    ///
    /// Returns the run indicator and the number of bytes written.
    fn report_server_id(&mut self, data: &mut [u8]) -> Result<(bool, usize), ExceptionCode> {
        let id = DEFAULT_SERVER_ID.as_bytes();
        let len = id.len().min(data.len());
        data[..len].copy_from_slice(&id[..len]);
        Ok((true, len))
    }

    /// Handles a function code unknown to the engine.
    ///
    /// `request` holds the data following the function code. Returns the
    /// number of bytes written into `response`, again without the function
    /// code.
    fn custom_function(
        &mut self,
        function: u8,
        request: &[u8],
        response: &mut [u8],
    ) -> Result<usize, ExceptionCode> {
        let _ = (function, request, response);
        Err(ExceptionCode::IllegalFunction)
    }
}

impl<D> Storage for D
where
    D: DerefMut + ?Sized,
    D::Target: Storage,
{
    /// A forwarding blanket impl to support smart pointers around [`Storage`].
    fn read_bits(
        &mut self,
        table: BitTable,
        address: Address,
        dest: &mut [Coil],
    ) -> Result<(), ExceptionCode> {
        self.deref_mut().read_bits(table, address, dest)
    }

    fn read_registers(
        &mut self,
        table: RegisterTable,
        address: Address,
        dest: &mut [Word],
    ) -> Result<(), ExceptionCode> {
        self.deref_mut().read_registers(table, address, dest)
    }

    fn write_bits(&mut self, address: Address, values: &[Coil]) -> Result<(), ExceptionCode> {
        self.deref_mut().write_bits(address, values)
    }

    fn write_registers(&mut self, address: Address, values: &[Word]) -> Result<(), ExceptionCode> {
        self.deref_mut().write_registers(address, values)
    }

    fn check_indication(
        &mut self,
        slave: Slave,
        function: FunctionCode,
    ) -> Result<(), ExceptionCode> {
        self.deref_mut().check_indication(slave, function)
    }

    fn indication_done(&mut self, function: FunctionCode, result: Result<(), ExceptionCode>) {
        self.deref_mut().indication_done(function, result);
    }

    fn read_exception_status(&mut self) -> Result<u8, ExceptionCode> {
        self.deref_mut().read_exception_status()
    }

    fn report_server_id(&mut self, data: &mut [u8]) -> Result<(bool, usize), ExceptionCode> {
        self.deref_mut().report_server_id(data)
    }

    fn custom_function(
        &mut self,
        function: u8,
        request: &[u8],
        response: &mut [u8],
    ) -> Result<usize, ExceptionCode> {
        self.deref_mut().custom_function(function, request, response)
    }
}

/// Fixed-size in-memory tables, all starting at address 0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStorage {
    pub coils: Vec<Coil>,
    pub discrete_inputs: Vec<Coil>,
    pub holding_registers: Vec<Word>,
    pub input_registers: Vec<Word>,
}

impl MemoryStorage {
    /// Creates zero-initialized tables of the given sizes.
    #[must_use]
    pub fn new(
        coils: usize,
        discrete_inputs: usize,
        holding_registers: usize,
        input_registers: usize,
    ) -> Self {
        Self {
            coils: vec![false; coils],
            discrete_inputs: vec![false; discrete_inputs],
            holding_registers: vec![0; holding_registers],
            input_registers: vec![0; input_registers],
        }
    }
}

fn table_range(size: usize, address: Address, count: usize) -> Result<Range<usize>, ExceptionCode> {
    let start = usize::from(address);
    let end = start + count;
    if end > size {
        return Err(ExceptionCode::IllegalDataAddress);
    }
    Ok(start..end)
}

impl Storage for MemoryStorage {
    fn read_bits(
        &mut self,
        table: BitTable,
        address: Address,
        dest: &mut [Coil],
    ) -> Result<(), ExceptionCode> {
        let table = match table {
            BitTable::Coils => &self.coils,
            BitTable::DiscreteInputs => &self.discrete_inputs,
        };
        let range = table_range(table.len(), address, dest.len())?;
        dest.copy_from_slice(&table[range]);
        Ok(())
    }

    fn read_registers(
        &mut self,
        table: RegisterTable,
        address: Address,
        dest: &mut [Word],
    ) -> Result<(), ExceptionCode> {
        let table = match table {
            RegisterTable::Holding => &self.holding_registers,
            RegisterTable::Input => &self.input_registers,
        };
        let range = table_range(table.len(), address, dest.len())?;
        dest.copy_from_slice(&table[range]);
        Ok(())
    }

    fn write_bits(&mut self, address: Address, values: &[Coil]) -> Result<(), ExceptionCode> {
        let range = table_range(self.coils.len(), address, values.len())?;
        self.coils[range].copy_from_slice(values);
        Ok(())
    }

    fn write_registers(&mut self, address: Address, values: &[Word]) -> Result<(), ExceptionCode> {
        let range = table_range(self.holding_registers.len(), address, values.len())?;
        self.holding_registers[range].copy_from_slice(values);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_access() {
        let mut storage = MemoryStorage::new(8, 0, 4, 0);
        let mut dest = [0; 2];
        assert_eq!(
            storage.read_registers(RegisterTable::Holding, 3, &mut dest),
            Err(ExceptionCode::IllegalDataAddress)
        );
        assert_eq!(
            storage.read_registers(RegisterTable::Input, 0, &mut dest),
            Err(ExceptionCode::IllegalDataAddress)
        );
        assert_eq!(
            storage.write_bits(7, &[true, true]),
            Err(ExceptionCode::IllegalDataAddress)
        );
    }

    #[test]
    fn write_then_read() {
        let mut storage = MemoryStorage::new(8, 0, 4, 0);
        storage.write_registers(1, &[0x1234, 0x5678]).unwrap();
        let mut dest = [0; 3];
        storage
            .read_registers(RegisterTable::Holding, 1, &mut dest)
            .unwrap();
        assert_eq!(dest, [0x1234, 0x5678, 0]);

        storage.write_bits(6, &[true, false]).unwrap();
        let mut bits = [false; 3];
        storage.read_bits(BitTable::Coils, 5, &mut bits).unwrap();
        assert_eq!(bits, [false, true, false]);
    }

    #[test]
    fn boxed_storage() {
        let mut storage: Box<dyn Storage> = Box::new(MemoryStorage::new(0, 0, 1, 0));
        storage.write_registers(0, &[7]).unwrap();
        assert_eq!(storage.read_exception_status(), Err(ExceptionCode::IllegalFunction));
        let mut data = [0; 64];
        let (run, len) = storage.report_server_id(&mut data).unwrap();
        assert!(run);
        assert_eq!(&data[..len], DEFAULT_SERVER_ID.as_bytes());
    }
}

// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use modbus_engine::{
    Address, BitTable, Coil, Context, ExceptionCode, FunctionCode, MemoryStorage, RegisterTable,
    Server, Slave, Storage, Word,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Answers every request with silence.
struct SilentStorage;

impl Storage for SilentStorage {
    fn read_bits(&mut self, _: BitTable, _: Address, _: &mut [Coil]) -> Result<(), ExceptionCode> {
        Err(ExceptionCode::Unknown)
    }

    fn read_registers(
        &mut self,
        _: RegisterTable,
        _: Address,
        _: &mut [Word],
    ) -> Result<(), ExceptionCode> {
        Err(ExceptionCode::Unknown)
    }

    fn write_bits(&mut self, _: Address, _: &[Coil]) -> Result<(), ExceptionCode> {
        Err(ExceptionCode::Unknown)
    }

    fn write_registers(&mut self, _: Address, _: &[Word]) -> Result<(), ExceptionCode> {
        Err(ExceptionCode::Unknown)
    }
}

/// Read-only for broadcasts, records the outcome of every indication.
#[derive(Default)]
struct GuardedStorage {
    memory: MemoryStorage,
    outcomes: Vec<(FunctionCode, Result<(), ExceptionCode>)>,
}

impl Storage for GuardedStorage {
    fn read_bits(
        &mut self,
        table: BitTable,
        address: Address,
        dest: &mut [Coil],
    ) -> Result<(), ExceptionCode> {
        self.memory.read_bits(table, address, dest)
    }

    fn read_registers(
        &mut self,
        table: RegisterTable,
        address: Address,
        dest: &mut [Word],
    ) -> Result<(), ExceptionCode> {
        self.memory.read_registers(table, address, dest)
    }

    fn write_bits(&mut self, address: Address, values: &[Coil]) -> Result<(), ExceptionCode> {
        self.memory.write_bits(address, values)
    }

    fn write_registers(&mut self, address: Address, values: &[Word]) -> Result<(), ExceptionCode> {
        self.memory.write_registers(address, values)
    }

    fn check_indication(
        &mut self,
        slave: Slave,
        function: FunctionCode,
    ) -> Result<(), ExceptionCode> {
        match function {
            FunctionCode::WriteSingleRegister if slave.is_broadcast() => {
                Err(ExceptionCode::Unknown)
            }
            FunctionCode::WriteMultipleRegisters => Err(ExceptionCode::IllegalFunction),
            _ => Ok(()),
        }
    }

    fn indication_done(&mut self, function: FunctionCode, result: Result<(), ExceptionCode>) {
        self.outcomes.push((function, result));
    }
}

#[cfg(feature = "rtu")]
mod rtu {
    use super::*;

    fn master(slave: u8) -> Context {
        let mut ctx = Context::rtu();
        ctx.set_slave(Slave(slave)).unwrap();
        ctx
    }

    fn server(slave: u8, storage: MemoryStorage) -> Server<MemoryStorage> {
        let mut ctx = Context::rtu();
        ctx.set_slave(Slave(slave)).unwrap();
        Server::new(ctx, storage)
    }

    fn deliver<S: Storage>(request: &[u8], server: &mut Server<S>) -> Option<Vec<u8>> {
        let len = server.context_mut().receive(request).unwrap();
        server
            .process_indication(len)
            .unwrap()
            .map(<[u8]>::to_vec)
    }

    #[test]
    fn indication_for_another_slave_is_ignored() {
        init_logger();
        let mut master = master(7);
        let mut server = server(5, MemoryStorage::new(0, 0, 0, 0));
        master.build_write_single_coil(0, true).unwrap();
        assert_eq!(deliver(master.send_buf(), &mut server), None);
    }

    #[test]
    fn broadcast_is_processed_without_response() {
        init_logger();
        let mut master = master(0);
        let mut server = server(5, MemoryStorage::new(0, 0, 4, 0));
        master.build_write_single_register(2, 0xBEEF).unwrap();
        assert_eq!(deliver(master.send_buf(), &mut server), None);
        assert_eq!(server.storage().holding_registers, [0, 0, 0xBEEF, 0]);
    }

    #[test]
    fn read_out_of_range() {
        init_logger();
        let mut master = master(5);
        let mut server = server(5, MemoryStorage::new(0, 0, 16, 0));
        master.build_read_holding_registers(14, 4).unwrap();
        let response = deliver(master.send_buf(), &mut server).unwrap();
        assert_eq!(&response[..3], [0x05, 0x83, 0x02]);

        let len = master.receive(&response).unwrap();
        assert_eq!(
            master.parse_read_holding_registers(len).unwrap(),
            Err(ExceptionCode::IllegalDataAddress)
        );
    }

    #[test]
    fn masked_write_register() {
        init_logger();
        let mut storage = MemoryStorage::new(0, 0, 8, 0);
        storage.holding_registers[4] = 0x0012;
        let mut master = master(5);
        let mut server = server(5, storage);
        master.build_masked_write_register(4, 0x00F2, 0x0025).unwrap();
        let request = master.send_buf().to_vec();
        let response = deliver(&request, &mut server).unwrap();
        assert_eq!(response, request);
        assert_eq!(server.storage().holding_registers[4], 0x0017);

        let len = master.receive(&response).unwrap();
        assert_eq!(master.parse_write(len).unwrap(), Ok(()));
    }

    #[test]
    fn write_before_read() {
        init_logger();
        let mut storage = MemoryStorage::new(0, 0, 8, 0);
        storage.holding_registers[2] = 0x1111;
        storage.holding_registers[5] = 0x5555;
        let mut master = master(5);
        let mut server = server(5, storage);
        master
            .build_read_write_multiple_registers(2, 4, 3, &[0xAAAA, 0xBBBB])
            .unwrap();
        let response = deliver(master.send_buf(), &mut server).unwrap();

        let len = master.receive(&response).unwrap();
        assert_eq!(
            master.parse_read_write_multiple_registers(len).unwrap(),
            Ok(vec![0x1111, 0xAAAA, 0xBBBB, 0x5555])
        );
    }

    #[test]
    fn write_and_read_coils() {
        init_logger();
        let mut master = master(5);
        let mut server = server(5, MemoryStorage::new(20, 0, 0, 0));
        let coils = [true, false, true, true, false, false, true, false, true, true];
        master.build_write_multiple_coils(3, &coils).unwrap();
        let response = deliver(master.send_buf(), &mut server).unwrap();
        let len = master.receive(&response).unwrap();
        assert_eq!(master.parse_write(len).unwrap(), Ok(()));
        assert_eq!(&server.storage().coils[3..13], coils);

        master.build_read_coils(3, 10).unwrap();
        let response = deliver(master.send_buf(), &mut server).unwrap();
        let len = master.receive(&response).unwrap();
        assert_eq!(master.parse_read_coils(len).unwrap(), Ok(coils.to_vec()));
    }

    #[test]
    fn unknown_exception_suppresses_the_response() {
        init_logger();
        let mut master = master(5);
        let mut ctx = Context::rtu();
        ctx.set_slave(Slave(5)).unwrap();
        let mut server = Server::new(ctx, SilentStorage);
        master.build_read_input_registers(0, 1).unwrap();
        assert_eq!(deliver(master.send_buf(), &mut server), None);
    }

    #[test]
    fn storage_checks_indications_before_execution() {
        init_logger();
        let mut ctx = Context::rtu();
        ctx.set_slave(Slave(5)).unwrap();
        let storage = GuardedStorage {
            memory: MemoryStorage::new(0, 0, 4, 0),
            outcomes: Vec::new(),
        };
        let mut server = Server::new(ctx, storage);

        let mut broadcast = master(0);
        broadcast.build_write_single_register(1, 0x1234).unwrap();
        assert_eq!(deliver(broadcast.send_buf(), &mut server), None);

        let mut master = master(5);
        master.build_write_multiple_registers(0, &[1, 2]).unwrap();
        let response = deliver(master.send_buf(), &mut server).unwrap();
        assert_eq!(&response[1..3], [0x90, 0x01]);

        master.build_write_single_register(1, 0x1234).unwrap();
        let response = deliver(master.send_buf(), &mut server).unwrap();
        let len = master.receive(&response).unwrap();
        assert_eq!(master.parse_write(len).unwrap(), Ok(()));

        master.build_read_holding_registers(3, 2).unwrap();
        let response = deliver(master.send_buf(), &mut server).unwrap();
        assert_eq!(&response[1..3], [0x83, 0x02]);

        let storage = server.storage();
        assert_eq!(storage.memory.holding_registers, [0, 0x1234, 0, 0]);
        assert_eq!(
            storage.outcomes,
            [
                (FunctionCode::WriteSingleRegister, Err(ExceptionCode::Unknown)),
                (
                    FunctionCode::WriteMultipleRegisters,
                    Err(ExceptionCode::IllegalFunction)
                ),
                (FunctionCode::WriteSingleRegister, Ok(())),
                (
                    FunctionCode::ReadHoldingRegisters,
                    Err(ExceptionCode::IllegalDataAddress)
                ),
            ]
        );
    }

    #[test]
    fn indication_for_another_slave_skips_the_storage() {
        init_logger();
        let mut master = master(7);
        let mut ctx = Context::rtu();
        ctx.set_slave(Slave(5)).unwrap();
        let mut server = Server::new(ctx, GuardedStorage::default());
        master.build_read_holding_registers(0, 1).unwrap();
        assert_eq!(deliver(master.send_buf(), &mut server), None);
        assert!(server.storage().outcomes.is_empty());
    }

    #[test]
    fn read_write_multiple_with_invalid_read_range() {
        init_logger();
        let mut master = master(5);
        let mut server = server(5, MemoryStorage::new(0, 0, 4, 0));
        master
            .build_read_write_multiple_registers(2, 5, 0, &[0xBEEF])
            .unwrap();
        let response = deliver(master.send_buf(), &mut server).unwrap();
        let len = master.receive(&response).unwrap();
        assert_eq!(
            master.parse_read_write_multiple_registers(len).unwrap(),
            Err(ExceptionCode::IllegalDataAddress)
        );
        assert_eq!(server.storage().holding_registers, [0; 4]);
    }

    #[test]
    fn incomplete_indication() {
        init_logger();
        let mut master = master(5);
        let mut server = server(5, MemoryStorage::new(0, 0, 4, 0));
        let request = master.build_write_multiple_registers(0, &[1, 2]).unwrap().to_vec();
        let len = server
            .context_mut()
            .receive(&request[..request.len() - 3])
            .unwrap();
        assert!(server.process_indication(len).is_err());
        assert_eq!(server.storage().holding_registers, [0; 4]);
    }
}

#[cfg(feature = "tcp")]
mod tcp {
    use super::*;

    #[test]
    fn response_repeats_the_transaction_id() {
        init_logger();
        let mut storage = MemoryStorage::new(0, 0, 0, 2);
        storage.input_registers[1] = 0x0102;
        let mut ctx = Context::tcp();
        ctx.set_slave(Slave(9)).unwrap();
        let request = [
            0xAB, 0xCD, 0x00, 0x00, 0x00, 0x06, 0x09, 0x04, 0x00, 0x01, 0x00, 0x01,
        ];
        let len = ctx.receive(&request).unwrap();
        let response = ctx.process_indication(len, &mut storage).unwrap().unwrap();
        assert_eq!(
            response,
            [0xAB, 0xCD, 0x00, 0x00, 0x00, 0x05, 0x09, 0x04, 0x02, 0x01, 0x02]
        );
    }

    #[test]
    fn unit_ids_accepted_by_a_tcp_slave() {
        init_logger();
        let mut storage = MemoryStorage::new(0, 0, 1, 0);
        let mut ctx = Context::tcp();
        ctx.set_slave(Slave(9)).unwrap();
        for (unit_id, answered) in [(9, true), (0, true), (0xFF, true), (8, false)] {
            let request = [
                0x00, 0x01, 0x00, 0x00, 0x00, 0x06, unit_id, 0x03, 0x00, 0x00, 0x00, 0x01,
            ];
            let len = ctx.receive(&request).unwrap();
            let response = ctx.process_indication(len, &mut storage).unwrap();
            assert_eq!(response.is_some(), answered, "unit id {unit_id}");
        }
    }

    #[test]
    fn invalid_protocol_id_is_not_answered() {
        init_logger();
        let mut storage = MemoryStorage::new(0, 0, 1, 0);
        let mut ctx = Context::tcp();
        let request = [
            0x00, 0x01, 0x00, 0x01, 0x00, 0x06, 0xFF, 0x03, 0x00, 0x00, 0x00, 0x01,
        ];
        let len = ctx.receive(&request).unwrap();
        assert_eq!(
            ctx.process_indication(len, &mut storage).unwrap_err(),
            modbus_engine::Error::InvalidProtocolId(1)
        );
    }
}

// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # TCP master example
//!
//! Talks to the `tcp-slave` example running on `127.0.0.1:5502`.

use tokio::{
    io::{AsyncReadExt as _, AsyncWriteExt as _},
    net::TcpStream,
};

use modbus_engine::{Context, Error, ResponseResult, Slave};

/// Sends the pending request and parses the confirmation with `parse`.
async fn transact<T>(
    stream: &mut TcpStream,
    ctx: &mut Context,
    parse: impl Fn(&mut Context, usize) -> ResponseResult<T>,
) -> anyhow::Result<T> {
    stream.write_all(ctx.send_buf()).await?;
    let mut filled = 0;
    loop {
        let n = stream.read(&mut ctx.read_buf_mut()[filled..]).await?;
        if n == 0 {
            anyhow::bail!("connection closed");
        }
        filled += n;
        match parse(ctx, filled) {
            Err(Error::FrameTooShort { .. }) => continue,
            Err(err) => return Err(err.into()),
            Ok(Err(exception)) => anyhow::bail!("exception response: {exception}"),
            Ok(Ok(value)) => return Ok(value),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut stream = TcpStream::connect("127.0.0.1:5502").await?;
    let mut ctx = Context::tcp();
    ctx.set_slave(Slave(1))?;

    println!("CLIENT: Reading 2 input registers...");
    ctx.build_read_input_registers(0x00, 2)?;
    let data = transact(&mut stream, &mut ctx, Context::parse_read_input_registers).await?;
    println!("CLIENT: The result is '{data:?}'");
    assert_eq!(data, vec![1234, 5678]);

    println!("CLIENT: Writing 2 holding registers...");
    ctx.build_write_multiple_registers(0x01, &[7777, 8888])?;
    transact(&mut stream, &mut ctx, Context::parse_write).await?;

    println!("CLIENT: Reading 4 holding registers...");
    ctx.build_read_holding_registers(0x00, 4)?;
    let data = transact(&mut stream, &mut ctx, Context::parse_read_holding_registers).await?;
    println!("CLIENT: The result is '{data:?}'");
    assert_eq!(data, vec![10, 7777, 8888, 40]);

    println!("CLIENT: Reading nonexistent holding register address...");
    ctx.build_read_holding_registers(0x100, 1)?;
    let result = transact(&mut stream, &mut ctx, Context::parse_read_holding_registers).await;
    println!("CLIENT: The result is '{result:?}'");
    assert!(result.is_err());

    println!("CLIENT: Done.");
    Ok(())
}

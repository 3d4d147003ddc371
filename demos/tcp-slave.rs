// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # TCP slave example
//!
//! Serves a [`MemoryStorage`] on `127.0.0.1:5502`. The engine only handles
//! the frames, reading and writing the socket is up to this example.

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use tokio::{
    io::{AsyncReadExt as _, AsyncWriteExt as _},
    net::{TcpListener, TcpStream},
};

use modbus_engine::{Context, Error, MemoryStorage, Slave};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let socket_addr: SocketAddr = "127.0.0.1:5502".parse()?;
    let mut storage = MemoryStorage::new(16, 16, 64, 64);
    storage.input_registers[..2].copy_from_slice(&[1234, 5678]);
    storage.holding_registers[..4].copy_from_slice(&[10, 20, 30, 40]);
    let storage = Arc::new(Mutex::new(storage));

    let listener = TcpListener::bind(socket_addr).await?;
    println!("Listening on {socket_addr}");
    loop {
        let (stream, peer) = listener.accept().await?;
        println!("Connection from {peer}");
        let storage = Arc::clone(&storage);
        tokio::spawn(async move {
            if let Err(err) = serve(stream, &storage).await {
                eprintln!("{peer}: {err}");
            }
        });
    }
}

async fn serve(mut stream: TcpStream, storage: &Mutex<MemoryStorage>) -> anyhow::Result<()> {
    let mut ctx = Context::tcp();
    ctx.set_slave(Slave(1))?;
    let mut filled = 0;
    loop {
        let n = stream.read(&mut ctx.read_buf_mut()[filled..]).await?;
        if n == 0 {
            return Ok(());
        }
        filled += n;

        // A read may end within a frame or carry more than one.
        while filled > 0 {
            let frame_len = match ctx.receive_judge(filled) {
                Ok(frame_len) => frame_len,
                Err(Error::FrameTooShort { .. }) => break,
                Err(err) => return Err(err.into()),
            };
            let response = {
                let mut storage = storage.lock().map_err(|_| anyhow::anyhow!("poisoned"))?;
                ctx.process_indication(frame_len, &mut *storage)?
                    .map(<[u8]>::to_vec)
            };
            if let Some(response) = response {
                stream.write_all(&response).await?;
            }
            ctx.read_buf_mut().copy_within(frame_len..filled, 0);
            filled -= frame_len;
        }
    }
}

//! Link client - registers, then asks for the node's time.
//!
//! ```sh
//! cargo run --example client -- 127.0.0.1:8266
//! ```

use std::time::Duration;

use framelink::protocol::{decode_value, encode_frame, ident, Command, Frame};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const TIMEOUT: Duration = Duration::from_secs(5);

async fn request(
    stream: &mut TcpStream,
    command: Command,
) -> Result<Frame, Box<dyn std::error::Error>> {
    stream.write_all(&encode_frame(command.id(), &[])).await?;

    let mut buf = vec![0u8; command.response_len()];
    tokio::time::timeout(TIMEOUT, stream.read_exact(&mut buf)).await??;
    Ok(Frame::decode(&buf)?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:8266".to_string());
    let mut stream = TcpStream::connect(&addr).await?;
    println!("connected to {}", addr);

    let ack = request(&mut stream, Command::Register).await?;
    if ack.identifier() != ident::REGISTER_ACK {
        return Err(format!("unexpected registration reply 0x{:02x}", ack.identifier()).into());
    }
    println!("registered");

    for _ in 0..3 {
        let echo = request(&mut stream, Command::Echo).await?;
        match decode_value(echo.payload()) {
            Some(ms) => println!("node time: {} ms", ms),
            None => println!("malformed echo: {:?}", echo),
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    Ok(())
}

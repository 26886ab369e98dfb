//! Buffer Transfer - moving buffers to a peer and back over a byte stream.
//!
//! This example demonstrates:
//! - Building gates on top of a byte stream (`tokio::io::duplex` here; a
//!   socket or a child's stdio work the same way)
//! - A raw handler that takes ownership of transferred buffers
//! - `bi_transfer`, which moves buffers to the peer and gets buffers back
//!
//! ```text
//! cargo run --example transfer
//! ```

use bytes::BytesMut;
use message_gate::handler::{Reply, Request};
use message_gate::{Gate, Port, RemoteError, Transferable};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (left, right) = tokio::io::duplex(64 * 1024);
    let (left_r, left_w) = tokio::io::split(left);
    let (right_r, right_w) = tokio::io::split(right);

    let server = Gate::builder()
        .on_request("invert", |mut req: Request| async move {
            let mut buffers = Vec::new();
            for item in req.take_transfer() {
                if let Some(mut buf) = item.into_buffer() {
                    buf.iter_mut().for_each(|b| *b = !*b);
                    buffers.push(buf);
                }
            }
            Ok::<_, RemoteError>(Reply::value(&buffers.len())?.with_transfer(buffers))
        })
        .build(Port::from_stream(left_r, left_w));
    let client = Gate::from_port(Port::from_stream(right_r, right_w));

    let pixels = BytesMut::from(&[0u8, 64, 128, 255][..]);
    let response = client.bi_transfer("invert", &(), pixels).await?;

    let count: usize = response.parse()?;
    for buf in response.transfer.into_iter().filter_map(Transferable::into_buffer) {
        println!("inverted {} buffer(s): {:?}", count, &buf[..]);
    }

    client.close();
    server.closed().await;
    Ok(())
}

//! Worker Thread - bootstrap handshake between a spawner and a worker.
//!
//! This example demonstrates:
//! - Handing a worker thread one half of a [`Scope`]
//! - Running the handshake on both sides to connect two gates
//! - Requests flowing in both directions once connected
//! - The worker closing the gate once the spawner says it is done
//!
//! ```text
//! cargo run --example worker
//! ```

use message_gate::{Gate, GateError, RemoteError, Scope};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Input structure for the resize action.
#[derive(Serialize, Deserialize, Debug)]
struct ResizeInput {
    width: u32,
    height: u32,
    scale: f32,
}

/// Output structure for the resize action.
#[derive(Serialize, Deserialize, Debug)]
struct ResizeOutput {
    width: u32,
    height: u32,
}

fn run_worker(mut scope: Scope) -> message_gate::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        let gate = Gate::builder()
            .on("resize", |input: ResizeInput| async move {
                Ok::<_, RemoteError>(ResizeOutput {
                    width: (input.width as f32 * input.scale) as u32,
                    height: (input.height as f32 * input.scale) as u32,
                })
            })
            .on("done", move |_: ()| {
                let done_tx = done_tx.clone();
                async move {
                    let _ = done_tx.send(());
                    Ok::<_, RemoteError>(())
                }
            })
            .worker_handshake(&mut scope)
            .await?;

        let name: String = gate.post("whoami", &()).await?;
        println!("worker: connected to {}", name);

        let _ = done_rx.recv().await;
        gate.close();
        println!("worker: closed the gate");
        Ok::<(), GateError>(())
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (mut scope, worker_scope) = Scope::pair();
    let worker = std::thread::spawn(move || run_worker(worker_scope));

    let gate = Gate::builder()
        .on("whoami", |_: ()| async { Ok::<_, RemoteError>("spawner") })
        .spawner_handshake(&mut scope)
        .await?;

    let output: ResizeOutput = gate
        .post(
            "resize",
            &ResizeInput {
                width: 640,
                height: 480,
                scale: 0.5,
            },
        )
        .await?;
    println!("spawner: resized to {}x{}", output.width, output.height);

    gate.send("done", &())?;
    gate.closed().await;
    match worker.join() {
        Ok(result) => result?,
        Err(_) => return Err("worker thread panicked".into()),
    }

    Ok(())
}

//! The stdio bridge: one thread per direction plus the execution thread.
//!
//! - reader (this thread): parses host messages and routes them — packets
//!   to the execution thread, channel broadcasts to the endpoint queue,
//!   RPC replies to the pending-call table;
//! - executor: runs one packet at a time and posts the result;
//! - writer: serializes every outbound message onto stdout.
//!
//! The reader staying free while a snippet runs is what lets RPC replies
//! and channel traffic arrive mid-execution.

use std::io::{BufRead, Write};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use islet_channel::ChannelEndpoint;
use islet_core::{HostMessage, Packet, PermissionSet, WorkerMessage};
use islet_rpc::{RpcClient, RpcOutcome};

use crate::config::WorkerConfig;
use crate::runtime::WorkerRuntime;

/// Serve the wire protocol until stdin closes.
///
/// # Errors
///
/// Fails only when the runtime cannot be assembled or stdin breaks; wire
/// level problems are logged and skipped.
pub fn serve(permissions: &PermissionSet, config: WorkerConfig) -> anyhow::Result<()> {
    let (outbound_tx, outbound_rx) = mpsc::channel::<WorkerMessage>();

    let writer = thread::spawn(move || {
        let stdout = std::io::stdout();
        for message in outbound_rx {
            match message.encode() {
                Ok(line) => {
                    let mut lock = stdout.lock();
                    if writeln!(lock, "{line}").is_err() || lock.flush().is_err() {
                        break;
                    }
                },
                Err(err) => warn!(error = %err, "unencodable worker message dropped"),
            }
        }
    });

    let rpc = RpcClient::new(
        outbound_tx.clone(),
        Duration::from_millis(config.rpc_timeout_ms),
    );
    let endpoint = Arc::new(Mutex::new(ChannelEndpoint::default()));

    let mut runtime = WorkerRuntime::new(
        permissions,
        config,
        outbound_tx.clone(),
        rpc.clone(),
        Arc::clone(&endpoint),
    )?;

    let (exec_tx, exec_rx) = mpsc::channel::<Packet>();
    let exec_outbound = outbound_tx.clone();
    let executor = thread::spawn(move || {
        for packet in exec_rx {
            let output = runtime.execute(&packet);
            if exec_outbound
                .send(WorkerMessage::Result { data: output })
                .is_err()
            {
                break;
            }
        }
    });

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match HostMessage::decode(&line) {
            Ok(HostMessage::Execute { data }) => {
                if exec_tx.send(data).is_err() {
                    break;
                }
            },
            Ok(HostMessage::Channel { topic, data }) => {
                endpoint
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .enqueue(topic, data);
            },
            Ok(HostMessage::RpcReply { id, result }) => {
                rpc.resolve(&id, RpcOutcome::Reply(result));
            },
            Ok(HostMessage::RpcError { id, error, name }) => {
                rpc.resolve(&id, RpcOutcome::Error { error, name });
            },
            Err(err) => warn!(error = %err, "malformed host message dropped"),
        }
    }

    debug!("stdin closed, worker shutting down");
    drop(exec_tx);
    drop(outbound_tx);
    let _ = executor.join();
    let _ = writer.join();
    Ok(())
}

//! Newline-delimited JSON control messages read from stdin

use cardsight_core::control::{ControlMessage, ControlParse};
use crossbeam_channel::{unbounded, Receiver};
use log::{debug, warn};
use std::io::{self, BufRead};
use std::thread;

/// Parse one line; anything that is not a known message is logged and
/// dropped.
pub fn accept(line: &str) -> Option<ControlMessage> {
    if line.trim().is_empty() {
        return None;
    }
    match ControlMessage::parse(line) {
        ControlParse::Message(message) => Some(message),
        ControlParse::Unrecognized(input_type) => {
            warn!("Ignoring control message with input_type {:?}", input_type);
            None
        }
        ControlParse::Malformed(reason) => {
            warn!("Dropping malformed control message: {}", reason);
            None
        }
    }
}

/// Read stdin on a background thread. The tracker drains the receiver with
/// `try_iter` once per tick.
pub fn spawn_stdin() -> Receiver<ControlMessage> {
    let (tx, rx) = unbounded();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if let Some(message) = accept(&line) {
                if tx.send(message).is_err() {
                    break;
                }
            }
        }
        debug!("Control input closed");
    });
    rx
}

//! `watch` subcommand: apply game events read from stdin.
//!
//! Each non-empty line is an event name. Requests are queued without waiting
//! for the strip, so a burst of events never stalls the reader; confirmed
//! changes are printed as they land. With `--json` every event that ends
//! without a write (unmapped, unchanged, unreachable) gets its own line too.

use std::io::BufRead;
use std::sync::atomic::Ordering;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use super::{
    ApplyOutput, CliController, ControlOutcome, ControlRequest, GlobalOpts, HOOK_TIMEOUT, RUNNING,
    Result, build_controller, load_valid_config,
};
use elitelight_lib::controller::{ControlResult, PendingControl};
use elitelight_lib::mapping;

/// How often the loop checks for Ctrl+C while waiting for input.
const POLL: Duration = Duration::from_millis(250);

pub(super) fn cmd_watch(opts: &GlobalOpts) -> Result<()> {
    let config = load_valid_config(opts.config_path.as_deref())?;
    let (controller, hooks) = build_controller(&config, opts, true)?;

    if !opts.json {
        println!(
            "EliteLight — applying events for {} ({} mapped)",
            controller.endpoint().identity(),
            controller.mapping().len()
        );
        if opts.dry_run {
            println!("  dry run: nothing is sent to the strip");
        }
        println!("Reading event names from stdin (Ctrl+C to stop)...");
    }

    let (tx, rx) = mpsc::channel::<String>();
    std::thread::Builder::new()
        .name("stdin-events".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })?;

    while RUNNING.load(Ordering::SeqCst) {
        let line = match rx.recv_timeout(POLL) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        let event = line.trim();
        if event.is_empty() {
            continue;
        }
        match controller.submit(ControlRequest::event(event)) {
            PendingControl::Queued { .. } => {}
            PendingControl::Ready(result) if opts.json => {
                print_ready_line(&controller, event, result)
            }
            PendingControl::Ready(result) => match result.outcome {
                ControlOutcome::Unmapped => log::debug!("{event}: no mapping"),
                outcome => println!("  event:{event} -> {outcome}"),
            },
        }
    }

    // Let queued writes finish so their confirmations are printed.
    controller.shutdown();
    if !hooks.wait_idle(HOOK_TIMEOUT) {
        log::warn!("on_change_command still running at exit");
    }
    Ok(())
}

/// One compact JSON line for an event that finished without a write.
fn print_ready_line(controller: &CliController, event: &str, result: ControlResult) {
    let line = ApplyOutput {
        device: controller.endpoint().identity().to_string(),
        source: format!("event:{event}"),
        state: mapping::resolve(event, controller.mapping()),
        result,
    };
    match serde_json::to_string(&line) {
        Ok(line) => println!("{line}"),
        Err(e) => log::warn!("could not encode outcome for {event}: {e}"),
    }
}

//! Panic capture for the dispatcher boundary.
//!
//! A process-wide hook records the location and backtrace of the most recent
//! panic on the panicking thread. `catch_unwind` runs on that same thread, so
//! the dispatcher can pick the trace up right after catching the unwind.

use crate::worker::error::WorkerError;
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::sync::Once;

const MAX_TRACE_LINES: usize = 40;

thread_local! {
    static LAST_PANIC: RefCell<Option<String>> = const { RefCell::new(None) };
}

static INSTALL: Once = Once::new();

pub fn install_panic_capture() {
    INSTALL.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let location = info
                .location()
                .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
                .unwrap_or_else(|| "unknown location".to_string());
            let trace = summarize(&Backtrace::force_capture().to_string());
            LAST_PANIC.with(|slot| {
                *slot.borrow_mut() = Some(format!("panicked at {}\n{}", location, trace));
            });
            previous(info);
        }));
    });
}

fn summarize(trace: &str) -> String {
    let lines: Vec<&str> = trace.lines().collect();
    if lines.len() <= MAX_TRACE_LINES {
        return lines.join("\n");
    }
    format!(
        "{}\n... {} more frames",
        lines[..MAX_TRACE_LINES].join("\n"),
        lines.len() - MAX_TRACE_LINES
    )
}

fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Convert a caught panic into an `InternalFault`, attaching the trace the
/// hook recorded on this thread.
pub fn into_fault(payload: Box<dyn Any + Send>) -> WorkerError {
    let trace = LAST_PANIC
        .with(|slot| slot.borrow_mut().take())
        .unwrap_or_else(|| "no trace captured".to_string());
    WorkerError::InternalFault {
        message: payload_message(payload.as_ref()),
        trace,
    }
}

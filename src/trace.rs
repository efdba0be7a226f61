//! Event trace sink.
//!
//! Writes one line per routed model output and one line per model state
//! change to a timestamped file under `logs/`. Failure to open the file is
//! not fatal: the writer degrades to a no-op and the run proceeds without a
//! trace.

use std::fmt;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use log::warn;

use crate::devs::{Payload, Time};

/// A sink for the simulation event trace.
pub struct TraceWriter {
    out: Option<BufWriter<fs::File>>,
}

impl TraceWriter {
    /// Opens `logs/simulation_log_<YYYY-MM-DD_HH-MM-SS>.txt` for writing.
    ///
    /// On any I/O failure the trace is discarded and a warning is logged.
    pub fn create() -> Self {
        let filename = format!(
            "simulation_log_{}.txt",
            chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
        );
        let path: PathBuf = ["logs", &filename].iter().collect();
        let out = fs::create_dir_all("logs")
            .and_then(|_| fs::File::create(&path))
            .map(BufWriter::new);
        match out {
            Ok(out) => Self { out: Some(out) },
            Err(err) => {
                warn!("could not open trace file {}: {}", path.display(), err);
                Self { out: None }
            }
        }
    }

    /// A writer that discards everything.
    pub fn disabled() -> Self {
        Self { out: None }
    }

    /// Whether lines written to this sink reach a file.
    pub fn is_enabled(&self) -> bool {
        self.out.is_some()
    }

    pub(crate) fn start(&mut self) {
        if let Some(out) = &mut self.out {
            let _ = writeln!(out, "Simulation started.");
        }
    }

    pub(crate) fn stop(&mut self) {
        if let Some(out) = &mut self.out {
            let _ = writeln!(out, "Simulation ended.");
            let _ = out.flush();
        }
    }

    pub(crate) fn output(
        &mut self,
        time: Time,
        model_id: usize,
        model_name: &str,
        port: &str,
        payload: &Payload,
    ) {
        if let Some(out) = &mut self.out {
            let _ = writeln!(
                out,
                "[{:.9}] #{} {} | {} | {}",
                time, model_id, model_name, port, payload
            );
        }
    }

    pub(crate) fn state(&mut self, time: Time, model_name: &str, state: &dyn fmt::Display) {
        if let Some(out) = &mut self.out {
            let _ = writeln!(out, "[{:.9}] {} | state: {}", time, model_name, state);
        }
    }
}

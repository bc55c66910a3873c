//! Chrome trace output.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Mutex;
use std::time::Instant;

static TRACE: Mutex<Option<Trace>> = Mutex::new(None);

struct Trace {
    start: Instant,
    w: BufWriter<File>,
}

impl Trace {
    fn new(path: &str) -> std::io::Result<Self> {
        let mut w = BufWriter::new(File::create(path)?);
        writeln!(w, "[")?;
        Ok(Trace {
            start: Instant::now(),
            w,
        })
    }

    fn write_event(
        &mut self,
        name: &str,
        tid: usize,
        start: Instant,
        end: Instant,
    ) -> std::io::Result<()> {
        write!(
            self.w,
            "{{ \"pid\": 0, \"tid\": {}, \"name\": {:?}, \"ts\": {}, \"ph\": \"X\", \"dur\": {} }}",
            tid,
            name,
            start.saturating_duration_since(self.start).as_micros(),
            end.saturating_duration_since(start).as_micros()
        )
    }

    fn write(&mut self, name: &str, tid: usize, start: Instant, end: Instant) -> std::io::Result<()> {
        self.write_event(name, tid, start, end)?;
        writeln!(self.w, ",")
    }

    fn close(&mut self) -> std::io::Result<()> {
        let start = self.start;
        self.write_event("main", 0, start, Instant::now())?;
        writeln!(self.w, "]")?;
        self.w.flush()
    }
}

pub fn open(path: &str) -> std::io::Result<()> {
    let trace = Trace::new(path)?;
    if let Ok(mut global) = TRACE.lock() {
        *global = Some(trace);
    }
    Ok(())
}

fn enabled() -> bool {
    TRACE.lock().map_or(false, |global| global.is_some())
}

/// Record a completed span, e.g. a recipe that ran on worker `tid`.
pub fn write_complete(name: &str, tid: usize, start: Instant, end: Instant) {
    if let Ok(mut global) = TRACE.lock() {
        if let Some(trace) = global.as_mut() {
            if let Err(err) = trace.write(name, tid, start, end) {
                tracing::warn!("trace: {}", err);
            }
        }
    }
}

/// Run f, recording its duration as a span named `name`.
#[inline]
pub fn scope<T>(name: &'static str, f: impl FnOnce() -> T) -> T {
    if !enabled() {
        return f();
    }
    let start = Instant::now();
    let result = f();
    write_complete(name, 0, start, Instant::now());
    result
}

pub fn close() -> std::io::Result<()> {
    if let Ok(mut global) = TRACE.lock() {
        if let Some(mut trace) = global.take() {
            return trace.close();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_json_array() -> std::io::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("trace.json");
        open(path.to_str().unwrap())?;
        let answer = scope("compute", || 42);
        assert_eq!(answer, 42);
        close()?;

        let text = std::fs::read_to_string(&path)?;
        assert!(text.starts_with("[\n"));
        assert!(text.contains("\"name\": \"compute\""));
        assert!(text.trim_end().ends_with(']'));
        // Closed; further scopes are no-ops.
        assert_eq!(scope("after", || 1), 1);
        Ok(())
    }
}

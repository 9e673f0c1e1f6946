//! Output seam for the `Log` built-in.
//!
//! Hosts that embed the interpreter (or tests) capture script output by
//! supplying their own writer; the default writes to stdout.

/// Trait for handling output produced by `Log(...)`.
pub trait PrintWriter {
    /// Called once per `Log` call with the fully formatted line.
    fn print_line(&mut self, line: &str);
}

/// Default writer: stdout.
#[derive(Debug, Default)]
pub struct StdPrint;

impl PrintWriter for StdPrint {
    fn print_line(&mut self, line: &str) {
        println!("{line}");
    }
}

/// Test writer collecting lines in memory.
#[derive(Debug, Default)]
pub struct BufferPrint {
    pub lines: Vec<String>,
}

impl PrintWriter for BufferPrint {
    fn print_line(&mut self, line: &str) {
        self.lines.push(line.to_owned());
    }
}

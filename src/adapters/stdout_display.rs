//! Plain-text display sink.

use crate::ports::display_port::DisplaySink;

#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutDisplay;

impl DisplaySink for StdoutDisplay {
    fn echo(&self, text: &str) {
        println!("{text}");
    }

    fn echo_source(&self, filename: &str, text: &str) {
        println!("# {filename}");
        for (number, line) in text.lines().enumerate() {
            println!("{:>4} | {line}", number + 1);
        }
    }
}

//! Operator-facing display sink.

pub trait DisplaySink {
    fn echo(&self, text: &str);

    /// Show strategy source before it runs. Sinks without a richer renderer
    /// print it plainly.
    fn echo_source(&self, _filename: &str, text: &str) {
        self.echo(text);
    }
}

use std::io::Write;

use tracing::warn;

use crate::analyzer::Analyzer;
use crate::decoder::CustomAction;

/// Writes every action as one JSON line.
///
/// The first write error is logged and the dump stops; analysis of the other
/// analyzers is unaffected.
pub struct ActionDump {
    output: Box<dyn Write>,
    failed: bool,
}

impl ActionDump {
    pub fn new(output: Box<dyn Write>) -> Self {
        Self {
            output,
            failed: false,
        }
    }

    /// Dumps into `file`, sharing its handle.
    pub fn to_file(file: &std::fs::File) -> std::io::Result<Self> {
        Ok(Self::new(Box::new(std::io::BufWriter::new(file.try_clone()?))))
    }

    fn write_action(&mut self, action: &CustomAction) -> std::io::Result<()> {
        serde_json::to_writer(&mut self.output, action)?;
        self.output.write_all(b"\n")
    }
}

impl Analyzer for ActionDump {
    fn process(&mut self, action: &CustomAction) {
        if self.failed {
            return;
        }
        if let Err(e) = self.write_action(action) {
            warn!(action = action.index, "failed to dump action: {e}");
            self.failed = true;
        }
    }

    fn finish(&mut self) {
        if let Err(e) = self.output.flush() {
            warn!("failed to flush action dump: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::run_analyzers;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn one_line_per_action() {
        let sink = Shared::default();
        let mut dump = ActionDump::new(Box::new(sink.clone()));
        let actions = vec![CustomAction::new(0, "custom itt_chunks 1"), CustomAction::new(1, "a\"b")];
        run_analyzers(&actions, &mut [&mut dump]);

        let text = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"index":0,"key":"custom itt_chunks 1"}"#);
        assert_eq!(lines[1], r#"{"index":1,"key":"a\"b"}"#);
    }

    #[test]
    fn dumps_into_a_file() {
        let path = std::env::temp_dir().join(format!("itt-action-dump-{}.jsonl", std::process::id()));
        let file = std::fs::File::create(&path).unwrap();

        for batch in [["custom itt_chunks 1"], ["custom itt_data_0 x"]] {
            let mut dump = ActionDump::to_file(&file).unwrap();
            let actions: Vec<_> = batch.iter().map(|key| CustomAction::new(0, *key)).collect();
            run_analyzers(&actions, &mut [&mut dump]);
        }

        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().all(|line| line.starts_with('{')));
    }
}
